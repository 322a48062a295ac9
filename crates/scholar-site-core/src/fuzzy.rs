//! Approximate substring matching.
//!
//! Finds the substring of a text with the smallest Levenshtein distance to a
//! pattern (Sellers' semi-global variant: the match may start and end
//! anywhere in the text at no cost). The DP keeps two rows plus, per cell,
//! the text column where the best path entered row 1, so the match span
//! can be reported without a traceback matrix.
//!
//! Comparison is case-insensitive. Lowercasing is done per character and
//! keeps only the first lowercase char, so match offsets always index the
//! original text's chars one-to-one.

/// Location and quality of a single approximate match, in char offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMatch {
    /// Edit distance between the pattern and `text[start..end]`.
    pub distance: usize,
    /// `distance / pattern_len`: 0.0 is exact, 1.0 shares nothing.
    pub score: f64,
    pub start: usize,
    pub end: usize,
}

impl FieldMatch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Seam for swapping the matching algorithm (and for counting calls in tests).
pub trait Matcher {
    /// Best match of `pattern` (already lowercased) inside `text`, if any.
    fn find(&self, pattern: &[char], text: &str) -> Option<FieldMatch>;
}

/// Default matcher: semi-global edit distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistanceMatcher;

impl Matcher for EditDistanceMatcher {
    fn find(&self, pattern: &[char], text: &str) -> Option<FieldMatch> {
        best_substring_match(pattern, text)
    }
}

pub fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Lowercase a query into the char form [`Matcher::find`] expects.
pub fn fold(s: &str) -> Vec<char> {
    s.chars().map(fold_char).collect()
}

/// Semi-global Levenshtein search of `pattern` in `text`.
///
/// Returns `None` for an empty pattern or empty text. On ties the earliest
/// ending match wins.
pub fn best_substring_match(pattern: &[char], text: &str) -> Option<FieldMatch> {
    let m = pattern.len();
    if m == 0 {
        return None;
    }
    let text: Vec<char> = text.chars().map(fold_char).collect();
    let n = text.len();
    if n == 0 {
        return None;
    }

    // Row 0: the empty pattern matches before any column for free.
    let mut prev_cost: Vec<usize> = vec![0; n + 1];
    let mut prev_start: Vec<usize> = (0..=n).collect();
    let mut cur_cost: Vec<usize> = vec![0; n + 1];
    let mut cur_start: Vec<usize> = vec![0; n + 1];

    for (i, &pc) in pattern.iter().enumerate() {
        cur_cost[0] = i + 1;
        cur_start[0] = 0;
        for j in 1..=n {
            let sub = prev_cost[j - 1] + usize::from(text[j - 1] != pc);
            let skip_pattern = prev_cost[j] + 1;
            let skip_text = cur_cost[j - 1] + 1;

            if sub <= skip_pattern && sub <= skip_text {
                cur_cost[j] = sub;
                cur_start[j] = prev_start[j - 1];
            } else if skip_pattern <= skip_text {
                cur_cost[j] = skip_pattern;
                cur_start[j] = prev_start[j];
            } else {
                cur_cost[j] = skip_text;
                cur_start[j] = cur_start[j - 1];
            }
        }
        std::mem::swap(&mut prev_cost, &mut cur_cost);
        std::mem::swap(&mut prev_start, &mut cur_start);
    }

    let (end, distance) = prev_cost
        .iter()
        .enumerate()
        .skip(1)
        .min_by_key(|(_, cost)| **cost)
        .map(|(j, cost)| (j, *cost))?;

    Some(FieldMatch {
        distance,
        score: (distance as f64 / m as f64).min(1.0),
        start: prev_start[end],
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(p: &str, t: &str) -> Option<FieldMatch> {
        best_substring_match(&fold(p), t)
    }

    #[test]
    fn test_exact_substring() {
        let m = find("memory", "Memory Consolidation During Sleep").unwrap();
        assert_eq!(m.distance, 0);
        assert_eq!(m.score, 0.0);
        assert_eq!((m.start, m.end), (0, 6));
    }

    #[test]
    fn test_exact_substring_in_middle() {
        let m = find("sleep", "Memory Consolidation During Sleep").unwrap();
        assert_eq!(m.distance, 0);
        assert_eq!((m.start, m.end), (28, 33));
    }

    #[test]
    fn test_one_typo() {
        let m = find("memroy", "working memory capacity").unwrap();
        assert_eq!(m.distance, 2);
        let m = find("memmory", "working memory capacity").unwrap();
        assert_eq!(m.distance, 1);
        assert_eq!(&"working memory capacity"[m.start..m.end], "memory");
    }

    #[test]
    fn test_no_similar_substring() {
        let m = find("memory", "PSY 301: Cognitive Psychology").unwrap();
        assert!(m.score > 0.4, "unexpected close match: {:?}", m);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(find("", "anything").is_none());
        assert!(find("abc", "").is_none());
    }

    #[test]
    fn test_offsets_are_char_based() {
        let m = find("café", "le petit café noir").unwrap();
        assert_eq!(m.distance, 0);
        let matched: String = "le petit café noir"
            .chars()
            .skip(m.start)
            .take(m.len())
            .collect();
        assert_eq!(matched, "café");
    }

    #[test]
    fn test_score_never_exceeds_one() {
        let m = find("zzzzzzzz", "ab").unwrap();
        assert!(m.score <= 1.0);
    }
}
