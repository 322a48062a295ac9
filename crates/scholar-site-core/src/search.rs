//! Weighted fuzzy search over [`SearchableRecord`]s.
//!
//! # Scoring
//!
//! 1. Each field (title, content) is matched independently with a
//!    [`Matcher`]. A field counts only if its score is `<= threshold` and
//!    the matched span is at least `min_match_chars` long.
//! 2. Field weights are normalized to sum to 1.
//! 3. `internal = Π max(field_score, ε) ^ weight` over matched fields, so
//!    0.0 is a perfect hit and each additional matching field improves it.
//! 4. `relevance_score = round((1 - internal) × 100)`, clamped to `[0, 100]`.
//! 5. Results are sorted by `internal` ascending (best first), then record
//!    type, then id.

use serde::Serialize;

use crate::fuzzy::{fold, EditDistanceMatcher, FieldMatch, Matcher};
use crate::index::SearchableRecord;

/// Matching and ranking knobs. Defaults reproduce the site's behavior.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum accepted field score (edit distance / query length).
    pub threshold: f64,
    /// Queries with fewer chars (after trimming) return nothing.
    pub min_query_chars: usize,
    /// Matched spans shorter than this are ignored.
    pub min_match_chars: usize,
    pub title_weight: f64,
    pub content_weight: f64,
    /// Chars kept on each side of a match in a highlight.
    pub highlight_radius: usize,
    /// Maximum results returned; `None` keeps all.
    pub limit: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            min_query_chars: 2,
            min_match_chars: 2,
            title_weight: 2.0,
            content_weight: 1.0,
            highlight_radius: 20,
            limit: Some(10),
        }
    }
}

/// A ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub record: SearchableRecord,
    /// 100 is a perfect match, 0 the weakest accepted match.
    pub relevance_score: u8,
    /// Text windows around each matched field, title first.
    pub highlights: Vec<String>,
}

/// Search with the default [`EditDistanceMatcher`].
pub fn search(
    corpus: &[SearchableRecord],
    query: &str,
    opts: &SearchOptions,
) -> Vec<SearchResult> {
    search_with(&EditDistanceMatcher, corpus, query, opts)
}

/// Search with an explicit matcher.
pub fn search_with<M: Matcher>(
    matcher: &M,
    corpus: &[SearchableRecord],
    query: &str,
    opts: &SearchOptions,
) -> Vec<SearchResult> {
    let query = query.trim();
    if query.chars().count() < opts.min_query_chars.max(1) {
        return Vec::new();
    }
    let pattern = fold(query);

    let total_weight = opts.title_weight + opts.content_weight;
    let (title_w, content_w) = if total_weight > 0.0 {
        (opts.title_weight / total_weight, opts.content_weight / total_weight)
    } else {
        (0.5, 0.5)
    };

    let accept = |m: Option<FieldMatch>| {
        m.filter(|m| m.score <= opts.threshold && m.len() >= opts.min_match_chars)
    };

    let mut scored: Vec<(f64, SearchResult)> = corpus
        .iter()
        .filter_map(|record| {
            let title_match = accept(matcher.find(&pattern, &record.title));
            let content_match = accept(matcher.find(&pattern, &record.content));
            if title_match.is_none() && content_match.is_none() {
                return None;
            }

            let mut internal = 1.0_f64;
            let mut highlights = Vec::new();
            for (m, weight, field) in [
                (title_match, title_w, record.title.as_str()),
                (content_match, content_w, record.content.as_str()),
            ] {
                if let Some(m) = m {
                    internal *= m.score.max(f64::EPSILON).powf(weight);
                    highlights.push(highlight(field, &m, opts.highlight_radius));
                }
            }

            Some((
                internal,
                SearchResult {
                    record: record.clone(),
                    relevance_score: relevance_from_internal(internal),
                    highlights,
                },
            ))
        })
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| {
        a_score
            .partial_cmp(b_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.record.record_type.cmp(&b.record.record_type))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });

    let mut results: Vec<SearchResult> = scored.into_iter().map(|(_, r)| r).collect();
    if let Some(limit) = opts.limit {
        results.truncate(limit);
    }
    results
}

/// Map an internal score (0 best, 1 worst) to the public 0–100 scale.
pub fn relevance_from_internal(internal: f64) -> u8 {
    ((1.0 - internal) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Window of `radius` chars around a match, clipped to the field.
pub fn highlight(field: &str, m: &FieldMatch, radius: usize) -> String {
    let len = field.chars().count();
    let start = m.start.saturating_sub(radius).min(len);
    let end = m.end.saturating_add(radius).min(len);
    field.chars().skip(start).take(end.saturating_sub(start)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RecordType;
    use std::cell::Cell;

    fn record(id: &str, title: &str, content: &str, record_type: RecordType) -> SearchableRecord {
        SearchableRecord {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            record_type,
            url: format!("/{}", id),
        }
    }

    fn corpus() -> Vec<SearchableRecord> {
        vec![
            record(
                "p1",
                "Memory Consolidation During Sleep",
                "How overnight replay stabilizes declarative traces.",
                RecordType::Publication,
            ),
            record(
                "psy-301",
                "PSY 301: Cognitive Psychology",
                "Attention, perception, language, reasoning, and decision making.",
                RecordType::Course,
            ),
            record(
                "wm",
                "Attention Networks",
                "Capacity limits of working memory under load.",
                RecordType::Research,
            ),
            record(
                "dreams",
                "Dreams as Replay",
                "Sleep stages and emotional regulation.",
                RecordType::Publication,
            ),
        ]
    }

    struct CountingMatcher(Cell<usize>);

    impl Matcher for CountingMatcher {
        fn find(&self, pattern: &[char], text: &str) -> Option<FieldMatch> {
            self.0.set(self.0.get() + 1);
            EditDistanceMatcher.find(pattern, text)
        }
    }

    #[test]
    fn test_short_query_skips_matcher() {
        let matcher = CountingMatcher(Cell::new(0));
        for q in ["", " ", "m", " m "] {
            assert!(search_with(&matcher, &corpus(), q, &SearchOptions::default()).is_empty());
        }
        assert_eq!(matcher.0.get(), 0);

        search_with(&matcher, &corpus(), "me", &SearchOptions::default());
        assert!(matcher.0.get() > 0);
    }

    #[test]
    fn test_memory_finds_publication_not_course() {
        let results = search(&corpus(), "memory", &SearchOptions::default());
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert!(ids.contains(&"p1"));
        assert!(!ids.contains(&"psy-301"));
        let p1 = results.iter().find(|r| r.record.id == "p1").unwrap();
        assert!(p1.relevance_score > 0);
        // Title hit outranks a content-only hit.
        assert_eq!(ids[0], "p1");
    }

    #[test]
    fn test_scores_bounded_and_sorted() {
        for q in ["memory", "sleep", "atention", "replay", "cognitive psych"] {
            let results = search(&corpus(), q, &SearchOptions::default());
            for r in &results {
                assert!(r.relevance_score <= 100);
            }
            for w in results.windows(2) {
                assert!(
                    w[0].relevance_score >= w[1].relevance_score,
                    "unsorted for {:?}: {:?}",
                    q,
                    results
                );
            }
        }
    }

    #[test]
    fn test_typo_tolerated() {
        let results = search(&corpus(), "atention", &SearchOptions::default());
        assert!(results.iter().any(|r| r.record.id == "wm"));
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(search(&corpus(), "zzzz qqqq", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn test_highlights_window() {
        let results = search(&corpus(), "working", &SearchOptions::default());
        let wm = results.iter().find(|r| r.record.id == "wm").unwrap();
        assert_eq!(wm.highlights.len(), 1);
        let h = &wm.highlights[0];
        assert!(h.contains("working"));
        assert!(h.chars().count() <= "working".len() + 40);
        assert_eq!(h, "Capacity limits of working memory under load.");
    }

    #[test]
    fn test_highlight_clips_to_bounds() {
        let m = FieldMatch {
            distance: 0,
            score: 0.0,
            start: 0,
            end: 3,
        };
        assert_eq!(highlight("abcdef", &m, 20), "abcdef");
        let past_end = FieldMatch {
            distance: 0,
            score: 0.0,
            start: 10,
            end: 12,
        };
        assert_eq!(highlight("abc", &past_end, 2), "");
    }

    #[test]
    fn test_limit_truncates() {
        let opts = SearchOptions {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(search(&corpus(), "sleep", &opts).len(), 1);
    }

    #[test]
    fn test_relevance_mapping() {
        assert_eq!(relevance_from_internal(0.0), 100);
        assert_eq!(relevance_from_internal(1.0), 0);
        assert_eq!(relevance_from_internal(0.25), 75);
        assert_eq!(relevance_from_internal(1.5), 0);
    }
}
