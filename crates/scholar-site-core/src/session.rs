//! Search session: debounced querying and recent-query history.
//!
//! The session is a plain state machine driven by explicit timestamps, so
//! any frontend (interactive CLI, tests, an event loop) can own one and
//! decide how to wait for the debounce deadline.
//!
//! ```text
//!   input(non-empty)          poll(now >= deadline)
//! Idle ───────────────▶ Searching ───────────────▶ Settled
//!  ▲                      │   ▲ input(non-empty)      │
//!  └──── input(empty) ────┘   └───────────────────────┘
//! ```
//!
//! Every `input` replaces the pending deadline: only the last keystroke in a
//! burst triggers a search. Clearing the input drops the deadline and the
//! results immediately, so nothing can overwrite the cleared state later.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::index::SearchableRecord;
use crate::search::{search, SearchOptions, SearchResult};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_RECENT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Searching { deadline: Instant },
    Settled,
}

#[derive(Debug, Clone)]
pub struct SearchSession {
    query: String,
    state: SessionState,
    results: Vec<SearchResult>,
    has_queried: bool,
    recent: VecDeque<String>,
    popular: Vec<String>,
    debounce: Duration,
    max_recent: usize,
    options: SearchOptions,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new(SearchOptions::default(), DEFAULT_DEBOUNCE, DEFAULT_MAX_RECENT)
    }
}

impl SearchSession {
    pub fn new(options: SearchOptions, debounce: Duration, max_recent: usize) -> Self {
        Self {
            query: String::new(),
            state: SessionState::Idle,
            results: Vec::new(),
            has_queried: false,
            recent: VecDeque::with_capacity(max_recent),
            popular: Vec::new(),
            debounce,
            max_recent,
            options,
        }
    }

    pub fn with_popular(mut self, popular: Vec<String>) -> Self {
        self.popular = popular;
        self
    }

    /// Handle an input change at time `now`.
    pub fn input(&mut self, query: &str, now: Instant) {
        self.query = query.to_string();
        if query.trim().is_empty() {
            self.state = SessionState::Idle;
            self.results.clear();
            self.has_queried = false;
        } else {
            self.state = SessionState::Searching {
                deadline: now + self.debounce,
            };
        }
    }

    /// Run the pending search if its deadline has passed.
    ///
    /// Returns `true` when a search ran.
    pub fn poll(&mut self, corpus: &[SearchableRecord], now: Instant) -> bool {
        match self.state {
            SessionState::Searching { deadline } if now >= deadline => {
                self.results = search(corpus, &self.query, &self.options);
                self.has_queried = true;
                self.state = SessionState::Settled;
                true
            }
            _ => false,
        }
    }

    /// Record that the user picked a result for the current query.
    ///
    /// Returns the selected result, if the index is in range. While a
    /// search is pending the shown results belong to an older query, so
    /// nothing can be selected.
    pub fn select(&mut self, index: usize) -> Option<SearchResult> {
        if self.is_searching() {
            return None;
        }
        let picked = self.results.get(index).cloned()?;
        let query = self.query.clone();
        self.record_selection(&query);
        Some(picked)
    }

    /// Push `query` onto the recent list: most recent first, no duplicates,
    /// at most `max_recent` entries.
    pub fn record_selection(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() || self.max_recent == 0 {
            return;
        }
        self.recent.retain(|q| q != query);
        self.recent.push_front(query.to_string());
        self.recent.truncate(self.max_recent);
    }

    pub fn clear_recent(&mut self) {
        self.recent.clear();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.state, SessionState::Searching { .. })
    }

    /// True once a search has completed for the current (non-empty) input.
    /// Lets callers tell "no results" apart from "not searched yet".
    pub fn has_queried(&self) -> bool {
        self.has_queried
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            SessionState::Searching { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn recent_queries(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn popular_queries(&self) -> &[String] {
        &self.popular
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RecordType;

    fn corpus() -> Vec<SearchableRecord> {
        vec![SearchableRecord {
            id: "p1".into(),
            title: "Memory Consolidation During Sleep".into(),
            content: "Overnight replay.".into(),
            record_type: RecordType::Publication,
            url: "/publications#p1".into(),
        }]
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_debounce_last_keystroke_wins() {
        let corpus = corpus();
        let t0 = Instant::now();
        let mut s = SearchSession::default();

        s.input("me", t0);
        s.input("mem", t0 + ms(100));
        s.input("memory", t0 + ms(200));
        assert!(s.is_searching());

        // First deadline (t0 + 300) was replaced.
        assert!(!s.poll(&corpus, t0 + ms(350)));
        assert!(s.results().is_empty());
        assert!(!s.has_queried());

        assert!(s.poll(&corpus, t0 + ms(500)));
        assert_eq!(s.state(), SessionState::Settled);
        assert!(s.has_queried());
        assert_eq!(s.results().len(), 1);

        // Settled: nothing more to do.
        assert!(!s.poll(&corpus, t0 + ms(900)));
    }

    #[test]
    fn test_clear_is_immediate_and_drops_timer() {
        let corpus = corpus();
        let t0 = Instant::now();
        let mut s = SearchSession::default();

        s.input("memory", t0);
        assert!(s.poll(&corpus, t0 + ms(300)));
        assert!(!s.results().is_empty());

        s.input("sleep", t0 + ms(400));
        s.input("", t0 + ms(450));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.results().is_empty());
        assert!(s.deadline().is_none());

        // The "sleep" deadline would have been t0 + 700.
        assert!(!s.poll(&corpus, t0 + ms(2000)));
        assert!(s.results().is_empty());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_no_results_vs_not_searched() {
        let corpus = corpus();
        let t0 = Instant::now();
        let mut s = SearchSession::default();

        s.input("zzzz", t0);
        assert!(!s.has_queried());
        s.poll(&corpus, t0 + ms(300));
        assert!(s.has_queried());
        assert!(s.results().is_empty());
    }

    #[test]
    fn test_recent_queries_ring() {
        let mut s = SearchSession::default();
        for q in ["a1", "b2", "c3", "d4", "e5", "f6"] {
            s.record_selection(q);
        }
        let recent: Vec<&str> = s.recent_queries().collect();
        assert_eq!(recent, vec!["f6", "e5", "d4", "c3", "b2"]);

        s.record_selection("c3");
        let recent: Vec<&str> = s.recent_queries().collect();
        assert_eq!(recent, vec!["c3", "f6", "e5", "d4", "b2"]);

        s.record_selection("  ");
        assert_eq!(s.recent_queries().count(), 5);

        s.clear_recent();
        assert_eq!(s.recent_queries().count(), 0);
    }

    #[test]
    fn test_keystrokes_do_not_touch_recent() {
        let corpus = corpus();
        let t0 = Instant::now();
        let mut s = SearchSession::default();
        s.input("memory", t0);
        s.poll(&corpus, t0 + ms(300));
        assert_eq!(s.recent_queries().count(), 0);

        let picked = s.select(0).unwrap();
        assert_eq!(picked.record.id, "p1");
        assert_eq!(s.recent_queries().collect::<Vec<_>>(), vec!["memory"]);
        assert!(s.select(5).is_none());
    }

    #[test]
    fn test_popular_queries() {
        let s = SearchSession::default().with_popular(vec!["sleep".into(), "memory".into()]);
        assert_eq!(s.popular_queries().len(), 2);
    }

    #[test]
    fn test_select_waits_for_pending_search() {
        let corpus = corpus();
        let t0 = Instant::now();
        let mut s = SearchSession::default();

        s.input("memory", t0);
        assert!(s.poll(&corpus, t0 + ms(300)));

        s.input("sleep", t0 + ms(400));
        assert!(s.select(0).is_none());
        assert!(s.recent_queries().next().is_none());

        assert!(s.poll(&corpus, t0 + ms(700)));
        assert!(s.select(0).is_some());
        assert_eq!(s.recent_queries().next(), Some("sleep"));
    }
}
