//! # Scholar Site
//!
//! Backend for an academic personal website: research projects,
//! publications, and courses served as JSON and HTML, a typo-tolerant
//! search over all of them, and an offline caching proxy that plays the
//! role of the site's service worker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ content.json │──▶│ ContentStore +  │──▶│ Content API  │
//! │              │   │ search index    │   │ (serve api)  │
//! └──────────────┘   └─────────────────┘   └──────┬───────┘
//!                                                 │ upstream
//!                    ┌─────────────────┐   ┌──────┴───────┐
//!                    │ SQLite caches + │◀──│ Offline proxy│
//!                    │ sync queue      │   │ (serve proxy)│
//!                    └─────────────────┘   └──────────────┘
//! ```
//!
//! The pure parts (content model, index, fuzzy engine, search session,
//! cache policy) live in `scholar-site-core`; this crate adds I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`content`] | Content file loading and the shared search corpus |
//! | [`search`] | CLI search, one-shot and interactive |
//! | [`server`] | Content API and pages |
//! | [`worker`] | Offline cache worker, fetcher, background sync |
//! | [`proxy`] | HTTP front for the worker |
//! | [`sqlite_cache`] | SQLite cache storage |
//! | [`cache_cmd`] | `cache` and `sync` commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache_cmd;
pub mod config;
pub mod content;
pub mod db;
pub mod migrate;
pub mod proxy;
pub mod search;
pub mod server;
pub mod sqlite_cache;
pub mod worker;
