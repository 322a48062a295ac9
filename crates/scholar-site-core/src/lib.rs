//! # Scholar Site Core
//!
//! Pure logic for Scholar Site: the content model, the search index
//! builder, fuzzy matching and ranking, the search session state machine,
//! and the offline cache policy and storage trait.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Callers
//! supply content as JSON text, timestamps as `Instant`s, and storage as a
//! [`cache::CacheStorage`] implementation.

pub mod cache;
pub mod content;
pub mod fuzzy;
pub mod index;
pub mod search;
pub mod session;
