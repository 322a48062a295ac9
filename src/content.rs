//! Loading the site's content file and the derived search index.
//!
//! Content is read once per process. [`SiteData`] bundles the parsed
//! [`ContentStore`] with the search corpus built from it; since content is
//! immutable at runtime the corpus is built once and shared by every query.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use scholar_site_core::content::{ContentStore, ProjectStatus, PublicationKind};
use scholar_site_core::index::{build_index, RecordType, SearchableRecord};

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct SiteData {
    pub store: Arc<ContentStore>,
    pub corpus: Arc<Vec<SearchableRecord>>,
}

impl SiteData {
    pub fn new(store: ContentStore) -> Self {
        let corpus = build_index(&store);
        Self {
            store: Arc::new(store),
            corpus: Arc::new(corpus),
        }
    }
}

pub fn load_content_file(path: &Path) -> Result<ContentStore> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read content file: {}", path.display()))?;
    ContentStore::from_json(&json)
        .with_context(|| format!("Failed to parse content file: {}", path.display()))
}

pub fn load_site(config: &Config) -> Result<SiteData> {
    Ok(SiteData::new(load_content_file(&config.content.path)?))
}

/// CLI entry point for `scholar content`: prints a summary of what was loaded.
pub fn run_content_summary(config: &Config) -> Result<()> {
    let site = load_site(config)?;
    let store = &site.store;
    let personal = store.personal();

    println!("{}, {}", personal.name, personal.title);
    if !personal.institution.is_empty() {
        println!("{}", personal.institution);
    }
    println!();

    println!("{:<16} {:>6}", "RESEARCH", "COUNT");
    for status in ProjectStatus::ALL {
        println!(
            "{:<16} {:>6}",
            status.as_str(),
            store.projects_with_status(status).count()
        );
    }
    println!();

    println!("{:<16} {:>6}", "PUBLICATIONS", "COUNT");
    for kind in PublicationKind::ALL {
        println!(
            "{:<16} {:>6}",
            kind.as_str(),
            store.publications_of_kind(kind).count()
        );
    }
    println!("{:<16} {:>6}", "citations", store.total_citations());
    println!();

    let count = |t: RecordType| site.corpus.iter().filter(|r| r.record_type == t).count();
    println!(
        "search index: {} records ({} research, {} publication, {} course, {} general)",
        site.corpus.len(),
        count(RecordType::Research),
        count(RecordType::Publication),
        count(RecordType::Course),
        count(RecordType::General),
    );

    Ok(())
}
