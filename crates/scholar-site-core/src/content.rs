//! Static site content: personal info, research projects, and publications.
//!
//! The content file is parsed once per process into a [`ContentStore`].
//! Everything here is read-only after construction; accessors borrow from
//! the store and never allocate new records.
//!
//! Projects and publications carry no explicit status/kind field in the
//! source JSON. The bucket they are listed under decides it, and
//! [`ContentStore::from_json`] stamps that onto each record.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle bucket of a research project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
    Planned,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 3] = [Self::Active, Self::Completed, Self::Planned];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Planned => "planned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "planned" => Some(Self::Planned),
            _ => None,
        }
    }
}

/// Publication category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicationKind {
    Journal,
    Chapter,
    Conference,
    WorkingPaper,
}

impl PublicationKind {
    pub const ALL: [PublicationKind; 4] = [
        Self::Journal,
        Self::Chapter,
        Self::Conference,
        Self::WorkingPaper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::Chapter => "chapter",
            Self::Conference => "conference",
            Self::WorkingPaper => "working-paper",
        }
    }

    /// Accepts the canonical name plus the bucket spelling used in the
    /// content file (`journal_articles`, `book_chapters`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "journal" | "journal-articles" => Some(Self::Journal),
            "chapter" | "book-chapters" => Some(Self::Chapter),
            "conference" | "conference-papers" => Some(Self::Conference),
            "working-paper" | "working-papers" => Some(Self::WorkingPaper),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub research_interests: Vec<String>,
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchProject {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
    #[serde(default)]
    pub funding: Option<String>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    /// Filled from the bucket the project was listed under.
    #[serde(skip_deserializing, default = "default_status")]
    pub status: ProjectStatus,
}

fn default_status() -> ProjectStatus {
    ProjectStatus::Active
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: i32,
    #[serde(default)]
    pub venue: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub citations: u32,
    /// Filled from the bucket the publication was listed under.
    #[serde(skip_deserializing, default = "default_kind")]
    pub kind: PublicationKind,
}

fn default_kind() -> PublicationKind {
    PublicationKind::Journal
}

#[derive(Debug, Default, Deserialize)]
struct RawResearch {
    #[serde(default)]
    active: Vec<ResearchProject>,
    #[serde(default)]
    completed: Vec<ResearchProject>,
    #[serde(default)]
    planned: Vec<ResearchProject>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPublications {
    #[serde(default)]
    journal_articles: Vec<Publication>,
    #[serde(default)]
    book_chapters: Vec<Publication>,
    #[serde(default)]
    conference_papers: Vec<Publication>,
    #[serde(default)]
    working_papers: Vec<Publication>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    personal: PersonalInfo,
    #[serde(default)]
    research: RawResearch,
    #[serde(default)]
    publications: RawPublications,
}

/// Read-only snapshot of all site content.
#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    personal: PersonalInfo,
    projects: Vec<ResearchProject>,
    publications: Vec<Publication>,
}

impl ContentStore {
    /// Parse the content file's JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawContent =
            serde_json::from_str(json).context("content file is not valid content JSON")?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawContent) -> Self {
        let mut projects = Vec::new();
        for (status, bucket) in [
            (ProjectStatus::Active, raw.research.active),
            (ProjectStatus::Completed, raw.research.completed),
            (ProjectStatus::Planned, raw.research.planned),
        ] {
            projects.extend(bucket.into_iter().map(|mut p| {
                p.status = status;
                p
            }));
        }

        let mut publications = Vec::new();
        for (kind, bucket) in [
            (PublicationKind::Journal, raw.publications.journal_articles),
            (PublicationKind::Chapter, raw.publications.book_chapters),
            (PublicationKind::Conference, raw.publications.conference_papers),
            (PublicationKind::WorkingPaper, raw.publications.working_papers),
        ] {
            publications.extend(bucket.into_iter().map(|mut p| {
                p.kind = kind;
                p
            }));
        }

        Self {
            personal: raw.personal,
            projects,
            publications,
        }
    }

    /// Build a store directly from parts. Used by tests and tools that
    /// assemble content in code.
    pub fn new(
        personal: PersonalInfo,
        projects: Vec<ResearchProject>,
        publications: Vec<Publication>,
    ) -> Self {
        Self {
            personal,
            projects,
            publications,
        }
    }

    pub fn personal(&self) -> &PersonalInfo {
        &self.personal
    }

    /// All projects, in active → completed → planned order.
    pub fn projects(&self) -> &[ResearchProject] {
        &self.projects
    }

    pub fn projects_with_status(
        &self,
        status: ProjectStatus,
    ) -> impl Iterator<Item = &ResearchProject> {
        self.projects.iter().filter(move |p| p.status == status)
    }

    /// All publications, in journal → chapter → conference → working-paper order.
    pub fn publications(&self) -> &[Publication] {
        &self.publications
    }

    pub fn publications_of_kind(
        &self,
        kind: PublicationKind,
    ) -> impl Iterator<Item = &Publication> {
        self.publications.iter().filter(move |p| p.kind == kind)
    }

    pub fn project(&self, id: &str) -> Option<&ResearchProject> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn publication(&self, id: &str) -> Option<&Publication> {
        self.publications.iter().find(|p| p.id == id)
    }

    pub fn total_citations(&self) -> u64 {
        self.publications.iter().map(|p| p.citations as u64).sum()
    }
}

// ============ Listing queries ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectSort {
    /// Newest start year first.
    #[default]
    Year,
    Title,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
    /// Case-insensitive substring over title, description, and keywords.
    pub keyword: Option<String>,
    pub sort: ProjectSort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublicationSort {
    /// Newest first, then by title.
    #[default]
    Year,
    Citations,
    Title,
}

#[derive(Debug, Clone, Default)]
pub struct PublicationQuery {
    pub kind: Option<PublicationKind>,
    pub year: Option<i32>,
    pub keyword: Option<String>,
    pub sort: PublicationSort,
    pub limit: Option<usize>,
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

impl ContentStore {
    /// Filter and sort projects for listing pages and `/api/research`.
    pub fn list_projects(&self, q: &ProjectQuery) -> Vec<&ResearchProject> {
        let keyword = q
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);

        let mut out: Vec<&ResearchProject> = self
            .projects
            .iter()
            .filter(|p| q.status.map_or(true, |s| p.status == s))
            .filter(|p| match &keyword {
                Some(k) => {
                    contains_ci(&p.title, k)
                        || contains_ci(&p.description, k)
                        || p.keywords.iter().any(|kw| contains_ci(kw, k))
                }
                None => true,
            })
            .collect();

        match q.sort {
            ProjectSort::Year => out.sort_by(|a, b| {
                b.start_year
                    .cmp(&a.start_year)
                    .then_with(|| a.title.cmp(&b.title))
            }),
            ProjectSort::Title => out.sort_by(|a, b| a.title.cmp(&b.title)),
        }
        out
    }

    /// Filter and sort publications for listing pages and `/api/publications`.
    pub fn list_publications(&self, q: &PublicationQuery) -> Vec<&Publication> {
        let keyword = q
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase);

        let mut out: Vec<&Publication> = self
            .publications
            .iter()
            .filter(|p| q.kind.map_or(true, |k| p.kind == k))
            .filter(|p| q.year.map_or(true, |y| p.year == y))
            .filter(|p| match &keyword {
                Some(k) => {
                    contains_ci(&p.title, k)
                        || p.abstract_text.as_deref().is_some_and(|a| contains_ci(a, k))
                        || p.keywords.iter().any(|kw| contains_ci(kw, k))
                        || p.authors.iter().any(|a| contains_ci(a, k))
                }
                None => true,
            })
            .collect();

        match q.sort {
            PublicationSort::Year => {
                out.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.title.cmp(&b.title)))
            }
            PublicationSort::Citations => out.sort_by(|a, b| {
                b.citations
                    .cmp(&a.citations)
                    .then_with(|| b.year.cmp(&a.year))
            }),
            PublicationSort::Title => out.sort_by(|a, b| a.title.cmp(&b.title)),
        }

        if let Some(limit) = q.limit {
            out.truncate(limit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "personal": { "name": "Dr. Sarah Mitchell", "title": "Associate Professor" },
        "research": {
            "active": [
                { "id": "sleep-memory", "title": "Sleep and Memory", "description": "Overnight consolidation", "keywords": ["sleep"], "start_year": 2021 }
            ],
            "completed": [
                { "id": "attention", "title": "Attention Networks", "description": "Selective attention", "start_year": 2015, "end_year": 2019 }
            ],
            "planned": []
        },
        "publications": {
            "journal_articles": [
                { "id": "p1", "title": "Memory Consolidation During Sleep", "year": 2022, "citations": 40, "abstract": "We study memory." },
                { "id": "p2", "title": "Attention in Aging", "year": 2019, "citations": 90 }
            ],
            "working_papers": [
                { "id": "p3", "title": "Dreams as Replay", "year": 2024 }
            ]
        }
    }"#;

    #[test]
    fn test_bucket_sets_status_and_kind() {
        let store = ContentStore::from_json(SAMPLE).unwrap();
        assert_eq!(store.personal().name, "Dr. Sarah Mitchell");
        assert_eq!(store.project("attention").unwrap().status, ProjectStatus::Completed);
        assert_eq!(store.publication("p3").unwrap().kind, PublicationKind::WorkingPaper);
        assert_eq!(store.projects_with_status(ProjectStatus::Planned).count(), 0);
        assert_eq!(store.total_citations(), 130);
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let store = ContentStore::from_json(r#"{"personal": {"name": "X"}}"#).unwrap();
        assert!(store.projects().is_empty());
        assert!(store.publications().is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(ContentStore::from_json("{ not json").is_err());
    }

    #[test]
    fn test_list_publications_filters_and_sorts() {
        let store = ContentStore::from_json(SAMPLE).unwrap();

        let by_year = store.list_publications(&PublicationQuery::default());
        let ids: Vec<&str> = by_year.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p1", "p2"]);

        let by_citations = store.list_publications(&PublicationQuery {
            sort: PublicationSort::Citations,
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(by_citations.len(), 1);
        assert_eq!(by_citations[0].id, "p2");

        let journals_2022 = store.list_publications(&PublicationQuery {
            kind: Some(PublicationKind::Journal),
            year: Some(2022),
            ..Default::default()
        });
        assert_eq!(journals_2022.len(), 1);
        assert_eq!(journals_2022[0].id, "p1");

        let keyword = store.list_publications(&PublicationQuery {
            keyword: Some("MEMORY".to_string()),
            ..Default::default()
        });
        assert_eq!(keyword.len(), 1);
    }

    #[test]
    fn test_list_projects_by_status() {
        let store = ContentStore::from_json(SAMPLE).unwrap();
        let active = store.list_projects(&ProjectQuery {
            status: Some(ProjectStatus::Active),
            ..Default::default()
        });
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "sleep-memory");

        let all = store.list_projects(&ProjectQuery {
            sort: ProjectSort::Title,
            ..Default::default()
        });
        assert_eq!(all[0].title, "Attention Networks");
    }

    #[test]
    fn test_kind_parse_accepts_bucket_names() {
        assert_eq!(PublicationKind::parse("book_chapters"), Some(PublicationKind::Chapter));
        assert_eq!(PublicationKind::parse("working-paper"), Some(PublicationKind::WorkingPaper));
        assert_eq!(PublicationKind::parse("poster"), None);
        assert_eq!(ProjectStatus::parse("Planned"), Some(ProjectStatus::Planned));
    }
}
