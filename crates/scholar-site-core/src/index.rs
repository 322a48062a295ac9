//! Flattening site content into uniform searchable records.

use serde::{Deserialize, Serialize};

use crate::content::ContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Research,
    Publication,
    Course,
    General,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Publication => "publication",
            Self::Course => "course",
            Self::General => "general",
        }
    }
}

/// One entry of the search corpus.
///
/// `id` is unique within its source collection only; a project and a
/// publication may share an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchableRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub url: String,
}

impl SearchableRecord {
    fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        record_type: RecordType,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            record_type,
            url: url.into(),
        }
    }
}

/// (id, title, description)
const COURSES: &[(&str, &str, &str)] = &[
    (
        "psy-101",
        "PSY 101: Introduction to Psychology",
        "Survey of perception, learning, development, personality, and social behavior for first-year students.",
    ),
    (
        "psy-301",
        "PSY 301: Cognitive Psychology",
        "Attention, perception, language, reasoning, and decision making, with weekly lab demonstrations.",
    ),
    (
        "psy-420",
        "PSY 420: Sleep and Cognition Seminar",
        "Graduate seminar on the role of sleep in learning, emotional processing, and consolidation.",
    ),
    (
        "psy-510",
        "PSY 510: Research Methods in Cognitive Neuroscience",
        "Experimental design, EEG and fMRI analysis, and reproducible research practice.",
    ),
];

/// (id, title, description, url)
const GENERAL: &[(&str, &str, &str, &str)] = &[
    (
        "about",
        "About",
        "Biography, academic background, appointments, and research interests.",
        "/",
    ),
    (
        "cv",
        "Curriculum Vitae",
        "Education, positions, grants, awards, service, and full publication list.",
        "/cv",
    ),
    (
        "contact",
        "Contact",
        "Office hours, email, lab location, and information for prospective students.",
        "/contact",
    ),
    (
        "lab",
        "Lab Opportunities",
        "Openings for graduate students, postdocs, and undergraduate research assistants.",
        "/research#lab",
    ),
];

fn join_content<'a>(lead: &'a str, keywords: impl IntoIterator<Item = &'a String>) -> String {
    let mut content = lead.trim().to_string();
    for kw in keywords {
        if !content.is_empty() {
            content.push(' ');
        }
        content.push_str(kw);
    }
    content
}

/// Build the full search corpus from a content snapshot.
///
/// Pure: the same store always yields the same records in the same order
/// (research, publications, courses, general).
pub fn build_index(store: &ContentStore) -> Vec<SearchableRecord> {
    let mut records = Vec::with_capacity(
        store.projects().len() + store.publications().len() + COURSES.len() + GENERAL.len(),
    );

    for p in store.projects() {
        records.push(SearchableRecord::new(
            p.id.clone(),
            p.title.clone(),
            join_content(&p.description, &p.keywords),
            RecordType::Research,
            format!("/research#{}", p.id),
        ));
    }

    for p in store.publications() {
        let lead = p.abstract_text.as_deref().unwrap_or(&p.venue);
        records.push(SearchableRecord::new(
            p.id.clone(),
            p.title.clone(),
            join_content(lead, &p.keywords),
            RecordType::Publication,
            format!("/publications#{}", p.id),
        ));
    }

    for (id, title, description) in COURSES {
        records.push(SearchableRecord::new(
            *id,
            *title,
            *description,
            RecordType::Course,
            format!("/teaching#{}", id),
        ));
    }

    for (id, title, description, url) in GENERAL {
        records.push(SearchableRecord::new(
            *id,
            *title,
            *description,
            RecordType::General,
            *url,
        ));
    }

    records
}
