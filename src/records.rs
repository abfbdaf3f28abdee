use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parser::notes::CourseNotes;

const NOTE_SEPARATOR: &str = "; ";

/// One course page, flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub url: String,
    pub code: String,
    pub title: Option<String>,
    pub credits: Option<String>,
    pub department_full: Option<String>,
    pub faculty: Option<String>,
    pub terms_offered: Option<String>,
    pub description: Option<String>,
    pub prerequisites_raw: Option<String>,
    pub corequisites_raw: Option<String>,
    pub restrictions_raw: Option<String>,
    pub hours_info: Option<String>,
    pub instructors_raw: Option<String>,
    pub other_notes: Option<String>,
}

/// Page-level fields gathered before the notes are folded in.
#[derive(Debug, Clone, Default)]
pub struct CourseDetails {
    pub title: Option<String>,
    pub credits: Option<String>,
    pub department_full: Option<String>,
    pub faculty: Option<String>,
    pub terms_offered: Option<String>,
    pub description: Option<String>,
}

impl CourseRecord {
    pub fn assemble(url: &str, code: String, details: CourseDetails, notes: CourseNotes) -> Self {
        CourseRecord {
            url: url.to_string(),
            code,
            title: details.title,
            credits: details.credits,
            department_full: details.department_full,
            faculty: details.faculty,
            terms_offered: details.terms_offered,
            description: details.description,
            prerequisites_raw: join_notes(&notes.prerequisites),
            corequisites_raw: join_notes(&notes.corequisites),
            restrictions_raw: join_notes(&notes.restrictions),
            hours_info: notes
                .hours
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty()),
            instructors_raw: join_notes(&notes.instructors),
            other_notes: join_notes(&notes.other),
        }
    }

    /// Whether there is any requirement text worth sending for enrichment.
    pub fn has_requirement_text(&self) -> bool {
        let present = |s: &Option<String>| s.as_deref().is_some_and(|t| !t.trim().is_empty());
        present(&self.prerequisites_raw) || present(&self.corequisites_raw)
    }
}

/// An empty sequence is `None`, never `""`.
pub fn join_notes(parts: &[String]) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(NOTE_SEPARATOR))
    }
}

/// Courses listed on one program page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub faculty: Option<String>,
    pub unit: Option<String>,
    pub program: String,
    pub url: String,
    pub courses: Vec<String>,
}

/// A course plus its LLM-parsed requirement structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCourse {
    #[serde(flatten)]
    pub course: CourseRecord,
    #[serde(default)]
    pub prerequisites_parsed: Vec<Value>,
    #[serde(default)]
    pub corequisites_parsed: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing_error: Option<String>,
}

/// Records persisted in a keyed JSON array.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for CourseRecord {
    fn key(&self) -> &str {
        &self.code
    }
}

impl Keyed for ProgramRecord {
    fn key(&self) -> &str {
        &self.url
    }
}

impl Keyed for EnrichedCourse {
    fn key(&self) -> &str {
        &self.course.code
    }
}
