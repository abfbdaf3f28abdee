//! Course note classification.
//!
//! Catalogue pages list prerequisites, corequisites, restrictions and the
//! like as loosely labelled `<li>` items. Each normalized line goes to
//! exactly one bucket; the first matching rule wins, so rule order matters:
//!
//! 1. empty lines are skipped
//! 2. `Prerequisite…` lines, split on an embedded corequisite marker
//! 3. `Corequisite…` / `Pre/co-requisite…`
//! 4. `Restriction…` (and the `Restrion` misspelling seen in the wild)
//! 5. a bare `(3-0-3)` hours line
//! 6. `Instructor…`
//! 7. anything else, except `Terms offered:`, which is captured elsewhere

use std::sync::LazyLock;

use regex::Regex;

static PREREQ_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^prerequisites?(?:\(s\))?\s*:\s*").unwrap());

/// Embedded corequisite marker inside prerequisite text. The lazy prefix
/// makes the earliest marker win.
static EMBEDDED_COREQ_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^(.*?)\b(?:pre/co-requisite|pre-co-requisite|pre co-requisite|corequisite|co-requisite)s?\b:?(.*)$",
    )
    .unwrap()
});

static COREQ_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:corequisites?|pre/co-requisites?)(?:\(s\))?\s*:\s*").unwrap()
});

static RESTRICTION_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^restrictions?(?:\(s\))?\s*:\s*|^restrions?(?:\(s\))?\s*:\s*").unwrap()
});

static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\s*\d+\s*-\s*\d+\s*-\s*\d+\s*\)$").unwrap());

static INSTRUCTOR_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^instructors?\s*:\s*").unwrap());

const TERMS_OFFERED_PREFIX: &str = "terms offered:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseNotes {
    pub prerequisites: Vec<String>,
    pub corequisites: Vec<String>,
    pub restrictions: Vec<String>,
    pub instructors: Vec<String>,
    pub hours: Option<String>,
    pub other: Vec<String>,
}

/// Which bucket a line landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Prerequisite,
    Corequisite,
    Restriction,
    Hours,
    Instructor,
    Other,
    Dropped,
}

/// Classify all note lines of one course. Pure: same input, same output.
pub fn classify_notes<I, S>(lines: I) -> CourseNotes
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .fold(CourseNotes::default(), |notes, line| notes.absorb(line.as_ref()))
}

/// Rule that a single line would hit, without the text surgery.
pub fn kind_of(line: &str) -> NoteKind {
    let lower = line.to_lowercase();
    if line.is_empty() {
        NoteKind::Dropped
    } else if lower.starts_with("prerequisite") {
        NoteKind::Prerequisite
    } else if lower.starts_with("corequisite") || lower.starts_with("pre/co-requisite") {
        NoteKind::Corequisite
    } else if lower.starts_with("restriction") || lower.starts_with("restrion") {
        NoteKind::Restriction
    } else if HOURS_RE.is_match(line) {
        NoteKind::Hours
    } else if lower.starts_with("instructor") {
        NoteKind::Instructor
    } else if lower.starts_with(TERMS_OFFERED_PREFIX) {
        NoteKind::Dropped
    } else {
        NoteKind::Other
    }
}

impl CourseNotes {
    /// Fold step: consume self, return the notes with `line` accounted for.
    fn absorb(mut self, line: &str) -> Self {
        match kind_of(line) {
            NoteKind::Dropped => {}
            NoteKind::Prerequisite => {
                let (prereq, coreq) = split_prerequisite(line);
                self.prerequisites.extend(prereq);
                self.corequisites.extend(coreq);
            }
            NoteKind::Corequisite => self.corequisites.push(strip_label(&COREQ_LABEL_RE, line)),
            NoteKind::Restriction => {
                self.restrictions.push(strip_label(&RESTRICTION_LABEL_RE, line))
            }
            NoteKind::Hours => self.hours = Some(line.to_string()),
            NoteKind::Instructor => {
                self.instructors.push(strip_label(&INSTRUCTOR_LABEL_RE, line))
            }
            NoteKind::Other => self.other.push(line.to_string()),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == CourseNotes::default()
    }
}

fn strip_label(label: &Regex, line: &str) -> String {
    label.replace(line, "").trim().to_string()
}

/// Split a prerequisite line into its prerequisite part and an optional
/// embedded corequisite part.
///
/// Without a marker the stripped content is kept as-is, even when empty:
/// a bare `Prerequisite:` line yields one empty prerequisite.
pub fn split_prerequisite(line: &str) -> (Option<String>, Option<String>) {
    let content = strip_label(&PREREQ_LABEL_RE, line);

    match EMBEDDED_COREQ_RE.captures(&content) {
        Some(caps) => {
            let prereq = caps[1]
                .trim()
                .trim_end_matches('.')
                .trim_end_matches(';')
                .to_string();
            let coreq = caps[2].trim().to_string();
            (
                Some(prereq).filter(|s| !s.is_empty()),
                Some(coreq).filter(|s| !s.is_empty()),
            )
        }
        None => (Some(content), None),
    }
}
