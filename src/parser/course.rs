use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::code;
use super::notes::classify_notes;
use super::text::{element_text, first_own_text, non_empty, normalize, own_text};
use crate::records::{CourseDetails, CourseRecord};

static FACULTY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*Faculty[^)]*)\)").unwrap());

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static HEADING: LazyLock<Selector> = LazyLock::new(|| sel("h1.page-title"));
static CREDITS: LazyLock<Selector> =
    LazyLock::new(|| sel("div.courseblock div.detail-credits span.value"));
static OFFERED_BY: LazyLock<Selector> =
    LazyLock::new(|| sel("div.courseblock div.detail-offered_by span.value"));
static TERMS_OFFERED: LazyLock<Selector> =
    LazyLock::new(|| sel("div.courseblock div.detail-terms_offered span.value"));
static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| sel("div.courseblock div.section--description div.section__content"));
static DESCRIPTION_FALLBACK: LazyLock<Selector> =
    LazyLock::new(|| sel("div.courseblock div.section--description p"));
static NOTE_ITEMS: LazyLock<Selector> =
    LazyLock::new(|| sel("div.courseblock div.detail-note_text ul > li"));

/// Extract one course from its catalogue page. `None` when no course code
/// can be found in either the URL or the heading.
pub fn extract(url: &str, html: &str) -> Option<CourseRecord> {
    let doc = Html::parse_document(html);

    let heading = doc.select(&HEADING).next().and_then(|h| first_own_text(&h));
    let (title, code) = code::resolve(url, heading.as_deref());
    let Some(code) = code else {
        warn!("Could not determine course code for URL: {}", url);
        return None;
    };

    let department_full = first_value(&doc, &OFFERED_BY);
    let details = CourseDetails {
        title,
        credits: first_value(&doc, &CREDITS),
        faculty: department_full.as_deref().and_then(parse_faculty),
        department_full,
        terms_offered: first_value(&doc, &TERMS_OFFERED),
        description: description(&doc),
    };

    let notes = classify_notes(note_lines(&doc));
    if notes.is_empty() {
        debug!("No notes for {}", code);
    }
    Some(CourseRecord::assemble(url, code, details, notes))
}

/// Normalized text of every note `<li>`, in document order.
pub fn note_lines(doc: &Html) -> Vec<String> {
    doc.select(&NOTE_ITEMS).map(|li| element_text(&li)).collect()
}

fn first_value(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|el| first_own_text(&el))
}

fn description(doc: &Html) -> Option<String> {
    let primary = normalize(
        doc.select(&DESCRIPTION)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>(),
    );
    if !primary.is_empty() {
        return Some(primary);
    }

    let fallback: Vec<String> = doc.select(&DESCRIPTION_FALLBACK).map(|p| own_text(&p)).collect();
    non_empty(normalize(fallback.iter().map(String::as_str)))
}

/// Faculty name from an "Offered by" value such as
/// `Computer Science (Faculty of Science)`.
pub fn parse_faculty(offered_by: &str) -> Option<String> {
    FACULTY_RE
        .captures(offered_by)
        .map(|caps| caps[1].to_string())
}
