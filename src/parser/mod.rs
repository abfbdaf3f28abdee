pub mod code;
pub mod course;
pub mod notes;
pub mod program;
pub mod text;

use reqwest::Url;

use crate::fetch::FetchedPage;
use crate::frontier::{PageKind, Target};
use crate::records::{CourseRecord, ProgramRecord};

/// Result of visiting one page: a finished record, more pages to visit,
/// or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Course(CourseRecord),
    Program(ProgramRecord),
    Follow(Vec<Target>),
    Skipped(String),
}

/// Route a fetched page to the handler for its kind.
pub fn visit(page: &FetchedPage) -> PageOutcome {
    let target = &page.target;
    let Some(html) = page.html.as_deref() else {
        let reason = page.error.clone().unwrap_or_else(|| "empty response".to_string());
        return PageOutcome::Skipped(reason);
    };
    visit_html(target, html)
}

pub fn visit_html(target: &Target, html: &str) -> PageOutcome {
    let base = match Url::parse(&target.url) {
        Ok(u) => u,
        Err(e) => return PageOutcome::Skipped(format!("bad url {}: {}", target.url, e)),
    };

    match target.kind {
        PageKind::CourseIndex => PageOutcome::Follow(program::course_index_links(&base, html)),
        PageKind::ProgramIndex => PageOutcome::Follow(program::program_index_links(&base, html)),
        PageKind::Faculty => PageOutcome::Follow(program::faculty_links(target, &base, html)),
        PageKind::Unit => PageOutcome::Follow(program::unit_links(target, &base, html)),
        PageKind::Course => match course::extract(&target.url, html) {
            Some(rec) => PageOutcome::Course(rec),
            None => PageOutcome::Skipped(format!("no course code for {}", target.url)),
        },
        PageKind::Program => match program::extract_program(target, html) {
            Some(rec) => PageOutcome::Program(rec),
            None => PageOutcome::Skipped(format!("no program name for {}", target.url)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_page_yields_record() {
        let html = std::fs::read_to_string("tests/fixtures/comp-250.html").unwrap();
        let target = Target::new("https://coursecatalogue.mcgill.ca/courses/comp-250/", PageKind::Course);
        match visit_html(&target, &html) {
            PageOutcome::Course(rec) => assert_eq!(rec.code, "COMP-250"),
            other => panic!("expected course, got {:?}", other),
        }
    }

    #[test]
    fn faculty_page_yields_targets() {
        let html = std::fs::read_to_string("tests/fixtures/faculty-science.html").unwrap();
        let target = Target::new(
            "https://coursecatalogue.mcgill.ca/en/undergraduate/science/",
            PageKind::Faculty,
        );
        match visit_html(&target, &html) {
            PageOutcome::Follow(next) => {
                assert_eq!(next.len(), 3);
                assert_eq!(next[0].faculty.as_deref(), Some("Science"));
            }
            other => panic!("expected follow, got {:?}", other),
        }
    }

    #[test]
    fn failed_fetch_is_skipped() {
        let page = FetchedPage {
            target: Target::new("https://x.ca/courses/a-100/", PageKind::Course),
            html: None,
            status: Some(404),
            error: Some("HTTP 404".into()),
            latency_ms: Some(12),
        };
        assert_eq!(visit(&page), PageOutcome::Skipped("HTTP 404".into()));
    }

    #[test]
    fn codeless_course_is_skipped() {
        let target = Target::new("https://x.ca/", PageKind::Course);
        assert!(matches!(
            visit_html(&target, "<h1 class=\"page-title\">Untitled</h1>"),
            PageOutcome::Skipped(_)
        ));
    }
}
