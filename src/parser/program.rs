use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::text::{element_text, first_own_text, non_empty};
use crate::frontier::{PageKind, Target};
use crate::records::ProgramRecord;

static FACULTY_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/undergraduate/([^/]+)/?").unwrap());
static UNIT_URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/programs/([^/]+)/?").unwrap());
static COURSE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{4})\s*(\d{3}[A-Z0-9]*)\b").unwrap());

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static COURSE_INDEX_LINKS: LazyLock<Selector> =
    LazyLock::new(|| sel("div#textcontainer.page_content ul li a"));
static SITEMAP_LINKS: LazyLock<Selector> = LazyLock::new(|| sel("div.sitemap a"));
static NAV_TABS: LazyLock<Selector> = LazyLock::new(|| sel("ul.clearfix a"));
static NESTED_SITEMAP: LazyLock<Selector> = LazyLock::new(|| sel("div.sitemap > ul > li > ul"));
static SITEMAP_TOP_ITEMS: LazyLock<Selector> = LazyLock::new(|| sel("div.sitemap > ul > li"));
static ANY_LINK: LazyLock<Selector> = LazyLock::new(|| sel("a"));
static HEADING: LazyLock<Selector> = LazyLock::new(|| sel("h1.page-title"));
static COURSE_ROWS: LazyLock<Selector> = LazyLock::new(|| sel("table.sc_courselist tr"));
static CODE_CELL: LazyLock<Selector> = LazyLock::new(|| sel("td.codecol"));

const PROGRAM_PATH_KEYWORDS: &[&str] = &["/programs/", "/major/", "/minor/"];

/// Which strategy a faculty page calls for, decided by its navigation tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacultyLayout {
    /// "Programs" tab with programs grouped under their units.
    ProgramsByUnit,
    /// "Programs" tab with a flat list.
    Programs,
    /// "Academic Units" tab; programs live one level further down.
    Units,
    /// No usable tab; fall back to program-looking paths.
    Fallback,
}

pub fn faculty_layout(doc: &Html) -> FacultyLayout {
    let has_tab = |label: &str| doc.select(&NAV_TABS).any(|a| element_text(&a).contains(label));

    if has_tab("Programs") {
        if doc.select(&NESTED_SITEMAP).next().is_some() {
            FacultyLayout::ProgramsByUnit
        } else {
            FacultyLayout::Programs
        }
    } else if has_tab("Academic Units") {
        FacultyLayout::Units
    } else {
        FacultyLayout::Fallback
    }
}

/// Links on the `/courses/` listing, one per course page.
pub fn course_index_links(base: &Url, html: &str) -> Vec<Target> {
    let doc = Html::parse_document(html);
    let targets: Vec<Target> = doc
        .select(&COURSE_INDEX_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .filter_map(|href| join(base, href))
        .map(|url| Target::new(url, PageKind::Course))
        .collect();
    info!("Found {} course links on {}", targets.len(), base);
    targets
}

/// Faculty links on the undergraduate landing page.
pub fn program_index_links(base: &Url, html: &str) -> Vec<Target> {
    let doc = Html::parse_document(html);
    doc.select(&SITEMAP_LINKS)
        .filter_map(|a| {
            let url = site_link(base, &a)?;
            Some(Target::new(url, PageKind::Faculty).faculty(non_empty(element_text(&a))))
        })
        .collect()
}

/// Next targets from a faculty page.
pub fn faculty_links(page: &Target, base: &Url, html: &str) -> Vec<Target> {
    let doc = Html::parse_document(html);
    let faculty = page.faculty.clone().or_else(|| faculty_from_url(&page.url));
    let layout = faculty_layout(&doc);
    debug!("Faculty page {} has layout {:?}", page.url, layout);

    let targets: Vec<Target> = match layout {
        FacultyLayout::ProgramsByUnit => doc
            .select(&SITEMAP_TOP_ITEMS)
            .flat_map(|item| {
                let unit = item
                    .select(&ANY_LINK)
                    .next()
                    .and_then(|a| non_empty(element_text(&a)));
                nested_lists(item)
                    .flat_map(|ul| ul.select(&ANY_LINK))
                    .filter_map(|a| {
                        let url = site_link(base, &a)?;
                        Some(
                            Target::new(url, PageKind::Program)
                                .faculty(faculty.clone())
                                .unit(unit.clone())
                                .program_name(non_empty(element_text(&a))),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect(),
        FacultyLayout::Programs => sitemap_targets(&doc, base, PageKind::Program, |_| true)
            .map(|(t, name)| t.faculty(faculty.clone()).program_name(name))
            .collect(),
        FacultyLayout::Units => sitemap_targets(&doc, base, PageKind::Unit, |_| true)
            .map(|(t, name)| t.faculty(faculty.clone()).unit(name))
            .collect(),
        FacultyLayout::Fallback => sitemap_targets(&doc, base, PageKind::Program, |href| {
            PROGRAM_PATH_KEYWORDS.iter().any(|kw| href.contains(kw))
        })
        .map(|(t, name)| t.faculty(faculty.clone()).program_name(name))
        .collect(),
    };

    if targets.is_empty() {
        debug!("No program or unit links found in faculty: {:?}", faculty);
    }
    targets
}

/// Program targets from an academic unit page. Unlike faculty pages,
/// every sitemap link is followed, relative or not.
pub fn unit_links(page: &Target, base: &Url, html: &str) -> Vec<Target> {
    let doc = Html::parse_document(html);
    let unit = page.unit.clone().or_else(|| unit_from_url(&page.url));
    info!("Parsing unit page: {:?} > {:?} - {}", page.faculty, unit, page.url);

    doc.select(&SITEMAP_LINKS)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let url = join(base, href)?;
            Some(
                Target::new(url, PageKind::Program)
                    .faculty(page.faculty.clone())
                    .unit(unit.clone())
                    .program_name(non_empty(element_text(&a))),
            )
        })
        .collect()
}

/// Course list of a program page, or `None` when the program has no name.
pub fn extract_program(page: &Target, html: &str) -> Option<ProgramRecord> {
    let doc = Html::parse_document(html);

    let program = page.program_name.clone().or_else(|| {
        doc.select(&HEADING)
            .next()
            .and_then(|h| first_own_text(&h))
    });
    let Some(program) = program else {
        warn!("No program name found for URL: {}", page.url);
        return None;
    };

    let courses: Vec<String> = doc
        .select(&COURSE_ROWS)
        .filter(|row| !row.html().contains("colspan"))
        .filter_map(|row| row.select(&CODE_CELL).next())
        .filter_map(|cell| course_code(&element_text(&cell)))
        .collect();

    info!(
        "Found program: {:?} > {:?} > {} with {} courses",
        page.faculty,
        page.unit,
        program,
        courses.len()
    );

    Some(ProgramRecord {
        faculty: page.faculty.clone(),
        unit: page.unit.clone(),
        program,
        url: page.url.clone(),
        courses,
    })
}

/// First course code in a code cell: `or COMP 208` → `COMP-208`.
/// Non-breaking spaces count as whitespace.
pub fn course_code(cell: &str) -> Option<String> {
    COURSE_CODE_RE
        .captures(cell)
        .map(|caps| format!("{}-{}", &caps[1], &caps[2]))
}

/// `/undergraduate/arts/` → `Arts`.
pub fn faculty_from_url(url: &str) -> Option<String> {
    FACULTY_URL_RE
        .captures(url)
        .map(|caps| title_case(&caps[1].replace('-', " ")))
}

/// `/programs/biology/` → `Biology`.
pub fn unit_from_url(url: &str) -> Option<String> {
    UNIT_URL_RE
        .captures(url)
        .map(|caps| title_case(&caps[1].replace('-', " ")))
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn sitemap_targets<'a, F>(
    doc: &'a Html,
    base: &'a Url,
    kind: PageKind,
    keep: F,
) -> impl Iterator<Item = (Target, Option<String>)> + 'a
where
    F: Fn(&str) -> bool + 'a,
{
    doc.select(&SITEMAP_LINKS).filter_map(move |a| {
        let href = a.value().attr("href")?;
        if !keep(href) {
            return None;
        }
        let url = site_link(base, &a)?;
        Some((Target::new(url, kind), non_empty(element_text(&a))))
    })
}

/// `<ul>` children of a sitemap item. Walked by hand because selector
/// matching in `ElementRef::select` is not scoped to the element.
fn nested_lists<'a>(item: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    item.children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "ul")
}

/// Absolute URL of a site-relative (`/…`) link.
fn site_link(base: &Url, a: &ElementRef) -> Option<String> {
    let href = a.value().attr("href")?;
    if !href.starts_with('/') {
        return None;
    }
    join(base, href)
}

fn join(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(String::from)
}
