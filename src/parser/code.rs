use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([A-Z]{4}\s*\d{3}[A-Z0-9]*)\.?\s*(.*)$").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const INDEX_SEGMENT: &str = "index.html";

/// Course code from the page URL: last path segment, or the one before
/// a trailing `index.html`, uppercased.
pub fn code_from_url(url: &str) -> Option<String> {
    let segments: Vec<String> = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default(),
        // Not absolute: treat the whole string as a path
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    };

    let last = segments.last()?;
    let seg = if last == INDEX_SEGMENT {
        segments.len().checked_sub(2).map(|i| &segments[i])?
    } else {
        last
    };
    Some(seg.to_uppercase())
}

/// Split a page heading like `COMP 202. Foundations of Programming.` into
/// (title, code). Headings without a leading code come back whole.
pub fn parse_title(heading: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(heading) = heading else {
        return (None, None);
    };
    let heading = heading.trim();

    match TITLE_RE.captures(heading) {
        Some(caps) => {
            let code = WS_RE.replace_all(&caps[1], "-").to_string();
            let title = caps[2].trim().trim_end_matches('.').to_string();
            (Some(title), Some(code))
        }
        None => (Some(heading.to_string()), None),
    }
}

/// URL code wins; the heading code is the fallback.
pub fn resolve(url: &str, heading: Option<&str>) -> (Option<String>, Option<String>) {
    let (title, title_code) = parse_title(heading);
    let code = code_from_url(url).or(title_code);
    (title, code)
}
