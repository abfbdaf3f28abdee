use scraper::ElementRef;

/// Join text fragments into one whitespace-clean string, dropping empty ones.
pub fn normalize<'a, I>(fragments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    fragments
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// All descendant text of an element, normalized.
pub fn element_text(el: &ElementRef) -> String {
    normalize(el.text())
}

/// Direct child text nodes only (what `::text` selects), normalized.
pub fn own_text(el: &ElementRef) -> String {
    let parts: Vec<String> = el
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect();
    normalize(parts.iter().map(String::as_str))
}

/// First direct child text node that is not blank, trimmed.
pub fn first_own_text(el: &ElementRef) -> Option<String> {
    el.children()
        .filter_map(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .find(|t| !t.is_empty())
}

/// Empty means absent.
pub fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn joins_trimmed_fragments() {
        let out = normalize(["  Prerequisite: ", "MATH 133", "\n", " and ", "MATH 140  "]);
        assert_eq!(out, "Prerequisite: MATH 133 and MATH 140");
    }

    #[test]
    fn empty_input_is_empty_string() {
        assert_eq!(normalize(Vec::<&str>::new()), "");
        assert_eq!(normalize(["  ", "\n\t", ""]), "");
    }

    #[test]
    fn element_text_spans_nested_nodes() {
        let html = Html::parse_fragment(
            r#"<li>Prerequisite: <a href="/courses/comp-202/">COMP 202</a>
               or <a href="/courses/comp-208/">COMP 208</a>.</li>"#,
        );
        let li = Selector::parse("li").unwrap();
        let el = html.select(&li).next().unwrap();
        assert_eq!(element_text(&el), "Prerequisite: COMP 202 or COMP 208 .");
    }

    #[test]
    fn own_text_skips_children() {
        let html = Html::parse_fragment("<h1> COMP 202. <span>ignored</span> Intro </h1>");
        let h1 = Selector::parse("h1").unwrap();
        let el = html.select(&h1).next().unwrap();
        assert_eq!(own_text(&el), "COMP 202. Intro");
        assert_eq!(first_own_text(&el).as_deref(), Some("COMP 202."));
    }

    #[test]
    fn non_empty_maps_blank_to_none() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("3 credits".into()).as_deref(), Some("3 credits"));
    }
}
