use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

const DEFAULT_TEMPLATE: &str = include_str!("../../prompts/requirements.txt");

#[derive(Serialize)]
struct PromptInput<'a> {
    prerequisite_text: Option<&'a str>,
    corequisite_text: Option<&'a str>,
}

/// Instruction template, either the built-in one or a file override.
pub fn load_template(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => fs::read_to_string(p).with_context(|| format!("Failed to read prompt template {:?}", p)),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Template, a newline, then the requirement texts as compact JSON.
pub fn build_prompt(template: &str, prerequisites: Option<&str>, corequisites: Option<&str>) -> String {
    let input = PromptInput {
        prerequisite_text: prerequisites,
        corequisite_text: corequisites,
    };
    // A struct of two optional strings always serializes
    let json = serde_json::to_string(&input).unwrap_or_default();
    format!("{}\n{}", template, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_compact_json() {
        let prompt = build_prompt("Parse this:", Some("COMP 202"), None);
        assert_eq!(
            prompt,
            "Parse this:\n{\"prerequisite_text\":\"COMP 202\",\"corequisite_text\":null}"
        );
    }

    #[test]
    fn builtin_template_mentions_output_keys() {
        let template = load_template(None).unwrap();
        assert!(template.contains("parsed_prerequisites"));
        assert!(template.contains("parsed_corequisites"));
    }

    #[test]
    fn template_override_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "custom").unwrap();
        assert_eq!(load_template(Some(&path)).unwrap(), "custom");
        assert!(load_template(Some(&dir.path().join("missing.txt"))).is_err());
    }
}
