use serde::Deserialize;
use serde_json::{json, Value};

use super::error::InferenceError;
use crate::records::{CourseRecord, EnrichedCourse};

const RAW_PREVIEW_CHARS: usize = 200;

#[derive(Deserialize)]
struct ParsedRequirements {
    #[serde(default)]
    parsed_prerequisites: Vec<Value>,
    #[serde(default)]
    parsed_corequisites: Vec<Value>,
}

/// Merge one inference result into a course.
///
/// Request failures and unparseable responses both leave a `parsing_error`
/// and fall back to the raw text wrapped as a single TEXTUAL requirement.
pub fn apply_result(course: &CourseRecord, result: &Result<String, InferenceError>) -> EnrichedCourse {
    match result {
        Ok(raw) => match serde_json::from_str::<ParsedRequirements>(raw) {
            Ok(parsed) => EnrichedCourse {
                course: course.clone(),
                prerequisites_parsed: parsed.parsed_prerequisites,
                corequisites_parsed: parsed.parsed_corequisites,
                parsing_error: None,
            },
            Err(e) => {
                let preview: String = raw.chars().take(RAW_PREVIEW_CHARS).collect();
                textual_fallback(
                    course,
                    format!("invalid JSON response: {}. Raw response: {}...", e, preview),
                )
            }
        },
        Err(err) => textual_fallback(course, format!("{} (Status: {})", err, err.status_label())),
    }
}

/// A course with no requirement text needs no request.
pub fn without_requirements(course: &CourseRecord) -> EnrichedCourse {
    EnrichedCourse {
        course: course.clone(),
        prerequisites_parsed: Vec::new(),
        corequisites_parsed: Vec::new(),
        parsing_error: None,
    }
}

fn textual_fallback(course: &CourseRecord, message: String) -> EnrichedCourse {
    EnrichedCourse {
        course: course.clone(),
        prerequisites_parsed: vec![textual(course.prerequisites_raw.as_deref())],
        corequisites_parsed: vec![textual(course.corequisites_raw.as_deref())],
        parsing_error: Some(message),
    }
}

fn textual(text: Option<&str>) -> Value {
    json!({ "type": "TEXTUAL", "text": text })
}
