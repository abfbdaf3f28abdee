pub mod apply;
pub mod error;
pub mod gemini;
pub mod prompt;
pub mod requester;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::records::{CourseRecord, EnrichedCourse};
use crate::settings::{self, LlmSettings, Settings};
use crate::store::JsonStore;
use gemini::GeminiClient;
use requester::{Inference, InferenceOutcome, RequestPolicy};

const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Default, Clone, Copy)]
pub struct EnrichStats {
    pub already_done: usize,
    pub without_text: usize,
    pub sent: usize,
    pub received: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl EnrichStats {
    pub fn print(&self) {
        println!(
            "{} already processed, {} without requirement text, {} sent, {} received ({} with errors){}",
            self.already_done,
            self.without_text,
            self.sent,
            self.received,
            self.failed,
            if self.interrupted { ", interrupted" } else { "" }
        );
    }
}

/// Enrich every stored course through Gemini and write the processed file.
pub async fn run(settings: &Settings) -> Result<EnrichStats> {
    let key = settings::api_key(GEMINI_KEY_VAR)
        .with_context(|| format!("{} must be set to run enrichment", GEMINI_KEY_VAR))?;
    let client = Arc::new(GeminiClient::new(&settings.llm, key)?);
    let template = prompt::load_template(settings.llm.prompt_template.as_deref())?;

    let courses: JsonStore<CourseRecord> = JsonStore::load_required(&settings.courses_path)
        .context("Run the `courses` command first")?;
    let mut processed: JsonStore<EnrichedCourse> = JsonStore::load(&settings.processed_path);
    if !processed.is_empty() {
        info!("Resuming with {} already processed courses", processed.len());
    }

    info!(
        "Preparing prompts for {} courses (model: {})",
        courses.len(),
        settings.llm.model
    );
    enrich_courses(client, courses.values(), &mut processed, &template, &settings.llm).await
}

/// Send the requirement text of every course that still needs it, applying
/// results to `store` as they arrive. The store is saved every
/// `checkpoint_every` results and once more at the end, even on error.
/// Ctrl-C stops the pass early.
pub async fn enrich_courses<C: Inference>(
    client: Arc<C>,
    courses: &[CourseRecord],
    store: &mut JsonStore<EnrichedCourse>,
    template: &str,
    cfg: &LlmSettings,
) -> Result<EnrichStats> {
    enrich_until(client, courses, store, template, cfg, ctrl_c()).await
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// `enrich_courses` with an explicit stop signal.
async fn enrich_until<C, F>(
    client: Arc<C>,
    courses: &[CourseRecord],
    store: &mut JsonStore<EnrichedCourse>,
    template: &str,
    cfg: &LlmSettings,
    stop: F,
) -> Result<EnrichStats>
where
    C: Inference,
    F: Future<Output = ()>,
{
    let mut stats = EnrichStats::default();
    let (jobs, prompts) = plan(courses, store, template, &mut stats);

    if prompts.is_empty() {
        info!("No courses need requests");
        store.save()?;
        return Ok(stats);
    }

    stats.sent = prompts.len();
    info!(
        "Sending {} prompts, {} at a time",
        prompts.len(),
        cfg.concurrency
    );
    let rx = requester::spawn_all(client, prompts, RequestPolicy::from(cfg));

    let drained = drain(rx, &jobs, store, cfg.checkpoint_every.max(1), &mut stats, stop).await;

    // Save whatever arrived before surfacing any error
    let saved = store.save();
    info!(
        "Saved {} courses to {:?} at {}",
        store.len(),
        store.path(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    drained?;
    saved?;
    Ok(stats)
}

/// Split courses into ones that need a request and ones settled without.
fn plan(
    courses: &[CourseRecord],
    store: &mut JsonStore<EnrichedCourse>,
    template: &str,
    stats: &mut EnrichStats,
) -> (Vec<CourseRecord>, Vec<String>) {
    let mut jobs = Vec::new();
    let mut prompts = Vec::new();

    for course in courses {
        let done = store
            .get(&course.code)
            .is_some_and(|c| c.parsing_error.is_none());
        if done {
            stats.already_done += 1;
            continue;
        }
        if !course.has_requirement_text() {
            stats.without_text += 1;
            store.upsert(apply::without_requirements(course));
            continue;
        }
        prompts.push(prompt::build_prompt(
            template,
            course.prerequisites_raw.as_deref(),
            course.corequisites_raw.as_deref(),
        ));
        jobs.push(course.clone());
    }

    (jobs, prompts)
}

async fn drain<F: Future<Output = ()>>(
    mut rx: mpsc::Receiver<InferenceOutcome>,
    jobs: &[CourseRecord],
    store: &mut JsonStore<EnrichedCourse>,
    checkpoint_every: usize,
    stats: &mut EnrichStats,
    stop: F,
) -> Result<()> {
    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")?
            .progress_chars("=> "),
    );

    tokio::pin!(stop);

    loop {
        let outcome = tokio::select! {
            outcome = rx.recv() => outcome,
            _ = &mut stop => {
                pb.abandon_with_message("interrupted");
                warn!("Interrupted, saving progress");
                stats.interrupted = true;
                return Ok(());
            }
        };
        let Some(outcome) = outcome else { break };

        let Some(course) = jobs.get(outcome.index) else {
            warn!("Result with unknown index {}, skipping", outcome.index);
            continue;
        };
        let enriched = apply::apply_result(course, &outcome.result);
        match &enriched.parsing_error {
            Some(e) => {
                stats.failed += 1;
                warn!("{}: {}", course.code, e);
            }
            None => pb.set_message(course.code.clone()),
        }
        store.upsert(enriched);
        stats.received += 1;
        pb.inc(1);

        if stats.received % checkpoint_every == 0 {
            store.save()?;
            info!(
                "Checkpoint: {} courses saved at {}",
                store.len(),
                Local::now().format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    pb.finish_and_clear();
    if stats.received < jobs.len() {
        warn!(
            "Only {} of {} requests returned a result",
            stats.received,
            jobs.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::error::InferenceError;
    use crate::parser::notes::classify_notes;
    use crate::records::CourseDetails;
    use serde_json::json;

    /// Answers every prompt mentioning COMP 202 with a parsed course,
    /// everything else with a server error.
    struct Canned;

    impl Inference for Canned {
        async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
            if prompt.contains("COMP 202") {
                Ok(r#"{"parsed_prerequisites":[{"type":"COURSE","code":"COMP-202"}],"parsed_corequisites":[]}"#.into())
            } else {
                Err(InferenceError::Api {
                    status: 500,
                    body: "internal".into(),
                })
            }
        }
    }

    fn course(code: &str, notes: &[&str]) -> CourseRecord {
        CourseRecord::assemble(
            &format!("https://x.ca/courses/{}/", code.to_lowercase()),
            code.into(),
            CourseDetails::default(),
            classify_notes(notes),
        )
    }

    fn cfg() -> LlmSettings {
        LlmSettings {
            concurrency: 2,
            retry_attempts: 1,
            initial_retry_delay_secs: 0,
            checkpoint_every: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn enriches_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        let mut store = JsonStore::empty(&path);
        let courses = vec![
            course("COMP-250", &["Prerequisite: COMP 202"]),
            course("COMP-189", &["Students should bring a laptop."]),
            course("COMP-302", &["Prerequisite: COMP 250"]),
        ];

        let stats = enrich_courses(Arc::new(Canned), &courses, &mut store, "T", &cfg())
            .await
            .unwrap();
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.received, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.without_text, 1);

        let ok = store.get("COMP-250").unwrap();
        assert_eq!(ok.prerequisites_parsed, vec![json!({"type": "COURSE", "code": "COMP-202"})]);
        assert_eq!(ok.parsing_error, None);

        let plain = store.get("COMP-189").unwrap();
        assert!(plain.prerequisites_parsed.is_empty());
        assert_eq!(plain.parsing_error, None);

        let failed = store.get("COMP-302").unwrap();
        assert_eq!(
            failed.parsing_error.as_deref(),
            Some("API error 500: internal (Status: 500)")
        );

        let saved: JsonStore<EnrichedCourse> = JsonStore::load_required(&path).unwrap();
        assert_eq!(saved.len(), 3);
    }

    #[tokio::test]
    async fn resume_skips_finished_and_retries_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::empty(dir.path().join("processed.json"));
        let done = course("COMP-250", &["Prerequisite: COMP 206"]);
        let failed = course("COMP-251", &["Prerequisite: COMP 202"]);
        store.upsert(apply::without_requirements(&done));
        store.upsert(apply::apply_result(&failed, &Err(InferenceError::Timeout)));

        let stats = enrich_courses(Arc::new(Canned), &[done, failed], &mut store, "T", &cfg())
            .await
            .unwrap();
        assert_eq!(stats.already_done, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(store.get("COMP-251").unwrap().parsing_error, None);
        // Left untouched even though its prompt would now fail
        assert_eq!(store.get("COMP-250").unwrap().parsing_error, None);
    }

    #[test]
    fn plan_builds_prompts_in_course_order() {
        let mut store = JsonStore::empty("unused.json");
        let mut stats = EnrichStats::default();
        let courses = vec![
            course("MATH-240", &["Corequisite: MATH 133"]),
            course("MATH-133", &[]),
            course("MATH-248", &["Prerequisite: MATH 222"]),
        ];
        let (jobs, prompts) = plan(&courses, &mut store, "T", &mut stats);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].code, "MATH-248");
        assert_eq!(
            prompts[0],
            "T\n{\"prerequisite_text\":null,\"corequisite_text\":\"MATH 133\"}"
        );
        assert_eq!(stats.without_text, 1);
        assert!(store.get("MATH-133").is_some());
    }

    /// Answers prompts mentioning COMP 202 and never answers the rest.
    struct Stalls;

    impl Inference for Stalls {
        async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
            if prompt.contains("COMP 202") {
                Ok(r#"{"parsed_prerequisites":[],"parsed_corequisites":[]}"#.into())
            } else {
                std::future::pending::<Result<String, InferenceError>>().await
            }
        }
    }

    fn saved_len(path: &std::path::Path) -> usize {
        JsonStore::<EnrichedCourse>::load_required(path)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn checkpoints_while_running_and_saves_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        let mut store = JsonStore::empty(&path);
        let courses = vec![
            course("COMP-250", &["Prerequisite: COMP 202"]),
            course("COMP-251", &["Prerequisite: COMP 202"]),
            course("MATH-999", &["Prerequisite: MATH 998"]),
        ];
        let cfg = LlmSettings {
            concurrency: 3,
            ..cfg()
        };

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let watched = path.clone();
        let watch = async move {
            // The pass cannot finish on its own, so anything on disk here
            // came from a checkpoint
            while saved_len(&watched) < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            let seen = saved_len(&watched);
            let _ = stop_tx.send(());
            seen
        };
        let stop = async move {
            let _ = stop_rx.await;
        };
        let run = enrich_until(Arc::new(Stalls), &courses, &mut store, "T", &cfg, stop);

        let (stats, seen) = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            tokio::join!(run, watch)
        })
        .await
        .unwrap();
        let stats = stats.unwrap();

        assert_eq!(seen, 2);
        assert!(stats.interrupted);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.received, 2);
        assert!(store.get("MATH-999").is_none());
        assert_eq!(saved_len(&path), 2);
    }
}
