use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, warn};

use super::error::InferenceError;
use super::gemini::preview;
use crate::settings::LlmSettings;

/// Something that turns a prompt into response text.
pub trait Inference: Send + Sync + 'static {
    fn infer(&self, prompt: &str) -> impl Future<Output = Result<String, InferenceError>> + Send;
}

/// Limits applied to a batch of requests.
#[derive(Debug, Clone, Copy)]
pub struct RequestPolicy {
    pub concurrency: usize,
    /// Total tries per prompt, including the first.
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl From<&LlmSettings> for RequestPolicy {
    fn from(cfg: &LlmSettings) -> Self {
        RequestPolicy {
            concurrency: cfg.concurrency.max(1),
            attempts: cfg.retry_attempts.max(1),
            initial_delay: Duration::from_secs(cfg.initial_retry_delay_secs),
        }
    }
}

/// One finished request, tagged with the position of its prompt.
#[derive(Debug)]
pub struct InferenceOutcome {
    pub index: usize,
    pub result: Result<String, InferenceError>,
}

/// Start one task per prompt and return a receiver yielding outcomes in
/// completion order. At most `policy.concurrency` requests are in flight.
pub fn spawn_all<C: Inference>(
    client: Arc<C>,
    prompts: Vec<String>,
    policy: RequestPolicy,
) -> mpsc::Receiver<InferenceOutcome> {
    let semaphore = Arc::new(Semaphore::new(policy.concurrency));
    let (tx, rx) = mpsc::channel(policy.concurrency * 2);

    for (index, prompt) in prompts.into_iter().enumerate() {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let result = infer_with_retry(client.as_ref(), &prompt, policy).await;
            // Receiver gone means the run was interrupted
            let _ = tx.send(InferenceOutcome { index, result }).await;
        });
    }

    rx
}

/// Retry rate limits and transient failures with exponential backoff.
pub async fn infer_with_retry<C: Inference>(
    client: &C,
    prompt: &str,
    policy: RequestPolicy,
) -> Result<String, InferenceError> {
    let mut attempt = 0u32;
    loop {
        debug!(
            "Sending prompt (attempt {}/{}): {}...",
            attempt + 1,
            policy.attempts,
            preview(prompt)
        );
        let err = match client.infer(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        if !err.is_retryable() {
            error!("Request failed for prompt {}...: {}", preview(prompt), err);
            return Err(err);
        }

        attempt += 1;
        if attempt >= policy.attempts {
            error!(
                "Max retries ({}) reached for prompt {}...: {}",
                policy.attempts,
                preview(prompt),
                err
            );
            return Err(InferenceError::Exhausted {
                attempts: policy.attempts,
                last: Box::new(err),
            });
        }

        let delay = backoff(&err, policy.initial_delay, attempt - 1);
        warn!(
            "{} for prompt {}..., retrying in {:.1}s (attempt {}/{})",
            err,
            preview(prompt),
            delay.as_secs_f64(),
            attempt,
            policy.attempts
        );
        tokio::time::sleep(delay).await;
    }
}

fn backoff(err: &InferenceError, initial: Duration, attempt: u32) -> Duration {
    let exp = initial.saturating_mul(2u32.saturating_pow(attempt));
    match err {
        InferenceError::RateLimited {
            retry_after: Some(hint),
        } => exp.max(*hint),
        _ => exp,
    }
}
