use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::frontier::Target;
use crate::settings::{self, FetchSettings};

const SPIDER_KEY_VAR: &str = "SPIDER_API_KEY";
const USER_AGENT: &str = concat!("catalogue_scraper/", env!("CARGO_PKG_VERSION"));

static TRANSIENT_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)timed out|rate limit|too many requests|\bstatus(?: code)?:? (?:429|500|502|503)\b|\b(?:429|500|502|503) (?:too many requests|internal server error|bad gateway|service unavailable)",
    )
    .unwrap()
});

/// One downloaded page (or the reason it could not be downloaded).
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub target: Target,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Fetch stats for one wave.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Where page HTML comes from: the spider.cloud API when a key is set,
/// plain HTTP otherwise.
pub enum Fetcher {
    Spider(Spider),
    Direct(reqwest::Client),
}

impl Fetcher {
    pub fn from_env(cfg: &FetchSettings) -> Result<Self> {
        match settings::api_key(SPIDER_KEY_VAR) {
            Some(key) => {
                let spider = Spider::new(Some(key))
                    .map_err(|e| anyhow!("Failed to create Spider client: {}", e))?;
                info!("Fetching pages through spider.cloud");
                Ok(Fetcher::Spider(spider))
            }
            None => {
                let client = reqwest::Client::builder()
                    .user_agent(USER_AGENT)
                    .timeout(cfg.timeout())
                    .build()?;
                info!("{} not set, fetching pages directly", SPIDER_KEY_VAR);
                Ok(Fetcher::Direct(client))
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> PageResponse {
        match self {
            Fetcher::Spider(spider) => spider_fetch(spider, url).await,
            Fetcher::Direct(client) => direct_fetch(client, url).await,
        }
    }
}

struct PageResponse {
    html: Option<String>,
    status: Option<i32>,
    error: Option<String>,
}

impl PageResponse {
    /// A known status decides on its own; the error text is only consulted
    /// when no response came back at all.
    fn retryable(&self) -> bool {
        match self.status {
            Some(code) => matches!(code, 429 | 500 | 502 | 503),
            None => self
                .error
                .as_deref()
                .is_some_and(|e| TRANSIENT_ERROR_RE.is_match(e)),
        }
    }
}

fn backoff_delay(backoff_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(backoff_ms).saturating_mul(2u32.saturating_pow(attempt))
}

/// Fetch a wave of targets concurrently. Results come back in completion
/// order; failures are returned as pages with `error` set.
pub async fn fetch_wave(
    fetcher: Arc<Fetcher>,
    targets: Vec<Target>,
    cfg: &FetchSettings,
) -> Result<(Vec<FetchedPage>, FetchStats)> {
    let semaphore = Arc::new(Semaphore::new(cfg.concurrency));
    let total = targets.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, this loop collects them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchedPage>(cfg.concurrency * 2);

    for target in targets {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let retries = cfg.max_retries;
        let backoff_ms = cfg.base_backoff_ms;

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let page = fetch_with_retry(&fetcher, target, retries, backoff_ms).await;
            let _ = tx.send(page).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut pages = Vec::with_capacity(total);
    let mut stats = FetchStats {
        total,
        ..Default::default()
    };
    while let Some(page) = rx.recv().await {
        debug!(
            "{} -> status {:?} in {}ms",
            page.target.url,
            page.status,
            page.latency_ms.unwrap_or_default()
        );
        if page.error.is_some() {
            stats.errors += 1;
        } else {
            stats.ok += 1;
        }
        pages.push(page);
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, stats.ok, stats.errors);
    Ok((pages, stats))
}

async fn fetch_with_retry(
    fetcher: &Fetcher,
    target: Target,
    max_retries: u32,
    backoff_ms: u64,
) -> FetchedPage {
    let mut attempt = 0;
    loop {
        let start = Instant::now();
        let resp = fetcher.fetch_once(&target.url).await;
        let elapsed = start.elapsed().as_millis() as i64;

        if !resp.retryable() || attempt >= max_retries {
            if let Some(e) = &resp.error {
                warn!("Fetch failed for {}: {}", target.url, e);
            }
            return FetchedPage {
                target,
                html: resp.html,
                status: resp.status,
                error: resp.error,
                latency_ms: Some(elapsed),
            };
        }

        let backoff = backoff_delay(backoff_ms, attempt);
        warn!(
            "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
            target.url,
            attempt + 1,
            max_retries,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

async fn spider_fetch(spider: &Spider, url: &str) -> PageResponse {
    let params = RequestParams {
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
        ..Default::default()
    };

    match spider.scrape_url(url, Some(params), "application/json").await {
        Ok(value) => {
            let parsed: serde_json::Value = match value.as_str() {
                Some(s) => serde_json::from_str(s).unwrap_or(value.clone()),
                None => value,
            };
            let first = parsed.as_array().and_then(|arr| arr.first());

            let html = first
                .and_then(|obj| obj.get("content"))
                .and_then(|c| c.as_str())
                .map(str::to_string);
            let status = first
                .and_then(|obj| obj.get("status"))
                .and_then(|s| s.as_i64())
                .map(|s| s as i32);
            let error = match (&html, status) {
                (_, Some(code)) if code >= 400 => Some(format!("HTTP {}", code)),
                (None, _) => Some("No content in spider response".to_string()),
                _ => None,
            };
            PageResponse {
                html: if error.is_some() { None } else { html },
                status,
                error,
            }
        }
        Err(e) => PageResponse {
            html: None,
            status: None,
            error: Some(e.to_string()),
        },
    }
}

async fn direct_fetch(client: &reqwest::Client, url: &str) -> PageResponse {
    let resp = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            return PageResponse {
                html: None,
                status: None,
                error: Some(e.to_string()),
            }
        }
    };

    let status = resp.status();
    let code = Some(status.as_u16() as i32);
    if !status.is_success() {
        return PageResponse {
            html: None,
            status: code,
            error: Some(format!("HTTP {}", status.as_u16())),
        };
    }

    match resp.text().await {
        Ok(body) => PageResponse {
            html: Some(body),
            status: code,
            error: None,
        },
        Err(e) => PageResponse {
            html: None,
            status: code,
            error: Some(e.to_string()),
        },
    }
}

/// Fetch a single URL and return its HTML.
pub async fn fetch_single_page(fetcher: &Fetcher, url: &str) -> Result<String> {
    let resp = fetcher.fetch_once(url).await;
    match (resp.html, resp.error) {
        (Some(html), None) => Ok(html),
        (_, Some(e)) => Err(anyhow!("Fetch failed for {}: {}", url, e)),
        (None, None) => Err(anyhow!("No content for {}", url)),
    }
}
