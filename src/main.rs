mod crawl;
mod enrich;
mod fetch;
mod frontier;
mod parser;
mod records;
mod settings;
mod store;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::fetch::Fetcher;
use crate::frontier::{PageKind, Target};
use crate::records::{CourseRecord, EnrichedCourse};
use crate::settings::Settings;
use crate::store::{Catalogue, JsonStore};

#[derive(Parser)]
#[command(
    name = "catalogue_scraper",
    about = "McGill course catalogue scraper with LLM requirement parsing"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the course listing and store every course page
    Courses {
        /// Max pages to fetch beyond the listing (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch one course page and print its record as JSON
    Course {
        /// Course page URL
        url: String,
    },
    /// Crawl faculties, units and programs and store program course lists
    Programs {
        /// Max pages to fetch beyond the program index (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Parse stored prerequisite/corequisite text through Gemini
    Enrich,
    /// Show counts from the stored files
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let base = settings.base_url.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Courses { limit } => {
            let seed = Target::new(format!("{}/courses/", base), PageKind::CourseIndex);
            run_crawl(&settings, seed, limit).await
        }
        Commands::Programs { limit } => {
            let seed = Target::new(format!("{}/en/undergraduate/", base), PageKind::ProgramIndex);
            run_crawl(&settings, seed, limit).await
        }
        Commands::Course { url } => {
            let fetcher = Fetcher::from_env(&settings.fetch)?;
            let html = fetch::fetch_single_page(&fetcher, &url).await?;
            let record = parser::course::extract(&url, &html)
                .with_context(|| format!("Could not determine course code for {}", url))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::Enrich => {
            let stats = enrich::run(&settings).await?;
            stats.print();
            Ok(())
        }
        Commands::Stats => {
            print_stats(&settings);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_crawl(settings: &Settings, seed: Target, limit: Option<usize>) -> anyhow::Result<()> {
    let fetcher = Arc::new(Fetcher::from_env(&settings.fetch)?);
    let mut catalogue = Catalogue::open(&settings.courses_path, &settings.programs_path);
    println!("Crawling from {}...", seed.url);

    let summary = crawl::crawl(fetcher, seed, &settings.fetch, limit, &mut catalogue).await;
    // Keep what was collected even if the crawl failed part way
    catalogue.save()?;
    let summary = summary?;

    summary.print();
    println!(
        "Stored {} courses in {:?}, {} programs in {:?}",
        catalogue.courses.len(),
        catalogue.courses.path(),
        catalogue.programs.len(),
        catalogue.programs.path()
    );
    Ok(())
}

fn print_stats(settings: &Settings) {
    let catalogue = Catalogue::open(&settings.courses_path, &settings.programs_path);
    let processed: JsonStore<EnrichedCourse> = JsonStore::load(&settings.processed_path);

    let courses = catalogue.courses.values();
    let with_text = courses.iter().filter(|c| c.has_requirement_text()).count();
    let linked: usize = catalogue.programs.values().iter().map(|p| p.courses.len()).sum();
    let errors = processed
        .values()
        .iter()
        .filter(|c| c.parsing_error.is_some())
        .count();

    println!("Courses:            {}", courses.len());
    println!("  with requirements {}", with_text);
    println!("  with hours        {}", count(courses, |c| c.hours_info.is_some()));
    println!("Programs:           {}", catalogue.programs.len());
    println!("  course entries    {}", linked);
    println!("Processed:          {}", processed.len());
    println!("  parsing errors    {}", errors);
}

fn count(courses: &[CourseRecord], pred: impl Fn(&CourseRecord) -> bool) -> usize {
    courses.iter().filter(|c| pred(c)).count()
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
