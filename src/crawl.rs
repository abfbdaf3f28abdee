use std::sync::Arc;

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::fetch::{self, Fetcher};
use crate::frontier::{Frontier, Target};
use crate::parser::{self, PageOutcome};
use crate::records::{CourseRecord, ProgramRecord};
use crate::settings::FetchSettings;

const PARSE_CHUNK: usize = 500;

/// Consumer of crawl output.
pub trait RecordSink {
    fn course(&mut self, record: CourseRecord);
    fn program(&mut self, record: ProgramRecord);
    /// Called after every wave.
    fn checkpoint(&mut self) -> Result<()>;
}

impl RecordSink for crate::store::Catalogue {
    fn course(&mut self, record: CourseRecord) {
        self.courses.upsert(record);
    }

    fn program(&mut self, record: ProgramRecord) {
        self.programs.upsert(record);
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.save()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CrawlSummary {
    pub waves: usize,
    pub pages: usize,
    pub fetch_errors: usize,
    pub courses: usize,
    pub programs: usize,
    pub skipped: usize,
}

impl CrawlSummary {
    pub fn print(&self) {
        println!(
            "Visited {} pages in {} waves ({} fetch errors): {} courses, {} programs, {} skipped.",
            self.pages, self.waves, self.fetch_errors, self.courses, self.programs, self.skipped
        );
    }
}

/// Crawl outward from `seed` one wave at a time: fetch everything queued,
/// parse the wave in parallel, hand records to `sink`, queue new links.
pub async fn crawl<S: RecordSink>(
    fetcher: Arc<Fetcher>,
    seed: Target,
    cfg: &FetchSettings,
    limit: Option<usize>,
    sink: &mut S,
) -> Result<CrawlSummary> {
    // The seed page itself does not count against the limit
    let mut frontier = Frontier::new(limit.map(|n| n + 1));
    frontier.push(seed);
    let mut summary = CrawlSummary::default();

    while !frontier.is_done() {
        let wave = frontier.next_wave();
        summary.waves += 1;
        info!("Wave {}: fetching {} pages", summary.waves, wave.len());

        let (pages, stats) = fetch::fetch_wave(Arc::clone(&fetcher), wave, cfg).await?;
        summary.pages += stats.total;
        summary.fetch_errors += stats.errors;

        for chunk in pages.chunks(PARSE_CHUNK) {
            let outcomes: Vec<PageOutcome> = chunk.par_iter().map(parser::visit).collect();
            for outcome in outcomes {
                absorb(outcome, &mut frontier, sink, &mut summary);
            }
        }

        sink.checkpoint()?;
    }

    info!("Crawl finished after {} pages", frontier.visited_count());
    Ok(summary)
}

fn absorb<S: RecordSink>(
    outcome: PageOutcome,
    frontier: &mut Frontier,
    sink: &mut S,
    summary: &mut CrawlSummary,
) {
    match outcome {
        PageOutcome::Course(rec) => {
            summary.courses += 1;
            sink.course(rec);
        }
        PageOutcome::Program(rec) => {
            summary.programs += 1;
            sink.program(rec);
        }
        PageOutcome::Follow(targets) => {
            let found = targets.len();
            let queued = frontier.extend(targets);
            debug!("Queued {} of {} links", queued, found);
        }
        PageOutcome::Skipped(reason) => {
            summary.skipped += 1;
            warn!("Skipped page: {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::PageKind;
    use crate::parser::visit_html;

    #[derive(Default)]
    struct Collect {
        courses: Vec<CourseRecord>,
        programs: Vec<ProgramRecord>,
    }

    impl RecordSink for Collect {
        fn course(&mut self, record: CourseRecord) {
            self.courses.push(record);
        }
        fn program(&mut self, record: ProgramRecord) {
            self.programs.push(record);
        }
        fn checkpoint(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn outcomes_route_to_sink_and_frontier() {
        let mut frontier = Frontier::new(None);
        let mut sink = Collect::default();
        let mut summary = CrawlSummary::default();

        let faculty = Target::new("https://coursecatalogue.mcgill.ca/en/undergraduate/science/", PageKind::Faculty);
        let html = std::fs::read_to_string("tests/fixtures/faculty-science.html").unwrap();
        absorb(visit_html(&faculty, &html), &mut frontier, &mut sink, &mut summary);
        // Same page twice queues nothing new
        absorb(visit_html(&faculty, &html), &mut frontier, &mut sink, &mut summary);
        assert_eq!(frontier.next_wave().len(), 3);

        let program = Target::new("https://coursecatalogue.mcgill.ca/p/", PageKind::Program)
            .program_name(Some("Biology Major".into()));
        let html = std::fs::read_to_string("tests/fixtures/program-biology.html").unwrap();
        absorb(visit_html(&program, &html), &mut frontier, &mut sink, &mut summary);
        absorb(PageOutcome::Skipped("gone".into()), &mut frontier, &mut sink, &mut summary);

        assert_eq!(sink.programs.len(), 1);
        assert_eq!(sink.programs[0].program, "Biology Major");
        assert_eq!(summary.programs, 1);
        assert_eq!(summary.skipped, 1);
        assert!(sink.courses.is_empty());
    }
}
