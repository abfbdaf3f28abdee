use std::collections::{HashSet, VecDeque};

use tracing::debug;

/// What a URL is expected to hold, which picks its page handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    CourseIndex,
    Course,
    ProgramIndex,
    Faculty,
    Unit,
    Program,
}

/// A page to visit plus the metadata gathered on the way to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub kind: PageKind,
    pub faculty: Option<String>,
    pub unit: Option<String>,
    pub program_name: Option<String>,
}

impl Target {
    pub fn new(url: impl Into<String>, kind: PageKind) -> Self {
        Target {
            url: url.into(),
            kind,
            faculty: None,
            unit: None,
            program_name: None,
        }
    }

    pub fn faculty(mut self, faculty: Option<String>) -> Self {
        self.faculty = faculty;
        self
    }

    pub fn unit(mut self, unit: Option<String>) -> Self {
        self.unit = unit;
        self
    }

    pub fn program_name(mut self, name: Option<String>) -> Self {
        self.program_name = name;
        self
    }
}

/// Pending targets plus every absolute URL ever enqueued.
///
/// A URL counts as visited from the moment it is queued, so each page is
/// fetched at most once per crawl.
#[derive(Debug, Default)]
pub struct Frontier {
    visited: HashSet<String>,
    queue: VecDeque<Target>,
    limit: Option<usize>,
}

impl Frontier {
    pub fn new(limit: Option<usize>) -> Self {
        Frontier {
            limit,
            ..Default::default()
        }
    }

    /// Queue a target unless its URL was seen or the page budget is spent.
    pub fn push(&mut self, target: Target) -> bool {
        if self.limit.is_some_and(|max| self.visited.len() >= max) {
            debug!("Page limit reached, dropping {}", target.url);
            return false;
        }
        if !self.visited.insert(target.url.clone()) {
            return false;
        }
        self.queue.push_back(target);
        true
    }

    pub fn extend(&mut self, targets: impl IntoIterator<Item = Target>) -> usize {
        targets.into_iter().filter_map(|t| self.push(t).then_some(())).count()
    }

    /// Take everything queued so far as one fetch wave.
    pub fn next_wave(&mut self) -> Vec<Target> {
        self.queue.drain(..).collect()
    }

    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}
