use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::records::{CourseRecord, Keyed, ProgramRecord};

/// An ordered JSON array of records, upserted by key.
///
/// Order is first-insertion order; replacing a record keeps its slot.
pub struct JsonStore<T> {
    path: PathBuf,
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> JsonStore<T>
where
    T: Keyed + Serialize + DeserializeOwned,
{
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        JsonStore {
            path: path.into(),
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load the array at `path`. A missing file is an empty store. An
    /// unreadable one is moved aside to `*.json.bad` and also treated as
    /// empty, so a later save cannot overwrite it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(path);
        match read_array::<T>(&store.path) {
            Ok(Some(items)) => {
                for item in items {
                    store.upsert(item);
                }
                info!("Loaded {} records from {:?}", store.len(), store.path);
            }
            Ok(None) => {}
            Err(e) => {
                let aside = store.path.with_extension("json.bad");
                match fs::rename(&store.path, &aside) {
                    Ok(()) => warn!(
                        "Could not load existing file {:?}, moved it to {:?} and starting from scratch: {:#}",
                        store.path, aside, e
                    ),
                    Err(mv) => warn!(
                        "Could not load existing file {:?} or move it aside ({}), starting from scratch: {:#}",
                        store.path, mv, e
                    ),
                }
            }
        }
        store
    }

    /// Load the array at `path`, failing if it is missing or malformed.
    pub fn load_required(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::empty(path);
        let items = read_array::<T>(&store.path)?
            .with_context(|| format!("{:?} does not exist", store.path))?;
        for item in items {
            store.upsert(item);
        }
        Ok(store)
    }

    /// Insert or replace by key. Returns true if the key was new.
    pub fn upsert(&mut self, item: T) -> bool {
        match self.index.get(item.key()) {
            Some(&i) => {
                self.items[i] = item;
                false
            }
            None => {
                self.index.insert(item.key().to_string(), self.items.len());
                self.items.push(item);
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&i| &self.items[i])
    }

    pub fn values(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the whole file. Written to a sibling temp file first and
    /// renamed, so an interrupted save never truncates the previous one.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp).with_context(|| format!("Failed to create {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.items)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move {:?} into place", tmp))?;
        Ok(())
    }
}

fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let items = serde_json::from_str(&raw).with_context(|| format!("Malformed JSON in {:?}", path))?;
    Ok(Some(items))
}

/// Crawl output: courses keyed by code, programs keyed by URL.
pub struct Catalogue {
    pub courses: JsonStore<CourseRecord>,
    pub programs: JsonStore<ProgramRecord>,
}

impl Catalogue {
    pub fn open(courses: &Path, programs: &Path) -> Self {
        Catalogue {
            courses: JsonStore::load(courses),
            programs: JsonStore::load(programs),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.courses.save()?;
        self.programs.save()
    }
}
