//! Per-context persistence
//!
//! Every context owns two files in the data directory:
//! 1. `<ctx>.bin`: append-only, one escaped record per line, in arrival order
//! 2. `<ctx>.meta`: JSON counters, rewritten via temp file + rename after every PROCESS
//!
//! The store hands out one shared [`ContextHandle`] per context name. All
//! appends to a context go through that handle's write lock, so two sessions
//! bound to the same name never interleave a log append with a counters
//! rewrite. Scans take the read lock and may run concurrently.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use lru::LruCache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::context::{ContextName, ContextStats};
use crate::encoder::{encode, Record};
use crate::error::{Result, SlcError};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `<ctx>.bin` and `<ctx>.meta` files
    pub data_dir: PathBuf,
    /// Number of recently used context handles kept open
    pub cache_size: usize,
    /// Scan records with rayon
    pub parallel_scan: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("reader.persistence"),
            cache_size: 64,
            parallel_scan: true,
        }
    }
}

impl StorageConfig {
    /// Create config rooted at a data directory
    pub fn with_data_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: path.into(),
            ..Default::default()
        }
    }
}

/// Open context handles, keyed by name
struct HandleRegistry {
    /// Recently used handles, kept alive between sessions
    warm: LruCache<ContextName, Arc<ContextHandle>>,
    /// Every handle still referenced by a session
    live: HashMap<ContextName, Weak<ContextHandle>>,
}

/// Store of named contexts
pub struct ContextStore {
    config: StorageConfig,
    registry: Mutex<HandleRegistry>,
}

impl ContextStore {
    /// Create a store, creating the data directory if needed
    pub fn new(config: StorageConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.cache_size)
            .ok_or_else(|| SlcError::Config("Cache size must be > 0".into()))?;

        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            registry: Mutex::new(HandleRegistry {
                warm: LruCache::new(capacity),
                live: HashMap::new(),
            }),
            config,
        })
    }

    /// Open a context, resuming its persisted counters if any.
    ///
    /// Returns the same handle to every caller while any of them holds it.
    pub async fn open_or_resume(&self, name: &ContextName) -> Result<Arc<ContextHandle>> {
        let mut registry = self.registry.lock().await;

        if let Some(handle) = registry.warm.get(name) {
            return Ok(Arc::clone(handle));
        }

        if let Some(handle) = registry.live.get(name).and_then(Weak::upgrade) {
            registry.warm.put(name.clone(), Arc::clone(&handle));
            return Ok(handle);
        }

        let handle = Arc::new(ContextHandle::load(name.clone(), &self.config).await?);
        registry.live.retain(|_, weak| weak.strong_count() > 0);
        registry.live.insert(name.clone(), Arc::downgrade(&handle));
        registry.warm.put(name.clone(), Arc::clone(&handle));

        Ok(handle)
    }

    /// Number of context handles currently alive
    pub async fn open_contexts(&self) -> usize {
        let registry = self.registry.lock().await;
        registry
            .live
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Shared handle to one context's log and counters
pub struct ContextHandle {
    name: ContextName,
    log_path: PathBuf,
    meta_path: PathBuf,
    stats: RwLock<ContextStats>,
    parallel_scan: bool,
}

impl ContextHandle {
    async fn load(name: ContextName, config: &StorageConfig) -> Result<Self> {
        let log_path = config.data_dir.join(format!("{}.bin", name));
        let meta_path = config.data_dir.join(format!("{}.meta", name));

        let stats = match read_meta(&meta_path).await? {
            Some(stats) => {
                info!(context = %name, total = stats.total(), "Resuming previous context");
                stats
            }
            None => {
                info!(context = %name, "Opening new context");
                ContextStats::default()
            }
        };

        Ok(Self {
            name,
            log_path,
            meta_path,
            stats: RwLock::new(stats),
            parallel_scan: config.parallel_scan,
        })
    }

    pub fn name(&self) -> &ContextName {
        &self.name
    }

    /// Current counters
    pub async fn stats(&self) -> ContextStats {
        *self.stats.read().await
    }

    /// Encode a line and append its record
    pub async fn process(&self, line: &str) -> Result<Record> {
        let record = encode(line);
        let stats = self.append(line.chars().count(), &record).await?;

        debug!(
            context = %self.name,
            b = stats.b,
            bc = stats.bc,
            succ = stats.succ,
            total = stats.total(),
            line = %line.chars().take(40).collect::<String>(),
            "Processed line"
        );

        Ok(record)
    }

    /// Append one record and rewrite the counters snapshot.
    ///
    /// Counters are updated whether or not the append succeeds: a failed
    /// append counts towards `errs` and is still reported as an error. If the
    /// snapshot cannot be written the record is cut from the log again and
    /// counted as failed, so `.bin` never holds more records than `succ`.
    pub async fn append(&self, raw_len: usize, record: &Record) -> Result<ContextStats> {
        let mut stats = self.stats.write().await;
        let mut next = *stats;

        let appended = append_line(&self.log_path, &escape_record(record.as_str())).await;
        next.record_line(raw_len, record.len(), appended.is_ok());

        let offset = match appended {
            Ok(offset) => offset,
            Err(e) => {
                warn!(context = %self.name, error = %e, "Failed to append record");
                *stats = next;
                if let Err(meta) = write_meta(&self.meta_path, &next).await {
                    warn!(context = %self.name, error = %meta, "Failed to write counters");
                }
                return Err(e.into());
            }
        };

        if let Err(e) = write_meta(&self.meta_path, &next).await {
            warn!(context = %self.name, error = %e, "Failed to write counters, dropping record");
            if let Err(truncate) = truncate_log(&self.log_path, offset).await {
                warn!(context = %self.name, error = %truncate, "Failed to drop record");
            }
            stats.record_line(raw_len, record.len(), false);
            return Err(e);
        }

        *stats = next;
        Ok(next)
    }

    /// Encode a search term and count the records containing it
    pub async fn search(&self, term: &str) -> Result<usize> {
        let needle = encode(term);
        let count = self.scan(&needle).await?;
        debug!(context = %self.name, count, "Search finished");
        Ok(count)
    }

    /// Count stored records containing `needle`
    pub async fn scan(&self, needle: &Record) -> Result<usize> {
        let content = {
            let _reading = self.stats.read().await;
            match fs::read_to_string(&self.log_path).await {
                Ok(content) => content,
                Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(0),
                Err(e) => return Err(e.into()),
            }
        };

        let needle = needle.as_str().to_owned();
        let parallel = self.parallel_scan;
        tokio::task::spawn_blocking(move || count_matches(&content, &needle, parallel))
            .await
            .map_err(|e| SlcError::Internal(e.to_string()))
    }
}

fn count_matches(content: &str, needle: &str, parallel: bool) -> usize {
    if parallel {
        content
            .par_lines()
            .filter(|line| unescape_record(line).contains(needle))
            .count()
    } else {
        content
            .lines()
            .filter(|line| unescape_record(line).contains(needle))
            .count()
    }
}

async fn read_meta(path: &Path) -> Result<Option<ContextStats>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_meta(path: &Path, stats: &ContextStats) -> Result<()> {
    let tmp = path.with_extension("meta.tmp");
    fs::write(&tmp, serde_json::to_vec(stats)?).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Append one line and return the log length before it.
///
/// A write that fails partway is truncated back, so the next record never
/// lands on the tail of a broken one.
async fn append_line(path: &Path, line: &str) -> std::io::Result<u64> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let offset = file.metadata().await?.len();

    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');

    let written = match file.write_all(buf.as_bytes()).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        if let Err(truncate) = file.set_len(offset).await {
            warn!(path = %path.display(), error = %truncate, "Failed to truncate partial record");
        }
        return Err(e);
    }
    Ok(offset)
}

async fn truncate_log(path: &Path, len: u64) -> std::io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await
}

/// Escape a record so it fits on one line of a `.bin` file
pub fn escape_record(record: &str) -> Cow<'_, str> {
    if !record.contains(&['\\', '\n', '\r'][..]) {
        return Cow::Borrowed(record);
    }

    let mut out = String::with_capacity(record.len() + 8);
    for c in record.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Reverse [`escape_record`]
pub fn unescape_record(line: &str) -> Cow<'_, str> {
    if !line.contains('\\') {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}
