//! Backing stores for the request cache.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::RequestInfo;
use crate::error::Result;

/// A persisted cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRequest {
    /// Zone the request was sent to.
    pub zone_id: String,
    /// Request details.
    pub info: RequestInfo,
    /// Store-private position used for in-place updates.
    pub storage_offset: u64,
}

/// Persistence for outstanding requests.
pub trait RequestStore: Send {
    /// Active records surviving from a previous run.
    fn load(&mut self) -> Result<Vec<StoredRequest>>;

    /// Persist a new active record and return its storage offset.
    fn append(&mut self, zone_id: &str, info: &RequestInfo) -> Result<u64>;

    /// Mark the record at `offset` consumed.
    fn deactivate(&mut self, offset: u64) -> Result<()>;
}

/// Volatile store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<(String, RequestInfo)>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestStore for MemoryStore {
    fn load(&mut self) -> Result<Vec<StoredRequest>> {
        Ok(self
            .records
            .iter()
            .enumerate()
            .filter(|(_, (_, info))| info.active)
            .map(|(i, (zone_id, info))| StoredRequest {
                zone_id: zone_id.clone(),
                info: info.clone(),
                storage_offset: i as u64,
            })
            .collect())
    }

    fn append(&mut self, zone_id: &str, info: &RequestInfo) -> Result<u64> {
        self.records.push((zone_id.to_string(), info.clone()));
        Ok(self.records.len() as u64 - 1)
    }

    fn deactivate(&mut self, offset: u64) -> Result<()> {
        if let Some((_, info)) = self.records.get_mut(offset as usize) {
            info.active = false;
        }
        Ok(())
    }
}

const ACTIVE: u8 = b'A';
const CONSUMED: u8 = b'-';

#[derive(Serialize, Deserialize)]
struct Record {
    zone_id: String,
    #[serde(flatten)]
    info: RequestInfo,
}

/// Line-oriented file store.
///
/// Each record is one line: a flag byte (`A` active, `-` consumed) followed
/// by the JSON record. Consuming a request rewrites only the flag byte at
/// the record's offset. Consumed records are compacted away on open.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
    surviving: Vec<StoredRequest>,
}

impl FileStore {
    /// Open (creating if needed) and compact the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let live = if path.exists() {
            read_active(&path)?
        } else {
            Vec::new()
        };

        let tmp = path.with_extension("compact");
        let mut surviving = Vec::with_capacity(live.len());
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let mut offset = 0u64;
            for record in live {
                let line = encode(&record)?;
                writer.write_all(&line)?;
                surviving.push(StoredRequest {
                    zone_id: record.zone_id,
                    info: record.info,
                    storage_offset: offset,
                });
                offset += line.len() as u64;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        tracing::debug!(path = %path.display(), records = surviving.len(), "Opened request store");

        Ok(Self {
            path,
            file,
            surviving,
        })
    }

    /// Location of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_active(path: &Path) -> Result<Vec<Record>> {
    let content = fs::read_to_string(path)?;
    let mut live = Vec::new();
    for line in content.lines() {
        let Some(json) = line.strip_prefix(ACTIVE as char) else {
            continue;
        };
        match serde_json::from_str::<Record>(json) {
            Ok(record) => live.push(record),
            Err(e) => tracing::warn!(path = %path.display(), "Skipping corrupt request record: {}", e),
        }
    }
    Ok(live)
}

fn encode(record: &Record) -> Result<Vec<u8>> {
    let mut line = vec![ACTIVE];
    serde_json::to_writer(&mut line, record)?;
    line.push(b'\n');
    Ok(line)
}

impl RequestStore for FileStore {
    fn load(&mut self) -> Result<Vec<StoredRequest>> {
        Ok(std::mem::take(&mut self.surviving))
    }

    fn append(&mut self, zone_id: &str, info: &RequestInfo) -> Result<u64> {
        let line = encode(&Record {
            zone_id: zone_id.to_string(),
            info: info.clone(),
        })?;
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(offset)
    }

    fn deactivate(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[CONSUMED])?;
        self.file.flush()?;
        Ok(())
    }
}
