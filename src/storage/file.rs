//! Append-only file-backed event store.
//!
//! Layout of the store directory:
//!
//! ```text
//! MANIFEST    magic + version
//! LOCK        held exclusively while the store is open
//! events.log  sequence of frames
//! ```
//!
//! Each frame is `magic(4) | version(1) | op(1) | len(4) | body(len) | crc32(4)`
//! with little-endian integers. The checksum covers everything before it,
//! header included. The body is MessagePack: a full [`Record`] for a put, the
//! record id for a delete. Frames are replayed on open to rebuild the
//! in-memory index.
//!
//! Only a frame cut short by the end of the log counts as torn and is
//! truncated on open. If a complete frame still follows the short one, the
//! log is corrupt and open fails without touching it.

use crate::error::{Result, StoreError};
use crate::types::{Record, SearchQuery, Timestamp};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::EventStore;

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"EVS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Magic bytes starting every log frame.
const FRAME_MAGIC: &[u8; 4] = b"EVT\0";

/// Current frame format version.
const FRAME_VERSION: u8 = 1;

/// magic + version + op + body length
const FRAME_HEADER_SIZE: usize = 4 + 1 + 1 + 4;

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;

/// File store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    /// Store directory.
    pub path: PathBuf,

    /// Sync to disk every N writes (0 is treated as 1).
    pub sync_interval: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./events"),
            sync_interval: 100,
            create_if_missing: true,
        }
    }
}

/// What the log writer needs from its file.
trait LogFile: Write + Seek {
    fn sync_all(&self) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Log writer state.
struct LogWriter<F: LogFile = File> {
    file: F,
    /// End of the last complete frame.
    len: u64,
    writes_since_sync: u64,
}

impl<F: LogFile> LogWriter<F> {
    fn new(file: F, len: u64) -> Self {
        Self {
            file,
            len,
            writes_since_sync: 0,
        }
    }

    /// Append one encoded frame, syncing every `sync_interval` writes.
    ///
    /// On failure the log is cut back to where it was, so a frame is either
    /// fully written and counted or absent.
    fn append(&mut self, frame: &[u8], sync_interval: u64) -> io::Result<()> {
        let start = self.len;
        if let Err(e) = self.write_frame(frame, sync_interval) {
            if let Err(rollback) = self.rollback(start) {
                tracing::error!(
                    offset = start,
                    error = %rollback,
                    "failed to roll back partial frame"
                );
            }
            return Err(e);
        }
        self.len = start + frame.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8], sync_interval: u64) -> io::Result<()> {
        self.file.write_all(frame)?;
        if self.writes_since_sync + 1 >= sync_interval.max(1) {
            self.file.sync_all()?;
            self.writes_since_sync = 0;
        } else {
            self.writes_since_sync += 1;
        }
        Ok(())
    }

    fn rollback(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }
}

/// Event store persisted to an append-only log.
pub struct FileStore {
    config: FileStoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Serializes appends; index updates happen while it is held.
    writer: Mutex<LogWriter>,

    /// Latest version of every live record.
    index: RwLock<HashMap<String, Record>>,
}

impl FileStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: FileStoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new, empty store.
    pub fn create(config: FileStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(config.path.join("events.log"))?;

        tracing::info!(path = %config.path.display(), "created event store");

        Ok(Self {
            config,
            _lock_file: lock_file,
            writer: Mutex::new(LogWriter::new(file, 0)),
            index: RwLock::new(HashMap::new()),
        })
    }

    /// Open an existing store and replay its log.
    pub fn open(config: FileStoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(config.path.join("events.log"))?;

        let (index, valid_len) = Self::replay(&file)?;

        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            tracing::warn!(
                path = %config.path.display(),
                valid_len,
                file_len,
                "truncating torn frame at end of log"
            );
            file.set_len(valid_len)?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        tracing::info!(
            path = %config.path.display(),
            records = index.len(),
            "opened event store"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            writer: Mutex::new(LogWriter::new(file, valid_len)),
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().sync()?;
        Ok(())
    }

    fn append(&self, writer: &mut LogWriter, op: u8, body: &[u8]) -> Result<()> {
        let frame = encode_frame(op, body)?;
        writer.append(&frame, self.config.sync_interval)?;
        Ok(())
    }

    fn put(&self, writer: &mut LogWriter, record: &Record) -> Result<()> {
        let body = rmp_serde::to_vec(record)?;
        self.append(writer, OP_PUT, &body)?;
        self.index.write().insert(record.id.clone(), record.clone());
        Ok(())
    }

    /// Rebuild the index from the log.
    ///
    /// Returns the index and the length of the valid prefix. A torn final
    /// frame ends the replay; anything else malformed is an error.
    fn replay(file: &File) -> Result<(HashMap<String, Record>, u64)> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;
        let mut log = Vec::new();
        reader.read_to_end(&mut log)?;

        let mut index = HashMap::new();
        let mut offset = 0usize;

        while offset < log.len() {
            let rest = &log[offset..];
            let (op, body) = match decode_frame(rest)? {
                Frame::Complete { op, body } => (op, body),
                Frame::Short => {
                    if let Some(next) = next_complete_frame(rest) {
                        return Err(StoreError::Corruption(format!(
                            "frame at offset {} overruns the log; a complete frame follows at offset {}",
                            offset,
                            offset + next
                        )));
                    }
                    break;
                }
            };

            match op {
                OP_PUT => {
                    let record: Record = rmp_serde::from_slice(body)?;
                    index.insert(record.id.clone(), record);
                }
                OP_DELETE => {
                    let id: String = rmp_serde::from_slice(body)?;
                    index.remove(&id);
                }
                other => {
                    return Err(StoreError::Corruption(format!(
                        "unknown op {} at offset {}",
                        other, offset
                    )));
                }
            }
            offset += frame_size(body.len());
        }

        Ok((index, offset as u64))
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;
        Ok(lock_file)
    }
}

fn frame_size(body_len: usize) -> usize {
    FRAME_HEADER_SIZE + body_len + 4
}

fn encode_frame(op: u8, body: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len())
        .map_err(|_| StoreError::Serialization(format!("frame body too large: {}", body.len())))?;

    let mut frame = Vec::with_capacity(frame_size(body.len()));
    frame.extend_from_slice(FRAME_MAGIC);
    frame.push(FRAME_VERSION);
    frame.push(op);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(body);
    let checksum = crc32fast::hash(&frame);
    frame.extend_from_slice(&checksum.to_le_bytes());
    Ok(frame)
}

/// A frame decoded from the front of a buffer.
#[derive(Debug)]
enum Frame<'a> {
    Complete { op: u8, body: &'a [u8] },
    /// The buffer ends before the frame does.
    Short,
}

/// Decode the frame at the start of `buf`.
fn decode_frame(buf: &[u8]) -> Result<Frame<'_>> {
    let magic_len = buf.len().min(FRAME_MAGIC.len());
    if buf[..magic_len] != FRAME_MAGIC[..magic_len] {
        return Err(StoreError::Corruption("Invalid frame magic".into()));
    }
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(Frame::Short);
    }

    if buf[4] != FRAME_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported frame version: {}",
            buf[4]
        )));
    }
    let op = buf[5];
    let len = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]) as usize;

    // Bounded by what is actually there before anything is sliced.
    if buf.len() - FRAME_HEADER_SIZE < len + 4 {
        return Ok(Frame::Short);
    }

    let end = FRAME_HEADER_SIZE + len;
    let stored = u32::from_le_bytes([buf[end], buf[end + 1], buf[end + 2], buf[end + 3]]);
    let computed = crc32fast::hash(&buf[..end]);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    Ok(Frame::Complete {
        op,
        body: &buf[FRAME_HEADER_SIZE..end],
    })
}

/// Position of the first checksummed frame after the start of `buf`.
fn next_complete_frame(buf: &[u8]) -> Option<usize> {
    (1..buf.len()).find(|&at| {
        buf[at..].starts_with(FRAME_MAGIC)
            && matches!(decode_frame(&buf[at..]), Ok(Frame::Complete { .. }))
    })
}

impl EventStore for FileStore {
    fn create(&self, record: &Record) -> Result<()> {
        let mut writer = self.writer.lock();
        if self.index.read().contains_key(&record.id) {
            return Err(StoreError::RecordExists(record.id.clone()));
        }
        self.put(&mut writer, record)
    }

    fn read(&self, id: &str) -> Result<Record> {
        if id.is_empty() {
            return Err(StoreError::InvalidId);
        }
        self.index
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))
    }

    fn update(&self, record: &Record) -> Result<()> {
        let mut writer = self.writer.lock();
        if !self.index.read().contains_key(&record.id) {
            return Ok(());
        }
        self.put(&mut writer, record)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        if !self.index.read().contains_key(id) {
            return Ok(());
        }
        let body = rmp_serde::to_vec(id)?;
        self.append(&mut writer, OP_DELETE, &body)?;
        self.index.write().remove(id);
        Ok(())
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<Record>> {
        let resolved = query.resolve(Timestamp::now());
        Ok(resolved.apply(self.index.read().values()))
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
