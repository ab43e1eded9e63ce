use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SequencerError};
use crate::event::{RepoEvent, Seq, SeqEvent};
use crate::source::EventSource;

/// Flush/sync strategy for the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration for the write-ahead log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WalConfig {
    #[serde(default)]
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Upper bound on a single entry; anything larger is a corrupt length field.
const MAX_ENTRY_SIZE: u32 = 256 * 1024 * 1024;

struct WalState {
    writer: BufWriter<File>,
    /// Current write offset in the log file.
    offset: u64,
    /// `(seq, offset)` of every valid entry, ascending by both.
    index: Vec<(Seq, u64)>,
}

/// Event source backed by a crash-recoverable write-ahead log.
///
/// Events are serialized with bincode and framed as
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized SeqEvent)]
/// ```
/// On open the file is scanned front-to-back to build a sequence index.
/// Entries failing the CRC are skipped; a torn tail is cut off so later
/// appends land on a clean frame boundary.
pub struct WalSequencer {
    path: PathBuf,
    state: Mutex<WalState>,
    config: WalConfig,
}

impl WalSequencer {
    /// Open (or create) a log file at the given path.
    pub fn open(path: &Path, config: WalConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let (index, valid_end) = scan(path, file_len)?;
        if valid_end < file_len {
            warn!(
                path = %path.display(),
                valid_end,
                file_len,
                "discarding torn tail of event log"
            );
            file.set_len(valid_end)?;
        }

        info!(path = %path.display(), events = index.len(), "opened event log");
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(WalState {
                writer: BufWriter::new(file),
                offset: valid_end,
                index,
            }),
            config,
        })
    }

    /// Append an event with the next sequence number.
    pub fn append(&self, event: RepoEvent) -> Result<Seq> {
        let mut state = self.state.lock().expect("WAL mutex poisoned");
        let seq = state.index.last().map_or(1, |(s, _)| s + 1);
        self.write_entry(&mut state, &SeqEvent::new(seq, event))?;
        Ok(seq)
    }

    /// Append an already sequenced event. Returns the byte offset of the entry.
    pub fn append_sequenced(&self, event: &SeqEvent) -> Result<u64> {
        let mut state = self.state.lock().expect("WAL mutex poisoned");
        if let Some((last, _)) = state.index.last() {
            if event.seq <= *last {
                return Err(SequencerError::NonMonotonicSeq {
                    last: *last,
                    got: event.seq,
                });
            }
        }
        self.write_entry(&mut state, event)
    }

    fn write_entry(&self, state: &mut WalState, event: &SeqEvent) -> Result<u64> {
        let payload = bincode::serialize(event)?;
        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);
        let entry_offset = state.offset;

        state.writer.write_all(&length.to_le_bytes())?;
        state.writer.write_all(&crc.to_le_bytes())?;
        state.writer.write_all(&payload)?;
        state.writer.flush()?;
        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            state.writer.get_ref().sync_all()?;
        }

        state.offset += HEADER_SIZE as u64 + payload.len() as u64;
        state.index.push((event.seq, entry_offset));

        debug!(seq = event.seq, offset = entry_offset, len = payload.len(), "event log append");
        Ok(entry_offset)
    }

    /// Number of events in the log.
    pub fn len(&self) -> usize {
        self.state.lock().expect("WAL mutex poisoned").index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.state.lock().expect("WAL mutex poisoned").offset
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self, offsets: &[u64]) -> Result<Vec<SeqEvent>> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }
        let mut file = BufReader::new(File::open(&self.path)?);
        offsets
            .iter()
            .map(|offset| read_entry(&mut file, *offset))
            .collect()
    }
}

#[async_trait]
impl EventSource for WalSequencer {
    async fn fetch_range(&self, after: Seq, limit: usize) -> Result<Vec<SeqEvent>> {
        let offsets: Vec<u64> = {
            let state = self.state.lock().expect("WAL mutex poisoned");
            let start = state.index.partition_point(|(seq, _)| *seq <= after);
            state.index[start..]
                .iter()
                .take(limit)
                .map(|(_, offset)| *offset)
                .collect()
        };
        self.read_entries(&offsets)
    }

    async fn last_seq(&self) -> Result<Option<Seq>> {
        Ok(self
            .state
            .lock()
            .expect("WAL mutex poisoned")
            .index
            .last()
            .map(|(seq, _)| *seq))
    }
}

impl std::fmt::Debug for WalSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalSequencer")
            .field("path", &self.path)
            .field("events", &self.len())
            .finish()
    }
}

/// Scan the log, returning the index of valid entries and the offset just
/// past the last complete frame.
fn scan(path: &Path, file_len: u64) -> Result<(Vec<(Seq, u64)>, u64)> {
    let mut file = BufReader::new(File::open(path)?);
    let mut index: Vec<(Seq, u64)> = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        file.seek(SeekFrom::Start(offset))?;

        let mut header_buf = [0u8; HEADER_SIZE];
        match file.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let (length, expected_crc) = parse_header(&header_buf);

        if length == 0
            || length > MAX_ENTRY_SIZE
            || (offset + HEADER_SIZE as u64 + length as u64) > file_len
        {
            warn!(offset, length, file_len, "invalid log entry length; stopping scan");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated log entry; stopping scan");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        let entry_offset = offset;
        offset += HEADER_SIZE as u64 + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(
                offset = entry_offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping entry"
            );
            continue;
        }

        match bincode::deserialize::<SeqEvent>(&payload) {
            Ok(event) => match index.last() {
                Some((last, _)) if event.seq <= *last => {
                    warn!(offset = entry_offset, seq = event.seq, last = *last, "out-of-order entry; skipping");
                }
                _ => index.push((event.seq, entry_offset)),
            },
            Err(e) => {
                warn!(offset = entry_offset, error = %e, "failed to deserialize log entry; skipping");
            }
        }
    }

    debug!(recovered = index.len(), "event log scan complete");
    Ok((index, offset))
}

fn parse_header(buf: &[u8; HEADER_SIZE]) -> (u32, u32) {
    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let crc = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    (length, crc)
}

fn read_entry<R: Read + Seek>(file: &mut R, offset: u64) -> Result<SeqEvent> {
    file.seek(SeekFrom::Start(offset))?;
    let mut header_buf = [0u8; HEADER_SIZE];
    file.read_exact(&mut header_buf)?;
    let (length, expected) = parse_header(&header_buf);
    if length == 0 || length > MAX_ENTRY_SIZE {
        return Err(SequencerError::InvalidEntryLength { offset, length });
    }
    let mut payload = vec![0u8; length as usize];
    file.read_exact(&mut payload)?;
    let actual = crc32fast::hash(&payload);
    if actual != expected {
        return Err(SequencerError::CrcMismatch {
            offset,
            expected,
            actual,
        });
    }
    Ok(bincode::deserialize(&payload)?)
}
