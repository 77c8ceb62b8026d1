//! Synchronous Write-Ahead Log (WAL) for the durable record store.
//!
//! Every store mutation is appended here before it is applied in memory.
//! Each entry is framed as `[u32 length BE][u32 CRC32 BE][bincode payload]`
//! and flushed with `fsync` before `append` returns.

use crate::config::WAL_FILE_NAME;
use crate::hnsw::NodeId;
use crate::record::{MemoryRecord, RecordId, Session, SessionId};
use crate::store::StoreResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// A single store mutation, replayable on startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    CreateSession(Session),
    TouchSession { id: SessionId, at: DateTime<Utc> },
    DeleteSession { id: SessionId },
    PutRecord(MemoryRecord),
    LinkVector { record_id: RecordId, node_id: NodeId },
    DeleteRecord { id: RecordId },
}

/// Diagnostic statistics from a WAL replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of entries successfully deserialized.
    pub success: usize,
    /// Number of entries skipped due to deserialization errors (CRC was valid).
    pub skipped: usize,
    /// Number of CRC mismatches encountered (replay stopped).
    pub crc_errors: usize,
    /// Whether replay was terminated by a truncated entry.
    pub truncated: bool,
    /// Byte length of the intact prefix of the log.
    pub valid_len: u64,
}

impl ReplayStats {
    /// True when the log ends in bytes that replay could not use.
    pub fn has_torn_tail(&self) -> bool {
        self.truncated || self.crc_errors > 0
    }
}

/// Append-only write-ahead log with CRC32 integrity checks.
///
/// Each [`append`](SyncWriteAheadLog::append) serializes, writes, flushes and fsyncs
/// the entry before returning.
#[derive(Debug)]
pub struct SyncWriteAheadLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

fn open_append(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

impl SyncWriteAheadLog {
    /// Opens or creates the log file inside `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(WAL_FILE_NAME);
        let file = open_append(&path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry durably.
    pub fn append(&self, entry: &WalEntry) -> StoreResult<()> {
        let framed = serialize_and_frame(entry)?;
        let mut w = self.writer.lock();
        w.write_all(&framed)?;
        w.flush()?;
        w.get_mut().sync_all()?;
        Ok(())
    }

    /// Reads every entry, verifying checksums.
    ///
    /// Stops at the first CRC mismatch or truncated frame; skips frames whose payload
    /// no longer deserializes.
    pub fn replay(&self) -> StoreResult<(Vec<WalEntry>, ReplayStats)> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut stats = ReplayStats::default();
        let mut header = [0u8; 8];

        loop {
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    if stats.valid_len < file_len {
                        tracing::warn!(path = %self.path.display(), "WAL truncated mid-header, stopping replay");
                        stats.truncated = true;
                    }
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let stored_crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

            // A corrupted length must not drive a huge allocation.
            if stats.valid_len + 8 + len as u64 > file_len {
                tracing::warn!(path = %self.path.display(), "WAL truncated mid-entry, stopping replay");
                stats.truncated = true;
                break;
            }
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(path = %self.path.display(), "WAL truncated mid-entry, stopping replay");
                    stats.truncated = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            if crc32fast::hash(&data) != stored_crc {
                tracing::warn!(path = %self.path.display(), "WAL entry CRC mismatch, stopping replay");
                stats.crc_errors += 1;
                break;
            }
            stats.valid_len += 8 + len as u64;
            match bincode::deserialize::<WalEntry>(&data) {
                Ok(entry) => {
                    entries.push(entry);
                    stats.success += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WAL entry deserialization failed, skipping");
                    stats.skipped += 1;
                }
            }
        }

        Ok((entries, stats))
    }

    /// Replaces the log with `entries`: written to a temp file, fsynced, then renamed
    /// over the live log. Appends are blocked for the duration.
    pub fn rewrite(&self, entries: &[WalEntry]) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;

        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for entry in entries {
                tmp.write_all(&serialize_and_frame(entry)?)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp_path, &self.path)?;
        *writer = BufWriter::new(open_append(&self.path)?);
        Ok(())
    }

    /// Cuts the log back to its first `len` bytes, dropping a torn tail so later
    /// appends follow the last intact frame.
    pub fn truncate_to(&self, len: u64) -> StoreResult<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        let file = writer.get_mut();
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    /// Truncates the log to zero length.
    pub fn truncate(&self) -> StoreResult<()> {
        self.rewrite(&[])
    }
}

/// `[u32 len BE][u32 crc32 BE][bincode payload]`
fn serialize_and_frame(entry: &WalEntry) -> StoreResult<Vec<u8>> {
    let bytes = bincode::serialize(entry)?;
    let len = bytes.len() as u32;
    let crc = crc32fast::hash(&bytes);

    let mut framed = Vec::with_capacity(8 + bytes.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&crc.to_be_bytes());
    framed.extend_from_slice(&bytes);
    Ok(framed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        let session = Session::new("alice");
        let record = MemoryRecord::new(session.id, "hello", vec![1.0, 2.0, 3.0]);
        wal.append(&WalEntry::CreateSession(session.clone())).unwrap();
        wal.append(&WalEntry::PutRecord(record.clone())).unwrap();
        wal.append(&WalEntry::LinkVector {
            record_id: record.id,
            node_id: 4,
        })
        .unwrap();

        let (entries, stats) = wal.replay().unwrap();
        assert_eq!(stats.success, 3);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.crc_errors, 0);
        assert_eq!(entries[0], WalEntry::CreateSession(session));
        match &entries[1] {
            WalEntry::PutRecord(r) => {
                assert_eq!(r.id, record.id);
                assert_eq!(r.embedding, vec![1.0, 2.0, 3.0]);
            }
            other => panic!("expected PutRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        {
            let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
            wal.append(&WalEntry::DeleteRecord { id }).unwrap();
        }
        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        let (entries, _) = wal.replay().unwrap();
        assert_eq!(entries, vec![WalEntry::DeleteRecord { id }]);
    }

    #[test]
    fn test_truncate_clears_wal() {
        let dir = tempfile::tempdir().unwrap();
        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
            .unwrap();
        wal.truncate().unwrap();
        let (entries, _) = wal.replay().unwrap();
        assert!(entries.is_empty(), "WAL should be empty after truncate");

        // Appends keep working after the file was swapped.
        wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
            .unwrap();
        assert_eq!(wal.replay().unwrap().0.len(), 1);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        for _ in 0..5 {
            wal.append(&WalEntry::DeleteRecord { id: Uuid::new_v4() })
                .unwrap();
        }
        let keep = WalEntry::CreateSession(Session::new("bob"));
        wal.rewrite(std::slice::from_ref(&keep)).unwrap();
        let (entries, stats) = wal.replay().unwrap();
        assert_eq!(entries, vec![keep]);
        assert_eq!(stats.success, 1);
        assert!(!dir.path().join("records.wal.tmp").exists());
    }

    #[test]
    fn test_crc_corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
            wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
                .unwrap();
            wal.path().to_path_buf()
        };
        let mut data = fs::read(&path).unwrap();
        data[10] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        let (entries, stats) = wal.replay().unwrap();
        assert!(entries.is_empty());
        assert_eq!(stats.crc_errors, 1);
        assert_eq!(stats.valid_len, 0);
        assert!(stats.has_torn_tail());
    }

    #[test]
    fn test_truncated_tail_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
            wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
                .unwrap();
            wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
                .unwrap();
            wal.path().to_path_buf()
        };
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        let (entries, stats) = wal.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(stats.truncated);
        assert_eq!(stats.valid_len, data.len() as u64 / 2);
    }

    #[test]
    fn test_torn_header_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
            wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
                .unwrap();
            wal.path().to_path_buf()
        };
        let mut data = fs::read(&path).unwrap();
        let intact = data.len() as u64;
        data.extend_from_slice(&[0, 0, 1]);
        fs::write(&path, &data).unwrap();

        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        let (entries, stats) = wal.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(stats.truncated);
        assert_eq!(stats.valid_len, intact);
    }

    #[test]
    fn test_truncate_to_drops_torn_tail_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
            wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
                .unwrap();
            wal.append(&WalEntry::DeleteSession { id: Uuid::new_v4() })
                .unwrap();
            wal.path().to_path_buf()
        };
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 3]).unwrap();

        let wal = SyncWriteAheadLog::open(dir.path()).unwrap();
        let (_, stats) = wal.replay().unwrap();
        wal.truncate_to(stats.valid_len).unwrap();
        let late = WalEntry::DeleteRecord { id: Uuid::new_v4() };
        wal.append(&late).unwrap();

        let (entries, stats) = wal.replay().unwrap();
        assert!(!stats.has_torn_tail(), "{stats:?}");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], late);
    }

    #[test]
    fn test_frame_format() {
        let framed = serialize_and_frame(&WalEntry::DeleteRecord { id: Uuid::nil() }).unwrap();
        let len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
        let stored_crc = u32::from_be_bytes([framed[4], framed[5], framed[6], framed[7]]);
        let payload = &framed[8..];
        assert_eq!(payload.len(), len);
        assert_eq!(crc32fast::hash(payload), stored_crc);
    }
}
