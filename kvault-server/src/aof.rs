//! # Append-Only Log
//!
//! Purpose: An `AofSink` implementation writing every successful write
//! command's argv back out as a RESP array, with the three fsync
//! policies distilled spec §4.7 names (`always`, `everysec`, `no`), plus
//! a startup replay routine that feeds the log back through the real
//! command dispatcher — "the replay uses the same command path" per
//! distilled spec §4.7/§9.
//!
//! A `SELECT db_index` command is prepended automatically whenever a
//! write targets a different database than the writer's last write, so
//! a single linear log can span every `Database` in the `Store`
//! (mirrors how Redis's own AOF interleaves `SELECT` between databases).

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use kvault_common::{AofError, FsyncPolicy};
use kvault_engine::AofSink;
use parking_lot::Mutex;

use crate::resp::{resp_array_of_bulks, RespParser};

pub struct AofWriter {
    file: Mutex<BufWriter<File>>,
    policy: Mutex<FsyncPolicy>,
    last_db: Mutex<Option<u16>>,
    dirty: AtomicBool,
    path: PathBuf,
}

impl AofWriter {
    pub fn open(path: impl AsRef<Path>, policy: FsyncPolicy) -> Result<Self, AofError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(AofWriter {
            file: Mutex::new(BufWriter::new(file)),
            policy: Mutex::new(policy),
            last_db: Mutex::new(None),
            dirty: AtomicBool::new(false),
            path,
        })
    }

    pub fn policy(&self) -> FsyncPolicy {
        *self.policy.lock()
    }

    pub fn set_policy(&self, policy: FsyncPolicy) {
        *self.policy.lock() = policy;
    }

    /// Flushes buffered writes and fsyncs the file descriptor. Called by
    /// the `everysec` background task and on graceful shutdown.
    pub fn flush_and_sync(&self) -> io::Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().sync_all()?;
        self.dirty.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Fsyncs only if a write landed since the last sync — the
    /// `everysec` background loop's per-tick check.
    pub fn sync_if_dirty(&self) {
        if self.dirty.load(Ordering::Relaxed) {
            if let Err(err) = self.flush_and_sync() {
                tracing::error!(error = %err, path = %self.path.display(), "aof fsync failed");
            }
        }
    }
}

impl AofSink for AofWriter {
    fn record(&self, db_index: u16, argv: &[Vec<u8>]) {
        let mut buf = Vec::new();
        {
            let mut last_db = self.last_db.lock();
            if *last_db != Some(db_index) {
                resp_array_of_bulks(&mut buf, &[b"SELECT".to_vec(), db_index.to_string().into_bytes()]);
                *last_db = Some(db_index);
            }
        }
        resp_array_of_bulks(&mut buf, argv);

        let mut file = self.file.lock();
        if let Err(err) = file.write_all(&buf) {
            tracing::error!(error = %err, path = %self.path.display(), "aof write failed");
            return;
        }
        self.dirty.store(true, Ordering::Relaxed);

        match self.policy() {
            FsyncPolicy::Always => {
                if let Err(err) = file.flush().and_then(|_| file.get_ref().sync_all()) {
                    tracing::error!(error = %err, path = %self.path.display(), "aof fsync failed");
                } else {
                    self.dirty.store(false, Ordering::Relaxed);
                }
            }
            FsyncPolicy::EverySec | FsyncPolicy::No => {}
        }
    }
}

/// Reads every complete command frame out of an existing AOF file,
/// ignoring a missing file (first startup with `appendonly yes`).
/// Returns the parsed argv lists in log order, including any `SELECT`
/// commands interleaved by the writer — the caller replays them through
/// the same dispatcher a live connection would use.
pub fn read_commands(path: impl AsRef<Path>) -> Result<Vec<Vec<Vec<u8>>>, AofError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path)?;
    let mut buf = BytesMut::from(&bytes[..]);
    let mut commands = Vec::new();
    loop {
        match RespParser::parse(&mut buf) {
            Ok(Some(argv)) => {
                if !argv.is_empty() {
                    commands.push(argv);
                }
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(path = %path.display(), "aof replay stopped at malformed frame");
                break;
            }
        }
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn record_then_read_back_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let writer = AofWriter::open(&path, FsyncPolicy::Always).unwrap();
        writer.record(0, &[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
        writer.record(1, &[b"SET".to_vec(), b"k2".to_vec(), b"v2".to_vec()]);

        let commands = read_commands(&path).unwrap();
        assert_eq!(commands[0], vec![b"SELECT".to_vec(), b"0".to_vec()]);
        assert_eq!(commands[1], vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
        assert_eq!(commands[2], vec![b"SELECT".to_vec(), b"1".to_vec()]);
        assert_eq!(commands[3], vec![b"SET".to_vec(), b"k2".to_vec(), b"v2".to_vec()]);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.aof");
        assert_eq!(read_commands(&path).unwrap(), Vec::new());
    }

    #[test]
    fn repeated_write_to_same_db_skips_extra_select() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("same-db.aof");
        let writer = AofWriter::open(&path, FsyncPolicy::Always).unwrap();
        writer.record(0, &[b"SET".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        writer.record(0, &[b"SET".to_vec(), b"b".to_vec(), b"2".to_vec()]);
        let commands = read_commands(&path).unwrap();
        assert_eq!(commands.len(), 3);
    }
}
