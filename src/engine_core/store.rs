// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chain store implementations.

use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::engine_core::errors::GateError;
use crate::engine_core::traits::ChainStore;

/// Volatile store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    lines: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing lines, e.g. to replay a ledger in memory.
    pub fn with_lines(lines: Vec<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }
}

#[async_trait]
impl ChainStore for MemoryStore {
    async fn persist(&self, line: &str) -> Result<(), GateError> {
        self.lines.lock().await.push(line.to_string());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<String>, GateError> {
        Ok(self.lines.lock().await.clone())
    }
}

/// Byte sink a `JsonlStore` appends to.
pub trait LedgerFile: Read + Write + Seek + Send + 'static {
    /// Current length in bytes.
    fn byte_len(&self) -> io::Result<u64>;

    /// Cut the file back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;
}

impl LedgerFile for File {
    fn byte_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append-only JSON-lines ledger file.
///
/// The file is held under an exclusive advisory lock for the lifetime of the
/// store so a second gate process cannot interleave appends. Every line is
/// flushed with `sync_data` before `persist` returns. A failed append is cut
/// back off the file; if that cut fails too the store refuses further writes.
pub struct JsonlStore<F: LedgerFile = File> {
    path: PathBuf,
    file: Arc<SyncMutex<F>>,
    poisoned: Arc<AtomicBool>,
}

impl JsonlStore<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GateError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| GateError::ChainIo(format!("cannot open {}: {}", path.display(), e)))?;
        file.try_lock_exclusive().map_err(|e| {
            GateError::ChainIo(format!(
                "ledger {} is locked by another process: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "Opened ledger");
        Ok(Self::with_file(path, file))
    }
}

impl<F: LedgerFile> JsonlStore<F> {
    /// Wrap an already opened ledger. No lock is taken.
    pub fn with_file(path: impl Into<PathBuf>, file: F) -> Self {
        Self {
            path: path.into(),
            file: Arc::new(SyncMutex::new(file)),
            poisoned: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once a failed append could not be rolled back.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    async fn with_locked<T, Op>(&self, op: Op) -> Result<T, GateError>
    where
        T: Send + 'static,
        Op: FnOnce(&mut F, &Path, &AtomicBool) -> Result<T, GateError> + Send + 'static,
    {
        let file = self.file.clone();
        let poisoned = self.poisoned.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = file
                .lock()
                .map_err(|_| GateError::ChainIo(format!("ledger {} lock poisoned", path.display())))?;
            op(&mut *guard, path.as_path(), &*poisoned)
        })
        .await
        .map_err(|e| GateError::ChainIo(format!("ledger task failed: {}", e)))?
    }
}

/// Append one line, truncating back to the prior length on any failure.
fn append_line<F: LedgerFile>(
    file: &mut F,
    line: &str,
    path: &Path,
    poisoned: &AtomicBool,
) -> Result<(), GateError> {
    if poisoned.load(Ordering::SeqCst) {
        return Err(GateError::ChainIo(format!(
            "ledger {} holds an unrolled partial append; refusing writes",
            path.display()
        )));
    }

    let prev_len = file
        .byte_len()
        .map_err(|e| GateError::ChainIo(format!("stat of {} failed: {}", path.display(), e)))?;
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');

    let Err(cause) = file.write_all(&buf).and_then(|_| file.sync()) else {
        return Ok(());
    };

    match file.truncate(prev_len).and_then(|_| file.sync()) {
        Ok(()) => {
            warn!(path = %path.display(), len = prev_len, error = %cause, "Append failed; ledger rolled back");
            Err(GateError::ChainIo(format!("append to {} failed: {}", path.display(), cause)))
        }
        Err(undo) => {
            poisoned.store(true, Ordering::SeqCst);
            error!(path = %path.display(), error = %cause, rollback = %undo, "Append failed and rollback failed");
            Err(GateError::ChainIo(format!(
                "append to {} failed ({}) and rollback failed ({})",
                path.display(),
                cause,
                undo
            )))
        }
    }
}

fn read_lines<R: Read>(reader: R) -> io::Result<Vec<String>> {
    BufReader::new(reader)
        .lines()
        .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
        .collect()
}

#[async_trait]
impl<F: LedgerFile> ChainStore for JsonlStore<F> {
    async fn persist(&self, line: &str) -> Result<(), GateError> {
        let line = line.to_string();
        self.with_locked(move |file, path, poisoned| append_line(file, &line, path, poisoned))
            .await
    }

    async fn load(&self) -> Result<Vec<String>, GateError> {
        self.with_locked(|file, path, _| {
            file.seek(SeekFrom::Start(0))
                .and_then(|_| read_lines(&mut *file))
                .map_err(|e| GateError::ChainIo(format!("read of {} failed: {}", path.display(), e)))
        })
        .await
    }
}

/// Read a ledger file without taking the writer lock (verification only).
pub fn read_ledger_lines(path: impl AsRef<Path>) -> Result<Vec<String>, GateError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| GateError::ChainIo(format!("cannot open {}: {}", path.display(), e)))?;
    read_lines(file).map_err(|e| GateError::ChainIo(format!("read of {} failed: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_store_round_trip_and_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("audit.jsonl");

        let store = JsonlStore::open(&path).unwrap();
        store.persist("{\"seq\":0}").await.unwrap();
        store.persist("{\"seq\":1}").await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 2);

        // A second writer is refused while the first holds the lock
        assert!(matches!(JsonlStore::open(&path), Err(GateError::ChainIo(_))));

        drop(store);
        let reopened = JsonlStore::open(&path).unwrap();
        assert_eq!(reopened.load().await.unwrap(), vec!["{\"seq\":0}", "{\"seq\":1}"]);
        assert_eq!(read_ledger_lines(&path).unwrap().len(), 2);
    }

    /// In-memory file that can tear a write after a few bytes, fail `sync`,
    /// or refuse to truncate.
    #[derive(Default)]
    struct TornFile {
        data: io::Cursor<Vec<u8>>,
        tear_after: Option<usize>,
        fail_sync: bool,
        fail_truncate: bool,
    }

    impl Read for TornFile {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Seek for TornFile {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.data.seek(pos)
        }
    }

    impl Write for TornFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let end = self.data.get_ref().len() as u64;
            self.data.set_position(end);
            match self.tear_after.take() {
                Some(n) => {
                    self.data.write_all(&buf[..n.min(buf.len())])?;
                    Err(io::Error::new(io::ErrorKind::Other, "disk full"))
                }
                None => self.data.write(buf),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LedgerFile for TornFile {
        fn byte_len(&self) -> io::Result<u64> {
            Ok(self.data.get_ref().len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only"));
            }
            self.data.get_mut().truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            if std::mem::take(&mut self.fail_sync) {
                return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_torn_write_is_rolled_back() {
        let store = JsonlStore::with_file("torn.jsonl", TornFile::default());
        store.persist("{\"seq\":0}").await.unwrap();

        store.file.lock().unwrap().tear_after = Some(4);
        assert!(matches!(store.persist("{\"seq\":1}").await, Err(GateError::ChainIo(_))));
        assert_eq!(store.load().await.unwrap(), vec!["{\"seq\":0}"]);

        store.persist("{\"seq\":1}").await.unwrap();
        assert_eq!(store.load().await.unwrap(), vec!["{\"seq\":0}", "{\"seq\":1}"]);
        assert!(!store.is_poisoned());
    }

    #[tokio::test]
    async fn test_failed_sync_removes_the_whole_line() {
        let store = JsonlStore::with_file("sync.jsonl", TornFile::default());
        store.file.lock().unwrap().fail_sync = true;
        assert!(store.persist("{\"seq\":0}").await.is_err());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rollback_poisons_the_store() {
        let store = JsonlStore::with_file("stuck.jsonl", TornFile::default());
        {
            let mut file = store.file.lock().unwrap();
            file.tear_after = Some(3);
            file.fail_truncate = true;
        }
        let err = store.persist("{\"seq\":0}").await.unwrap_err();
        assert!(err.to_string().contains("rollback failed"));
        assert!(store.is_poisoned());

        // Healthy again underneath, but the torn bytes are still there
        let err = store.persist("{\"seq\":0}").await.unwrap_err();
        assert!(err.to_string().contains("refusing writes"));
    }

    #[tokio::test]
    async fn test_memory_store_keeps_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.persist(&i.to_string()).await.unwrap();
        }
        assert_eq!(store.load().await.unwrap(), vec!["0", "1", "2", "3", "4"]);
    }
}
