//! The byte-string map underlying every other layer: a flat key/value store
//! over one file, with transactional batched writes and retry-on-contention
//! semantics. Ground: the teacher's `storage` module (`Engine`, `LogCask`,
//! `memory::Memory`), restructured so one physical append is one whole
//! transaction rather than one entry -- see [`log::BatchLog`].

pub mod engine;
pub mod file_engine;
pub mod log;
pub mod memory_engine;
pub mod pattern;
pub mod transaction;

use std::sync::Mutex;
use std::time::Duration;

pub use engine::{Engine, Op, Status};
pub use file_engine::FileEngine;
pub use memory_engine::MemoryEngine;
pub use transaction::{Transaction, TxMode};

use crate::error::{CResult, Error};

/// Number of times `with_transaction` will attempt to acquire the engine
/// before giving up with [`Error::Busy`].
const RETRY_TRIES: u32 = 80;
/// Base backoff between attempts; doubles each retry, capped at 200ms.
const RETRY_BASE: Duration = Duration::from_millis(5);
const RETRY_CAP: Duration = Duration::from_millis(200);

/// A transactional container over one [`Engine`].
///
/// Holds a single `Mutex` rather than a reader/writer lock: every method on
/// `Engine` takes `&mut self` (reads included, since a file-backed engine's
/// read path still touches shared buffers), so there is never a point in
/// distinguishing shared from exclusive access -- only one transaction, read
/// or write, is ever actually running against the engine at a time.
pub struct Container<E: Engine> {
    inner: Mutex<E>,
}

impl<E: Engine> Container<E> {
    pub fn new(engine: E) -> Self {
        Self { inner: Mutex::new(engine) }
    }

    /// Runs `f` inside a transaction of the given mode, retrying with
    /// exponential backoff if the engine is momentarily locked by another
    /// transaction, and committing (for `ReadWrite`) or discarding (for
    /// `ReadOnly`) `f`'s buffered writes when it returns `Ok`.
    ///
    /// `f`'s writes are never applied if it returns `Err`: the transaction
    /// is simply dropped, exactly as the original's `inhibittrans` flag
    /// would leave the container untouched on a failed edit.
    pub fn with_transaction<F, T>(&self, mode: TxMode, f: F) -> CResult<T>
    where
        F: FnOnce(&mut Transaction<E>) -> CResult<T>,
    {
        let guard = self.acquire()?;
        let mut tx = Transaction::new(guard, mode);

        let result = f(&mut tx);
        let (mut guard, pending) = tx.into_parts();

        match result {
            Ok(value) => {
                if mode == TxMode::ReadWrite && !pending.is_empty() {
                    guard.apply_batch(&pending)?;
                }
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    fn acquire(&self) -> CResult<std::sync::MutexGuard<'_, E>> {
        let mut backoff = RETRY_BASE;
        for attempt in 0..RETRY_TRIES {
            match self.inner.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(std::sync::TryLockError::Poisoned(p)) => return Err(Error::from(p)),
                Err(std::sync::TryLockError::WouldBlock) => {
                    if attempt + 1 == RETRY_TRIES {
                        break;
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(RETRY_CAP);
                }
            }
        }
        Err(Error::Busy)
    }

    /// Total size on disk, and how much of it is reclaimable garbage.
    pub fn footprint(&self) -> CResult<Status> {
        self.with_transaction(TxMode::ReadOnly, |tx| tx.status())
    }

    /// Bytes that could be reclaimed by compaction, per the last [`Status`].
    pub fn remain(&self) -> CResult<u64> {
        Ok(self.footprint()?.garbage_disk_size)
    }

    pub fn flush(&self) -> CResult<()> {
        self.inner.lock().map_err(Error::from)?.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn container() -> Container<MemoryEngine> {
        Container::new(MemoryEngine::new())
    }

    #[test]
    fn commit_makes_writes_visible() {
        let c = container();
        c.with_transaction(TxMode::ReadWrite, |tx| tx.put(b"a".to_vec(), b"1".to_vec())).unwrap();
        let got = c.with_transaction(TxMode::ReadOnly, |tx| tx.get(b"a")).unwrap();
        assert_eq!(got, Some(b"1".to_vec()));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let c = container();
        let result: CResult<()> = c.with_transaction(TxMode::ReadWrite, |tx| {
            tx.put(b"a".to_vec(), b"1".to_vec())?;
            Err(Error::Invalid("boom".into()))
        });
        assert!(result.is_err());
        let got = c.with_transaction(TxMode::ReadOnly, |tx| tx.get(b"a")).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let c = container();
        let result = c.with_transaction(TxMode::ReadOnly, |tx| tx.put(b"a".to_vec(), b"1".to_vec()));
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn transaction_sees_its_own_writes() {
        let c = container();
        c.with_transaction(TxMode::ReadWrite, |tx| {
            tx.put(b"a".to_vec(), b"1".to_vec())?;
            assert_eq!(tx.get(b"a")?, Some(b"1".to_vec()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn search_matches_glob() {
        let c = container();
        c.with_transaction(TxMode::ReadWrite, |tx| {
            tx.put(b"__ts__a".to_vec(), vec![])?;
            tx.put(b"__ts__b".to_vec(), vec![])?;
            tx.put(b"__vs__a".to_vec(), vec![])
        })
        .unwrap();
        let matches = c.with_transaction(TxMode::ReadOnly, |tx| tx.search(b"__ts__*")).unwrap();
        assert_eq!(matches, vec![b"__ts__a".to_vec(), b"__ts__b".to_vec()]);
    }

    #[test]
    fn footprint_reports_key_count() {
        let c = container();
        c.with_transaction(TxMode::ReadWrite, |tx| tx.put(b"a".to_vec(), b"1".to_vec())).unwrap();
        assert_eq!(c.footprint().unwrap().keys, 1);
    }
}
