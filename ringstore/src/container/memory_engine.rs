use std::collections::BTreeMap;

use crate::container::engine::{Engine, Op, Status};
use crate::error::CResult;

/// An in-memory [`Engine`], useful for tests and for scratch containers that
/// never need to survive a restart. Ground: the teacher's `storage::memory`
/// engine, which backs the same role in its own `test_engine!` suite.
#[derive(Default)]
pub struct MemoryEngine {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for MemoryEngine {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn apply_batch(&mut self, ops: &[Op]) -> CResult<()> {
        for op in ops {
            match op {
                Op::Put(k, v) => {
                    self.data.insert(k.clone(), v.clone());
                }
                Op::Delete(k) => {
                    self.data.remove(k);
                }
            }
        }
        Ok(())
    }

    fn next(&mut self, after: Option<&[u8]>) -> CResult<Option<(Vec<u8>, Vec<u8>)>> {
        let found = match after {
            None => self.data.iter().next(),
            Some(after) => {
                use std::ops::Bound;
                self.data.range((Bound::Excluded(after), Bound::Unbounded)).next()
            }
        };
        Ok(found.map(|(k, v)| (k.clone(), v.clone())))
    }

    fn flush(&mut self) -> CResult<()> {
        Ok(())
    }

    fn status(&mut self) -> CResult<Status> {
        let keys = self.data.len() as u64;
        let size = self.data.iter().fold(0u64, |acc, (k, v)| acc + k.len() as u64 + v.len() as u64);
        Ok(Status { keys, size, total_disk_size: size, live_disk_size: size, garbage_disk_size: 0 })
    }
}
