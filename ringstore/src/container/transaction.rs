use std::sync::MutexGuard;

use crate::container::engine::{Engine, Op, Status};
use crate::container::pattern::glob_match;
use crate::error::CResult;

/// Whether a transaction may mutate the container. Replaces the original's
/// global `hol_inhibittrans`/`hol_allowtrans` flag with an object threaded
/// explicitly through every call that needs one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// A single container transaction: a held lock on the engine, plus -- for a
/// read-write transaction -- a buffer of not-yet-applied mutations. Nothing
/// a transaction writes is visible to its own reads... other than through
/// this buffer, which `get`/`first`/`next`/`search` all consult first so a
/// transaction sees its own uncommitted writes.
pub struct Transaction<'a, E: Engine> {
    guard: MutexGuard<'a, E>,
    mode: TxMode,
    pending: Vec<Op>,
}

impl<'a, E: Engine> Transaction<'a, E> {
    pub(super) fn new(guard: MutexGuard<'a, E>, mode: TxMode) -> Self {
        Self { guard, mode, pending: Vec::new() }
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Gets a value, checking this transaction's own pending writes first.
    pub fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        for op in self.pending.iter().rev() {
            match op {
                Op::Put(k, v) if k.as_slice() == key => return Ok(Some(v.clone())),
                Op::Delete(k) if k.as_slice() == key => return Ok(None),
                _ => {}
            }
        }
        self.guard.get(key)
    }

    /// Buffers a put. Visible to this transaction's own reads immediately;
    /// visible to anyone else only once the transaction commits.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> CResult<()> {
        self.require_write()?;
        self.pending.push(Op::Put(key.into(), value.into()));
        Ok(())
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> CResult<()> {
        self.require_write()?;
        self.pending.push(Op::Delete(key.into()));
        Ok(())
    }

    /// First key/value pair strictly after `after` in key order (or the very
    /// first, if `after` is `None`), accounting for this transaction's own
    /// not-yet-committed writes.
    pub fn next(&mut self, after: Option<&[u8]>) -> CResult<Option<(Vec<u8>, Vec<u8>)>> {
        let mut cursor = after.map(|k| k.to_vec());
        loop {
            let base = self.guard.next(cursor.as_deref())?;
            let overlay_delete = |k: &[u8]| self.pending.iter().rev().any(|op| matches!(op, Op::Delete(d) if d.as_slice() == k));

            let candidate = match base {
                Some((k, v)) if !overlay_delete(&k) => Some((k, v)),
                Some((k, _)) => {
                    cursor = Some(k);
                    continue;
                }
                None => None,
            };

            // A pending put can introduce a key the base engine doesn't have
            // yet, or shadow the value of one it does; either way it might
            // sort earlier than `candidate`.
            let pending_min = self
                .pending
                .iter()
                .filter_map(|op| match op {
                    Op::Put(k, v) if after.map_or(true, |a| k.as_slice() > a) => Some((k.clone(), v.clone())),
                    _ => None,
                })
                .min_by(|a, b| a.0.cmp(&b.0));

            return Ok(match (candidate, pending_min) {
                (Some(c), Some(p)) => Some(if p.0 <= c.0 { p } else { c }),
                (Some(c), None) => Some(c),
                (None, Some(p)) => Some(p),
                (None, None) => None,
            });
        }
    }

    pub fn first(&mut self) -> CResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.next(None)
    }

    /// Keys matching an anchored glob pattern (`*`/`?`), in key order.
    pub fn search(&mut self, pattern: &[u8]) -> CResult<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        let mut cursor = None;
        while let Some((k, _)) = self.next(cursor.as_deref())? {
            if glob_match(pattern, &k) {
                out.push(k.clone());
            }
            cursor = Some(k);
        }
        Ok(out)
    }

    pub fn status(&mut self) -> CResult<Status> {
        self.guard.status()
    }

    fn require_write(&self) -> CResult<()> {
        if self.mode == TxMode::ReadOnly {
            return Err(crate::error::Error::Invalid("write attempted in a read-only transaction".into()));
        }
        Ok(())
    }

    pub(super) fn into_parts(self) -> (MutexGuard<'a, E>, Vec<Op>) {
        (self.guard, self.pending)
    }
}
