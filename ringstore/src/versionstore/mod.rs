//! Versionstore: an unbounded timestore ring whose records are
//! `(author, comment, data)` triples, plus a catalog of ring names known to
//! be versionstore-shaped. Ground: `versionstore.c`'s `vers_new`/
//! `vers_getcurrent`/`vers_edit` -- the `author \0 comment \0 data \0`
//! buffer layout and the NUL-scan-then-arithmetic split it uses to recover
//! `data`'s length without miscounting embedded NULs, and `VS_SUPERNAME`
//! (`"__vs"`) as the catalog key -- laid out the way this crate's own
//! timestore module is laid out (a `Versionstore<E>` factory plus a
//! `VersionHandle<E>` handle, mirroring `Timestore<E>`/`Ring<E>`).

use std::sync::Arc;

use crate::container::{Engine, Transaction, TxMode};
use crate::error::{CResult, Error};
use crate::holstore::Holstore;
use crate::timestore::{self, Timestore};

const CATALOG_KEY: &[u8] = b"__vs";

fn read_catalog<E: Engine>(tx: &mut Transaction<E>) -> CResult<Vec<String>> {
    match tx.get(CATALOG_KEY)? {
        Some(raw) => {
            let text = String::from_utf8(raw)?;
            Ok(text.split_whitespace().map(String::from).collect())
        }
        None => Ok(Vec::new()),
    }
}

fn write_catalog<E: Engine>(tx: &mut Transaction<E>, names: &[String]) -> CResult<()> {
    tx.put(CATALOG_KEY.to_vec(), names.join(" ").into_bytes())
}

/// Concatenates `author || NUL || comment || NUL || data || NUL`, the
/// on-disk shape of one version's payload.
fn encode_entry(author: &str, comment: &str, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(author.len() + comment.len() + data.len() + 3);
    buf.extend_from_slice(author.as_bytes());
    buf.push(0);
    buf.extend_from_slice(comment.as_bytes());
    buf.push(0);
    buf.extend_from_slice(data);
    buf.push(0);
    buf
}

/// Splits a version payload back into its three fields. `author`/`comment`
/// are located by scanning for the first two NULs; `data` is then taken by
/// arithmetic (everything between the second NUL and the trailing one) so
/// that NUL bytes embedded in `data` itself are not mistaken for
/// delimiters.
fn decode_entry(buf: &[u8]) -> CResult<(String, String, Vec<u8>)> {
    let first_nul = buf.iter().position(|&b| b == 0).ok_or_else(|| Error::Corrupt("version entry missing author terminator".into()))?;
    let author = String::from_utf8(buf[..first_nul].to_vec())?;

    let after_author = &buf[first_nul + 1..];
    let second_nul = after_author
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Corrupt("version entry missing comment terminator".into()))?;
    let comment = String::from_utf8(after_author[..second_nul].to_vec())?;

    let data_start = first_nul + 1 + second_nul + 1;
    if buf.len() < data_start + 1 {
        return Err(Error::Corrupt("version entry missing trailing terminator".into()));
    }
    let data = buf[data_start..buf.len() - 1].to_vec();
    Ok((author, comment, data))
}

/// One version of a versioned object.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionRecord {
    pub version: u64,
    pub author: String,
    pub comment: String,
    pub data: Vec<u8>,
    pub time: u64,
}

/// Factory for opening/creating versionstore rings inside one holstore.
pub struct Versionstore<E: Engine> {
    hol: Arc<Holstore<E>>,
    timestore: Timestore<E>,
}

impl<E: Engine> Versionstore<E> {
    pub fn new(hol: Arc<Holstore<E>>) -> Self {
        let timestore = Timestore::new(Arc::clone(&hol));
        Self { hol, timestore }
    }

    /// Creates a versionstore ring, registering its name in the `"__vs"`
    /// catalog in the same transaction. Unlike every other layer's
    /// `create`, this one is idempotent: creating a versionstore ring that
    /// already exists just opens it, matching the original's behavior.
    pub fn create(&self, name: &str, description: &str, password: Option<&str>) -> CResult<VersionHandle<E>> {
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let created = Timestore::<E>::create_in_tx(tx, name, description, password, 0, None)?;
            if created {
                let mut names = read_catalog(tx)?;
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                    names.sort();
                    write_catalog(tx, &names)?;
                }
            }
            Ok(())
        })?;
        self.open(name, password)
    }

    pub fn open(&self, name: &str, password: Option<&str>) -> CResult<VersionHandle<E>> {
        let ring = self.timestore.open(name, password)?;
        Ok(VersionHandle { ring })
    }

    /// Removes a versionstore ring and its catalog entry.
    pub fn remove(&self, name: &str) -> CResult<()> {
        self.timestore.remove(name)?;
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let mut names = read_catalog(tx)?;
            names.retain(|n| n != name);
            write_catalog(tx, &names)
        })
    }

    /// Names of every ring registered in the versionstore catalog.
    pub fn list_rings(&self) -> CResult<Vec<String>> {
        self.hol.container().with_transaction(TxMode::ReadOnly, read_catalog)
    }
}

/// A handle onto one open versionstore ring.
pub struct VersionHandle<E: Engine> {
    ring: timestore::Ring<E>,
}

impl<E: Engine> VersionHandle<E> {
    pub fn name(&self) -> &str {
        self.ring.name()
    }

    /// Records a new version, returning its version number (== the
    /// underlying ring's sequence number).
    pub fn new_version(&mut self, data: &[u8], author: &str, comment: &str) -> CResult<u64> {
        self.ring.put(&encode_entry(author, comment, data))
    }

    /// Fetches one version without disturbing the handle's own read cursor.
    pub fn get_version(&self, version: u64) -> CResult<Option<VersionRecord>> {
        match self.ring.peek(version)? {
            Some(record) => {
                let (author, comment, data) = decode_entry(&record.data)?;
                Ok(Some(VersionRecord { version, author, comment, data, time: record.time }))
            }
            None => Ok(None),
        }
    }

    pub fn get_latest(&self) -> CResult<Option<VersionRecord>> {
        match self.ring.youngest()? {
            Some(v) => self.get_version(v),
            None => Ok(None),
        }
    }

    /// Every version in the ring, oldest first.
    pub fn get_all(&self) -> CResult<Vec<VersionRecord>> {
        let (oldest, youngest) = match (self.ring.oldest()?, self.ring.youngest()?) {
            (Some(o), Some(y)) => (o, y),
            _ => return Ok(Vec::new()),
        };
        let mut out = Vec::with_capacity((youngest - oldest + 1) as usize);
        for version in oldest..=youngest {
            if let Some(record) = self.get_version(version)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Rewrites a version's author and/or comment, keeping its data and
    /// original insertion time. Fields left `None` keep their current
    /// value.
    pub fn edit(&mut self, version: u64, author: Option<&str>, comment: Option<&str>) -> CResult<()> {
        let existing =
            self.get_version(version)?.ok_or_else(|| Error::NotFound(format!("version {version}")))?;
        let author = author.unwrap_or(&existing.author);
        let comment = comment.unwrap_or(&existing.comment);
        self.ring.replace_at(version, &encode_entry(author, comment, &existing.data))
    }

    pub fn n_versions(&self) -> CResult<u64> {
        match (self.ring.oldest()?, self.ring.youngest()?) {
            (Some(o), Some(y)) => Ok(y - o + 1),
            _ => Ok(0),
        }
    }

    pub fn is_latest(&self, version: u64) -> CResult<bool> {
        Ok(self.ring.youngest()? == Some(version))
    }

    pub fn contains(&self, version: u64) -> CResult<bool> {
        match (self.ring.oldest()?, self.ring.youngest()?) {
            (Some(o), Some(y)) => Ok(version >= o && version <= y),
            _ => Ok(false),
        }
    }

    /// Evicts every version up to and including `upto`.
    pub fn purge(&mut self, upto: u64) -> CResult<()> {
        self.ring.purge(upto)
    }

    pub fn rm(self) -> CResult<()> {
        let mut ring = self.ring;
        ring.rm()
    }

    pub fn ring(&self) -> &timestore::Ring<E> {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut timestore::Ring<E> {
        &mut self.ring
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::container::MemoryEngine;

    fn versionstore() -> Versionstore<MemoryEngine> {
        let hol = Arc::new(Holstore::create_in_memory().unwrap());
        Versionstore::new(hol)
    }

    #[test]
    fn new_then_get_version() {
        let vs = versionstore();
        let mut handle = vs.create("doc", "", None).unwrap();
        let v = handle.new_version(b"hello", "alice", "first").unwrap();
        assert_eq!(v, 0);

        let record = handle.get_version(0).unwrap().unwrap();
        assert_eq!(record.author, "alice");
        assert_eq!(record.comment, "first");
        assert_eq!(record.data, b"hello".to_vec());
    }

    #[test]
    fn versions_increase_monotonically_and_latest_tracks() {
        let vs = versionstore();
        let mut handle = vs.create("doc", "", None).unwrap();
        handle.new_version(b"v0", "a", "c0").unwrap();
        handle.new_version(b"v1", "a", "c1").unwrap();
        let v2 = handle.new_version(b"v2", "a", "c2").unwrap();
        assert_eq!(v2, 2);
        assert!(handle.is_latest(2).unwrap());
        assert_eq!(handle.get_latest().unwrap().unwrap().data, b"v2".to_vec());
    }

    #[test]
    fn edit_preserves_time_and_data() {
        let vs = versionstore();
        let mut handle = vs.create("doc", "", None).unwrap();
        handle.new_version(b"hello", "a", "c1").unwrap();
        let before = handle.get_version(0).unwrap().unwrap();

        handle.edit(0, Some("b"), Some("c2")).unwrap();
        let after = handle.get_version(0).unwrap().unwrap();

        assert_eq!(after.author, "b");
        assert_eq!(after.comment, "c2");
        assert_eq!(after.data, before.data);
        assert_eq!(after.time, before.time);
    }

    #[test]
    fn data_with_embedded_nul_round_trips() {
        let vs = versionstore();
        let mut handle = vs.create("doc", "", None).unwrap();
        handle.new_version(b"a\0b\0c", "a", "c").unwrap();
        let record = handle.get_version(0).unwrap().unwrap();
        assert_eq!(record.data, b"a\0b\0c".to_vec());
    }

    #[test]
    fn create_is_idempotent() {
        let vs = versionstore();
        let mut first = vs.create("doc", "", None).unwrap();
        first.new_version(b"v0", "a", "c0").unwrap();

        let second = vs.create("doc", "", None).unwrap();
        assert_eq!(second.get_latest().unwrap().unwrap().data, b"v0".to_vec());
        assert_eq!(vs.list_rings().unwrap(), vec!["doc".to_string()]);
    }

    #[test]
    fn catalog_tracks_remove() {
        let vs = versionstore();
        vs.create("doc", "", None).unwrap();
        vs.create("other", "", None).unwrap();
        assert_eq!(vs.list_rings().unwrap(), vec!["doc".to_string(), "other".to_string()]);

        vs.remove("doc").unwrap();
        assert_eq!(vs.list_rings().unwrap(), vec!["other".to_string()]);
    }

    #[test]
    fn get_all_returns_every_version_in_order() {
        let vs = versionstore();
        let mut handle = vs.create("doc", "", None).unwrap();
        handle.new_version(b"v0", "a", "c0").unwrap();
        handle.new_version(b"v1", "a", "c1").unwrap();

        let all = handle.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].data, b"v0".to_vec());
        assert_eq!(all[1].data, b"v1".to_vec());
    }
}
