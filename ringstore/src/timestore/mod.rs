//! Timestore: named, time-ordered ring buffers of opaque records, layered
//! directly on [`Holstore`]. Ground: `timestore.h`/`timestore.c` --
//! `TS_DATASPACE`/`TS_RINGSPACE`/`TS_SUPERNAME` key prefixes, the
//! `nslots|oldest|youngest|name|description|password` ring record format,
//! and the put/get/mget/replace/jump/tell/purge call shapes.
//!
//! Sequence cursors are modeled as `Option<u64>` rather than the original's
//! `-1`-sentinel `int`: `None` plays the role of both "ring is empty" and
//! "cursor sits before the oldest record".

use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::container::{Engine, Transaction, TxMode};
use crate::error::{CResult, Error};
use crate::holstore::Holstore;

const MAGIC: i32 = 8220;
const VERSION: i32 = 1;
const SUPERBLOCK_KEY: &[u8] = b"__ts";
const RINGSPACE: &str = "__ts_";
const DATASPACE: &str = "__ts__";

pub(crate) fn ring_key(name: &str) -> Vec<u8> {
    format!("{RINGSPACE}{name}").into_bytes()
}

pub(crate) fn datum_key(name: &str, seq: u64) -> Vec<u8> {
    format!("{DATASPACE}{name}_{seq}").into_bytes()
}

fn opt_to_field(v: Option<u64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "-1".to_string(),
    }
}

fn field_to_opt(s: &str) -> CResult<Option<u64>> {
    let n: i64 = s.parse().map_err(|_| Error::Corrupt(format!("bad ring field {s:?}")))?;
    Ok(if n < 0 { None } else { Some(n as u64) })
}

/// One record read back out of a ring.
#[derive(Clone, Debug, PartialEq)]
pub struct TsRecord {
    pub seq: u64,
    pub time: u64,
    pub data: Vec<u8>,
}

/// A record projected into [`Ring::mget_t`]'s uniform tabular view.
#[derive(Clone, Debug, PartialEq)]
pub struct TRow {
    pub seq: u64,
    pub time: u64,
    pub value: String,
}

/// The column header [`Ring::mget_t`] rows are implicitly laid out under.
pub const TROW_HEADER: &str = "_seq\t_time\tvalue";

fn encode_datum(data: &[u8], time: u64) -> CResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(data.len() + 8);
    buf.extend_from_slice(data);
    buf.write_u64::<BigEndian>(time)?;
    Ok(buf)
}

pub(crate) fn decode_datum(mut raw: Vec<u8>) -> CResult<(Vec<u8>, u64)> {
    if raw.len() < 8 {
        return Err(Error::Corrupt("timestore datum shorter than its time tail".into()));
    }
    let split = raw.len() - 8;
    let time = (&raw[split..]).read_u64::<BigEndian>()?;
    raw.truncate(split);
    Ok((raw, time))
}

/// A ring's configuration and current bounds, as stored in its header
/// record.
#[derive(Clone, Debug, PartialEq)]
pub struct RingDescriptor {
    pub name: String,
    pub description: String,
    pub password: Option<String>,
    /// Capacity; `0` means the ring grows without eviction.
    pub nslots: u32,
    pub oldest: Option<u64>,
    pub youngest: Option<u64>,
    /// Not present in the original format: an optional explicit sampling
    /// interval recorded at create time, consulted by tablestore's
    /// consolidated time queries before it falls back to guessing from the
    /// ring name.
    pub sample_period_secs: Option<u64>,
}

impl RingDescriptor {
    fn encode(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.nslots,
            opt_to_field(self.oldest),
            opt_to_field(self.youngest),
            self.name,
            self.description,
            self.password.as_deref().unwrap_or(""),
            opt_to_field(self.sample_period_secs),
        )
        .into_bytes()
    }

    fn decode(bytes: &[u8]) -> CResult<Self> {
        let text = String::from_utf8(bytes.to_vec())?;
        let mut fields = text.splitn(7, '|');
        let nslots: u32 = fields
            .next()
            .ok_or_else(|| Error::Corrupt("missing nslots".into()))?
            .parse()
            .map_err(|_| Error::Corrupt("unparseable nslots".into()))?;
        let oldest = field_to_opt(fields.next().ok_or_else(|| Error::Corrupt("missing oldest".into()))?)?;
        let youngest = field_to_opt(fields.next().ok_or_else(|| Error::Corrupt("missing youngest".into()))?)?;
        let name = fields.next().ok_or_else(|| Error::Corrupt("missing name".into()))?.to_string();
        let description = fields.next().ok_or_else(|| Error::Corrupt("missing description".into()))?.to_string();
        let password = fields.next().ok_or_else(|| Error::Corrupt("missing password".into()))?;
        let password = if password.is_empty() { None } else { Some(password.to_string()) };
        // sample_period_secs is our own addition: absent entirely in rings
        // written before it existed, so default to "unknown" rather than erroring.
        let sample_period_secs = match fields.next() {
            Some(s) => field_to_opt(s)?,
            None => None,
        };
        Ok(Self { nslots, oldest, youngest, name, description, password, sample_period_secs })
    }
}

/// Information returned by [`Ring::tell`].
#[derive(Clone, Debug, PartialEq)]
pub struct RingInfo {
    pub nslots: u32,
    pub nread: u64,
    pub nunread: u64,
    pub description: String,
}

/// Time-ordered ring buffers living inside one holstore.
pub struct Timestore<E: Engine> {
    hol: Arc<Holstore<E>>,
}

impl<E: Engine> Timestore<E> {
    pub fn new(hol: Arc<Holstore<E>>) -> Self {
        Self { hol }
    }

    fn ensure_superblock(tx: &mut Transaction<E>) -> CResult<()> {
        if tx.get(SUPERBLOCK_KEY)?.is_none() {
            tx.put(SUPERBLOCK_KEY.to_vec(), format!("{MAGIC} {VERSION} 0 0").into_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn read_descriptor(tx: &mut Transaction<E>, name: &str) -> CResult<RingDescriptor> {
        let raw = tx.get(&ring_key(name))?.ok_or_else(|| Error::NotFound(format!("ring {name}")))?;
        RingDescriptor::decode(&raw)
    }

    /// Writes a brand-new ring descriptor under an already-open transaction,
    /// without opening one of its own. Returns `false` (and touches nothing)
    /// if a ring of this name already exists, so that a caller sharing the
    /// transaction -- versionstore's `create`, which must also update the
    /// versionstore catalog atomically -- can decide what "already exists"
    /// should mean for it.
    pub(crate) fn create_in_tx(
        tx: &mut Transaction<E>,
        name: &str,
        description: &str,
        password: Option<&str>,
        nslots: u32,
        sample_period_secs: Option<u64>,
    ) -> CResult<bool> {
        if name.is_empty() {
            return Err(Error::Invalid("rings must have names".into()));
        }
        Self::ensure_superblock(tx)?;
        if tx.get(&ring_key(name))?.is_some() {
            return Ok(false);
        }
        let descriptor = RingDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            password: password.map(str::to_string),
            nslots,
            oldest: None,
            youngest: None,
            sample_period_secs,
        };
        tx.put(ring_key(name), descriptor.encode())?;
        Ok(true)
    }

    /// Creates a new ring. Fails with [`Error::AlreadyExists`] if one of the
    /// same name exists already.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        password: Option<&str>,
        nslots: u32,
        sample_period_secs: Option<u64>,
    ) -> CResult<Ring<E>> {
        let created = self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            Self::create_in_tx(tx, name, description, password, nslots, sample_period_secs)
        })?;
        if !created {
            return Err(Error::AlreadyExists(format!("ring {name}")));
        }
        Ok(Ring { hol: Arc::clone(&self.hol), name: name.to_string(), lastread: None })
    }

    /// Opens an existing ring, checking `password` against the one it was
    /// created with.
    pub fn open(&self, name: &str, password: Option<&str>) -> CResult<Ring<E>> {
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            let descriptor = Self::read_descriptor(tx, name)?;
            if descriptor.password.as_deref() != password {
                return Err(Error::AccessDenied);
            }
            Ok(())
        })?;
        Ok(Ring { hol: Arc::clone(&self.hol), name: name.to_string(), lastread: None })
    }

    /// Removes a ring and every record in it.
    pub fn remove(&self, name: &str) -> CResult<()> {
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let descriptor = Self::read_descriptor(tx, name)?;
            if let (Some(oldest), Some(youngest)) = (descriptor.oldest, descriptor.youngest) {
                for seq in oldest..=youngest {
                    tx.delete(datum_key(name, seq))?;
                }
            }
            tx.delete(ring_key(name))
        })
    }

    /// Names of every ring in this holstore.
    pub fn list_rings(&self) -> CResult<Vec<String>> {
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            let keys = tx.search(format!("{RINGSPACE}*").as_bytes())?;
            let mut names = Vec::new();
            for key in keys {
                // Ring keys are "__ts_<name>"; data keys are "__ts__<name>_<seq>",
                // which also match the "__ts_*" glob, so exclude anything whose
                // name-part starts with the extra underscore that marks a datum.
                let suffix = &key[RINGSPACE.len()..];
                if suffix.first() == Some(&b'_') {
                    continue;
                }
                names.push(String::from_utf8(suffix.to_vec())?);
            }
            Ok(names)
        })
    }
}

/// A handle onto one open ring, tracking a read cursor.
pub struct Ring<E: Engine> {
    hol: Arc<Holstore<E>>,
    name: String,
    lastread: Option<u64>,
}

impl<E: Engine> Ring<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lastread(&self) -> Option<u64> {
        self.lastread
    }

    pub fn descriptor(&self) -> CResult<RingDescriptor> {
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| Timestore::read_descriptor(tx, &self.name))
    }

    pub fn oldest(&self) -> CResult<Option<u64>> {
        Ok(self.descriptor()?.oldest)
    }

    pub fn youngest(&self) -> CResult<Option<u64>> {
        Ok(self.descriptor()?.youngest)
    }

    pub fn put(&mut self, data: &[u8]) -> CResult<u64> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.put_with_time(data, now)
    }

    pub fn put_with_time(&mut self, data: &[u8], instime: u64) -> CResult<u64> {
        let name = self.name.clone();
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let mut descriptor = Timestore::read_descriptor(tx, &name)?;
            let new_seq = match descriptor.youngest {
                None => {
                    descriptor.oldest = Some(0);
                    0
                }
                Some(youngest) => {
                    let new_seq = youngest + 1;
                    if descriptor.nslots != 0 {
                        let oldest = descriptor.oldest.unwrap_or(0);
                        if new_seq >= oldest + descriptor.nslots as u64 {
                            tx.delete(datum_key(&name, oldest))?;
                            descriptor.oldest = Some(oldest + 1);
                        }
                    }
                    new_seq
                }
            };
            descriptor.youngest = Some(new_seq);
            tx.put(datum_key(&name, new_seq), encode_datum(data, instime)?)?;
            tx.put(ring_key(&name), descriptor.encode())?;
            Ok(new_seq)
        })
    }

    /// Reads the record at `seq` without disturbing the read cursor. Used by
    /// tablestore to recover a span-owning row's insertion time.
    pub fn peek(&self, seq: u64) -> CResult<Option<TsRecord>> {
        let name = self.name.clone();
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| match tx.get(&datum_key(&name, seq))? {
            Some(raw) => {
                let (data, time) = decode_datum(raw)?;
                Ok(Some(TsRecord { seq, time, data }))
            }
            None => Ok(None),
        })
    }

    /// Reads the next unread record and advances the cursor, or returns
    /// `None` if everything in the ring has already been read.
    pub fn get(&mut self) -> CResult<Option<TsRecord>> {
        let name = self.name.clone();
        let lastread = self.lastread;
        let result = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            let descriptor = Timestore::read_descriptor(tx, &name)?;
            let (oldest, youngest) = match (descriptor.oldest, descriptor.youngest) {
                (Some(o), Some(y)) => (o, y),
                _ => return Ok(None),
            };
            let candidate = lastread.map(|l| l + 1).unwrap_or(oldest).max(oldest);
            if candidate > youngest {
                return Ok(None);
            }
            let raw = tx
                .get(&datum_key(&name, candidate))?
                .ok_or_else(|| Error::Corrupt(format!("missing datum {candidate} in ring {name}")))?;
            let (data, time) = decode_datum(raw)?;
            Ok(Some(TsRecord { seq: candidate, time, data }))
        })?;
        if let Some(record) = &result {
            self.lastread = Some(record.seq);
        }
        Ok(result)
    }

    /// Reads up to `want` unread records in one go.
    pub fn mget(&mut self, want: usize) -> CResult<Vec<TsRecord>> {
        let mut out = Vec::with_capacity(want);
        for _ in 0..want {
            match self.get()? {
                Some(record) => out.push(record),
                None => break,
            }
        }
        Ok(out)
    }

    /// Like [`Self::mget`], but projected into a uniform three-column
    /// `{_seq, _time, value}` view -- the shape a caller wanting a tabular
    /// read without knowing this ring's payload format (e.g. a versionstore
    /// reader) can rely on. Embedded NULs in the payload are replaced with
    /// newlines so the value stays printable as text.
    pub fn mget_t(&mut self, want: usize) -> CResult<Vec<TRow>> {
        Ok(self
            .mget(want)?
            .into_iter()
            .map(|r| TRow { seq: r.seq, time: r.time, value: String::from_utf8_lossy(&r.data).replace('\0', "\n") })
            .collect())
    }

    /// Overwrites the record most recently returned by [`Self::get`],
    /// keeping its original insertion time. Meant to be used as
    /// `get()` followed by `replace()`, without an intervening `jump`.
    pub fn replace(&mut self, data: &[u8]) -> CResult<u64> {
        let seq = self.lastread.ok_or_else(|| Error::Invalid("nothing read yet to replace".into()))?;
        self.replace_at(seq, data)?;
        Ok(seq)
    }

    /// Overwrites the record at `seq`, keeping its original insertion time.
    /// Unlike [`Self::replace`], `seq` need not match the read cursor --
    /// used directly by versionstore's `edit`, which edits a specific
    /// version without disturbing whatever the handle's cursor is doing.
    pub fn replace_at(&mut self, seq: u64, data: &[u8]) -> CResult<()> {
        let name = self.name.clone();
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let descriptor = Timestore::read_descriptor(tx, &name)?;
            match (descriptor.oldest, descriptor.youngest) {
                (Some(oldest), Some(youngest)) if seq >= oldest && seq <= youngest => {}
                _ => return Err(Error::Bounds(format!("element {seq} is not in ring {name}"))),
            }
            let raw = tx
                .get(&datum_key(&name, seq))?
                .ok_or_else(|| Error::Corrupt(format!("missing datum {seq} in ring {name}")))?;
            let (_, time) = decode_datum(raw)?;
            tx.put(datum_key(&name, seq), encode_datum(data, time)?)
        })
    }

    /// Moves the read cursor by a relative amount, clamped to the ring's
    /// current bounds. Does not touch disk.
    pub fn jump(&mut self, delta: i64) -> CResult<i64> {
        let descriptor = self.descriptor()?;
        let (oldest, youngest) = match (descriptor.oldest, descriptor.youngest) {
            (Some(o), Some(y)) => (o as i64, y as i64),
            _ => return Ok(0),
        };
        let from = self.lastread.map(|l| l as i64).unwrap_or(oldest - 1);
        let mut to = from + delta;
        to = to.min(youngest).max(oldest - 1);
        self.lastread = if to < oldest { None } else { Some(to as u64) };
        Ok(to - from)
    }

    pub fn jump_youngest(&mut self) -> CResult<i64> {
        let descriptor = self.descriptor()?;
        let from = self.lastread.map(|l| l as i64).unwrap_or(-1);
        let youngest = descriptor.youngest.map(|y| y as i64).unwrap_or(-1);
        self.lastread = descriptor.youngest;
        Ok(youngest - from)
    }

    pub fn jump_oldest(&mut self) -> CResult<i64> {
        let descriptor = self.descriptor()?;
        let from = self.lastread.map(|l| l as i64).unwrap_or(-1);
        let before_oldest = descriptor.oldest.map(|o| o as i64 - 1).unwrap_or(-1);
        self.lastread = if before_oldest < 0 { None } else { Some(before_oldest as u64) };
        Ok(before_oldest - from)
    }

    pub fn set_jump(&mut self, to: i64) -> CResult<i64> {
        let descriptor = self.descriptor()?;
        let (oldest, youngest) = match (descriptor.oldest, descriptor.youngest) {
            (Some(o), Some(y)) => (o as i64, y as i64),
            _ => return Ok(0),
        };
        let from = self.lastread.map(|l| l as i64).unwrap_or(oldest - 1);
        let clamped = to.min(youngest).max(oldest - 1);
        self.lastread = if clamped < oldest { None } else { Some(clamped as u64) };
        Ok(clamped - from)
    }

    /// Changes the ring's capacity, immediately evicting the oldest records
    /// if shrinking below the current occupancy.
    pub fn resize(&mut self, nslots: u32) -> CResult<()> {
        let name = self.name.clone();
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let mut descriptor = Timestore::read_descriptor(tx, &name)?;
            descriptor.nslots = nslots;
            if nslots != 0 {
                if let (Some(mut oldest), Some(youngest)) = (descriptor.oldest, descriptor.youngest) {
                    while oldest <= youngest && youngest >= oldest + nslots as u64 {
                        tx.delete(datum_key(&name, oldest))?;
                        oldest += 1;
                    }
                    descriptor.oldest = Some(oldest);
                }
            }
            tx.put(ring_key(&name), descriptor.encode())
        })
    }

    pub fn tell(&self) -> CResult<RingInfo> {
        let descriptor = self.descriptor()?;
        let nread = match (descriptor.oldest, self.lastread) {
            (Some(oldest), Some(lastread)) if lastread >= oldest => lastread - oldest + 1,
            _ => 0,
        };
        let total = match (descriptor.oldest, descriptor.youngest) {
            (Some(oldest), Some(youngest)) => youngest - oldest + 1,
            _ => 0,
        };
        Ok(RingInfo {
            nslots: descriptor.nslots,
            nread,
            nunread: total.saturating_sub(nread),
            description: descriptor.description,
        })
    }

    pub fn footprint(&self) -> CResult<u64> {
        self.hol.footprint()
    }

    pub fn remain(&self) -> CResult<u64> {
        self.hol.remain()
    }

    /// Evicts every record with `seq <= upto`. Fails with [`Error::Bounds`],
    /// leaving the ring unchanged, if `upto` falls outside
    /// `[oldest..youngest]`. The read cursor is left as-is: `get`'s own
    /// `candidate = max(lastread+1, oldest)` clamp already accounts for a
    /// cursor that now points below the new `oldest`.
    pub fn purge(&mut self, upto: u64) -> CResult<()> {
        let name = self.name.clone();
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let mut descriptor = Timestore::read_descriptor(tx, &name)?;
            let (oldest, youngest) = match (descriptor.oldest, descriptor.youngest) {
                (Some(o), Some(y)) => (o, y),
                _ => return Err(Error::Bounds(format!("ring {name} is empty"))),
            };
            if upto < oldest || upto > youngest {
                return Err(Error::Bounds(format!("{upto} is outside [{oldest}..{youngest}] in ring {name}")));
            }
            for seq in oldest..=upto {
                tx.delete(datum_key(&name, seq))?;
            }
            if upto == youngest {
                descriptor.oldest = None;
                descriptor.youngest = None;
            } else {
                descriptor.oldest = Some(upto + 1);
            }
            tx.put(ring_key(&name), descriptor.encode())
        })
    }

    /// Deletes every record in the ring and the ring itself.
    pub fn rm(&mut self) -> CResult<()> {
        let name = self.name.clone();
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let descriptor = Timestore::read_descriptor(tx, &name)?;
            if let (Some(oldest), Some(youngest)) = (descriptor.oldest, descriptor.youngest) {
                for seq in oldest..=youngest {
                    tx.delete(datum_key(&name, seq))?;
                }
            }
            tx.delete(ring_key(&name))
        })?;
        self.lastread = None;
        Ok(())
    }

    /// Hints that `nslots` more records are coming. The original C API used
    /// this to pre-extend the backing page file; an append-only log has no
    /// equivalent benefit from preallocating ahead of writes, so this is
    /// intentionally a no-op, kept only so callers porting from that API
    /// have somewhere to call.
    pub fn prealloc(&mut self, _nslots: u32) -> CResult<()> {
        Ok(())
    }

    /// Flushes the underlying holstore. Ring handles otherwise need no
    /// explicit teardown -- dropping one is enough -- but `close` exists so
    /// callers following the lifecycle contract have something to call.
    pub fn close(self) -> CResult<()> {
        self.hol.checkpoint()
    }

    pub fn platform(&self) -> &str {
        self.hol.platform()
    }

    pub fn os(&self) -> &str {
        self.hol.os()
    }

    pub fn host(&self) -> &str {
        self.hol.host()
    }

    pub fn created(&self) -> u64 {
        self.hol.created()
    }

    pub fn version(&self) -> u32 {
        self.hol.version()
    }

    pub fn holstore(&self) -> &Arc<Holstore<E>> {
        &self.hol
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::container::MemoryEngine;

    fn timestore() -> Timestore<MemoryEngine> {
        let hol = Arc::new(Holstore::create_in_memory().unwrap());
        Timestore::new(hol)
    }

    #[test]
    fn create_open_rm_roundtrip() {
        let ts = timestore();
        ts.create("widgets", "widget events", None, 0, None).unwrap();
        assert_eq!(ts.list_rings().unwrap(), vec!["widgets".to_string()]);

        let ring = ts.open("widgets", None).unwrap();
        assert_eq!(ring.name(), "widgets");

        ts.remove("widgets").unwrap();
        assert!(ts.list_rings().unwrap().is_empty());
    }

    #[test]
    fn wrong_password_is_denied() {
        let ts = timestore();
        ts.create("secret", "", Some("hunter2"), 0, None).unwrap();
        let err = ts.open("secret", Some("wrong")).unwrap_err();
        assert!(matches!(err, Error::AccessDenied));
        assert!(ts.open("secret", Some("hunter2")).is_ok());
    }

    #[test]
    fn put_and_get_in_order() {
        let ts = timestore();
        let mut ring = ts.create("events", "", None, 0, None).unwrap();
        ring.put_with_time(b"first", 100).unwrap();
        ring.put_with_time(b"second", 200).unwrap();

        let r1 = ring.get().unwrap().unwrap();
        assert_eq!((r1.seq, r1.time, r1.data), (0, 100, b"first".to_vec()));
        let r2 = ring.get().unwrap().unwrap();
        assert_eq!((r2.seq, r2.time, r2.data), (1, 200, b"second".to_vec()));
        assert_eq!(ring.get().unwrap(), None);
    }

    #[test]
    fn bounded_ring_evicts_oldest() {
        let ts = timestore();
        let mut ring = ts.create("bounded", "", None, 2, None).unwrap();
        ring.put(b"a").unwrap();
        ring.put(b"b").unwrap();
        ring.put(b"c").unwrap();

        assert_eq!(ring.oldest().unwrap(), Some(1));
        assert_eq!(ring.youngest().unwrap(), Some(2));

        let first = ring.get().unwrap().unwrap();
        assert_eq!(first.data, b"b".to_vec());
    }

    #[test]
    fn replace_keeps_original_time() {
        let ts = timestore();
        let mut ring = ts.create("r", "", None, 0, None).unwrap();
        ring.put_with_time(b"old", 42).unwrap();
        ring.get().unwrap();
        ring.jump(-1).unwrap();
        ring.replace(b"new").unwrap();

        ring.jump(-1).unwrap();
        let record = ring.get().unwrap().unwrap();
        assert_eq!(record.data, b"new".to_vec());
        assert_eq!(record.time, 42);
    }

    #[test]
    fn jump_youngest_then_oldest() {
        let ts = timestore();
        let mut ring = ts.create("r", "", None, 0, None).unwrap();
        ring.put(b"a").unwrap();
        ring.put(b"b").unwrap();
        ring.put(b"c").unwrap();

        ring.jump_youngest().unwrap();
        assert_eq!(ring.get().unwrap(), None);

        ring.jump_oldest().unwrap();
        let first = ring.get().unwrap().unwrap();
        assert_eq!(first.seq, 0);
    }

    #[test]
    fn resize_evicts_to_new_capacity() {
        let ts = timestore();
        let mut ring = ts.create("r", "", None, 0, None).unwrap();
        for i in 0..5u8 {
            ring.put(&[i]).unwrap();
        }
        ring.resize(2).unwrap();
        assert_eq!(ring.oldest().unwrap(), Some(3));
        assert_eq!(ring.youngest().unwrap(), Some(4));
    }

    #[test]
    fn purge_evicts_up_to_seq_and_keeps_ring() {
        let ts = timestore();
        let mut ring = ts.create("r", "", None, 0, None).unwrap();
        ring.put(b"a").unwrap();
        ring.put(b"b").unwrap();
        ring.put(b"c").unwrap();

        ring.purge(1).unwrap();
        assert_eq!(ring.oldest().unwrap(), Some(2));
        assert_eq!(ring.youngest().unwrap(), Some(2));
        assert!(ts.open("r", None).is_ok());
    }

    #[test]
    fn purge_out_of_bounds_is_rejected() {
        let ts = timestore();
        let mut ring = ts.create("r", "", None, 0, None).unwrap();
        ring.put(b"a").unwrap();
        ring.put(b"b").unwrap();

        assert!(matches!(ring.purge(5).unwrap_err(), Error::Bounds(_)));
        // unchanged
        assert_eq!(ring.oldest().unwrap(), Some(0));
        assert_eq!(ring.youngest().unwrap(), Some(1));
    }

    #[test]
    fn rm_deletes_ring_entirely() {
        let ts = timestore();
        let mut ring = ts.create("r", "", None, 0, None).unwrap();
        ring.put(b"a").unwrap();
        ring.rm().unwrap();
        assert!(ts.open("r", None).is_err());
    }

    #[test]
    fn mget_t_projects_uniform_columns() {
        let ts = timestore();
        let mut ring = ts.create("r", "", None, 0, None).unwrap();
        ring.put_with_time(b"a\0b", 7).unwrap();
        let rows = ring.mget_t(1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], TRow { seq: 0, time: 7, value: "a\nb".to_string() });
    }
}
