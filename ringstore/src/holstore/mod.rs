//! Holstore: a [`Container`] plus a superblock recording when and on what
//! host the file was created. Ground: `holstore.h`'s `HOLSTORE_MAGIC`,
//! `hol_setsuper`/`hol_platform`/`hol_host`/`hol_os`/`hol_created`/
//! `hol_version` accessors, reworked from a cached-at-open C struct field
//! into a value read from (and written once to) the container itself.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::container::{Container, Engine, FileEngine, MemoryEngine, TxMode};
use crate::error::{CResult, Error};

const MAGIC: &str = "828662";
const VERSION: u32 = 1;
const SUPERBLOCK_KEY: &[u8] = b"superblock";

/// Cached system/creation details, written once at `create` time and never
/// touched again.
#[derive(Clone, Debug, PartialEq)]
pub struct Superblock {
    pub created: u64,
    pub version: u32,
    pub platform: String,
    pub host: String,
    pub os: String,
}

impl Superblock {
    fn encode(&self) -> Vec<u8> {
        format!("{} {} {} {} {} {}", MAGIC, self.version, self.created, self.platform, self.host, self.os)
            .into_bytes()
    }

    fn decode(bytes: &[u8]) -> CResult<Self> {
        let text = String::from_utf8(bytes.to_vec())?;
        let mut fields = text.splitn(6, ' ');
        let magic = fields.next().ok_or_else(|| Error::Corrupt("missing magic".into()))?;
        if magic != MAGIC {
            return Err(Error::Corrupt(format!("bad magic number {magic:?}, expected {MAGIC:?}")));
        }
        let version: u32 = fields
            .next()
            .ok_or_else(|| Error::Corrupt("missing version".into()))?
            .parse()
            .map_err(|_| Error::Corrupt("unparseable version".into()))?;
        let created: u64 = fields
            .next()
            .ok_or_else(|| Error::Corrupt("missing created time".into()))?
            .parse()
            .map_err(|_| Error::Corrupt("unparseable created time".into()))?;
        let platform = fields.next().ok_or_else(|| Error::Corrupt("missing platform".into()))?.to_string();
        let host = fields.next().ok_or_else(|| Error::Corrupt("missing host".into()))?.to_string();
        let os = fields.next().ok_or_else(|| Error::Corrupt("missing os".into()))?.to_string();
        Ok(Self { created, version, platform, host, os })
    }

    fn here(created: u64) -> Self {
        Self {
            created,
            version: VERSION,
            platform: std::env::consts::ARCH.to_string(),
            host: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("COMPUTERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            os: std::env::consts::OS.to_string(),
        }
    }
}

/// A generic storage database: a flat key/value map with search, iteration
/// and transactional put/get/remove, over any [`Engine`].
pub struct Holstore<E: Engine> {
    container: Container<E>,
    superblock: Superblock,
}

impl<E: Engine> Holstore<E> {
    /// Initializes a brand-new, empty container on `engine`, writing the
    /// superblock. Errors with [`Error::AlreadyExists`] if the superblock
    /// key is already present.
    pub fn create_on(engine: E) -> CResult<Self> {
        let container = Container::new(engine);
        let exists = container.with_transaction(TxMode::ReadOnly, |tx| tx.get(SUPERBLOCK_KEY))?;
        if exists.is_some() {
            return Err(Error::AlreadyExists("superblock".into()));
        }
        let created = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let superblock = Superblock::here(created);
        container
            .with_transaction(TxMode::ReadWrite, |tx| tx.put(SUPERBLOCK_KEY.to_vec(), superblock.encode()))?;
        Ok(Self { container, superblock })
    }

    /// Opens an existing container, reading and validating the superblock.
    pub fn open_on(engine: E) -> CResult<Self> {
        let container = Container::new(engine);
        let raw = container
            .with_transaction(TxMode::ReadOnly, |tx| tx.get(SUPERBLOCK_KEY))?
            .ok_or_else(|| Error::Corrupt("missing superblock".into()))?;
        let superblock = Superblock::decode(&raw)?;
        Ok(Self { container, superblock })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> CResult<()> {
        self.container.with_transaction(TxMode::ReadWrite, |tx| tx.put(key.to_vec(), value.to_vec()))
    }

    pub fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        self.container.with_transaction(TxMode::ReadOnly, |tx| tx.get(key))
    }

    pub fn remove(&self, key: &[u8]) -> CResult<()> {
        self.container.with_transaction(TxMode::ReadWrite, |tx| tx.delete(key.to_vec()))
    }

    /// Keys matching an anchored glob (`*`/`?`) pattern, in key order.
    pub fn search(&self, key_pattern: &[u8]) -> CResult<Vec<Vec<u8>>> {
        self.container.with_transaction(TxMode::ReadOnly, |tx| tx.search(key_pattern))
    }

    pub fn first(&self) -> CResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.container.with_transaction(TxMode::ReadOnly, |tx| tx.first())
    }

    pub fn next(&self, after: &[u8]) -> CResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.container.with_transaction(TxMode::ReadOnly, |tx| tx.next(Some(after)))
    }

    pub fn checkpoint(&self) -> CResult<()> {
        self.container.flush()
    }

    /// Total number of keys, not counting the superblock itself.
    pub fn contents(&self) -> CResult<u64> {
        Ok(self.container.footprint()?.keys.saturating_sub(1))
    }

    pub fn footprint(&self) -> CResult<u64> {
        Ok(self.container.footprint()?.total_disk_size)
    }

    pub fn remain(&self) -> CResult<u64> {
        self.container.remain()
    }

    pub fn platform(&self) -> &str {
        &self.superblock.platform
    }

    pub fn host(&self) -> &str {
        &self.superblock.host
    }

    pub fn os(&self) -> &str {
        &self.superblock.os
    }

    pub fn created(&self) -> u64 {
        self.superblock.created
    }

    pub fn version(&self) -> u32 {
        self.superblock.version
    }

    pub fn container(&self) -> &Container<E> {
        &self.container
    }
}

impl Holstore<FileEngine> {
    pub fn create(path: impl Into<PathBuf>) -> CResult<Self> {
        Self::create_on(FileEngine::new(path.into())?)
    }

    pub fn open(path: impl AsRef<Path>) -> CResult<Self> {
        Self::open_on(FileEngine::new(path.as_ref().to_path_buf())?)
    }
}

impl Holstore<MemoryEngine> {
    pub fn create_in_memory() -> CResult<Self> {
        Self::create_on(MemoryEngine::new())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_then_open_roundtrips_superblock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let created = Holstore::create(&path).unwrap();
        assert_eq!(created.version(), VERSION);

        let reopened = Holstore::open(&path).unwrap();
        assert_eq!(reopened.platform(), created.platform());
        assert_eq!(reopened.created(), created.created());
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        Holstore::create(&path).unwrap();
        let err = Holstore::create(&path).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn open_missing_superblock_is_corrupt() {
        let err = Holstore::open_on(MemoryEngine::new()).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn put_get_remove() {
        let h = Holstore::create_in_memory().unwrap();
        h.put(b"a", b"1").unwrap();
        assert_eq!(h.get(b"a").unwrap(), Some(b"1".to_vec()));
        h.remove(b"a").unwrap();
        assert_eq!(h.get(b"a").unwrap(), None);
    }

    #[test]
    fn contents_excludes_superblock() {
        let h = Holstore::create_in_memory().unwrap();
        assert_eq!(h.contents().unwrap(), 0);
        h.put(b"a", b"1").unwrap();
        assert_eq!(h.contents().unwrap(), 1);
    }
}
