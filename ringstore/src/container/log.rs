use std::collections::BTreeMap;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fs4::FileExt;

use crate::container::engine::Op;
use crate::error::CResult;

/// An append-only log file, containing a sequence of **transaction batches**
/// rather than individual key/value entries. Each batch is encoded as:
///
/// - Total batch length as big-endian u64 (everything that follows, not
///   counting this length field itself).
/// - Op count as big-endian u32.
/// - For each op: a 1-byte tag (0 = put, 1 = delete), key length as
///   big-endian u32, the key, and -- for puts only -- value length as
///   big-endian u32 followed by the value.
///
/// Framing the whole batch behind one length prefix means a crash mid-write
/// leaves a torn tail that is trivially detected and discarded on the next
/// open, making the entire batch (not just one key) the unit of recovery.
pub struct BatchLog {
    pub(crate) path: PathBuf,
    pub(crate) file: std::fs::File,
}

const PUT_TAG: u8 = 0;
const DELETE_TAG: u8 = 1;

impl BatchLog {
    /// Opens a log file, or creates one if it does not exist. Takes out an
    /// exclusive lock on the file until it is closed, or errors if the lock
    /// is already held by another process.
    pub fn new(path: PathBuf) -> CResult<Self> {
        Self::new_with_lock(path, true)
    }

    pub fn new_with_lock(path: PathBuf, try_lock: bool) -> CResult<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(&path)?;

        if try_lock {
            file.try_lock_exclusive()?;
        }

        Ok(Self { path, file })
    }

    /// Replays the log from the start, returning an index of the latest
    /// (value position, value length) for every live key. Keys removed by a
    /// later delete are absent. A torn trailing batch -- the result of a
    /// crash mid-write -- is discarded and the file truncated to the last
    /// complete batch.
    pub fn build_index(&mut self) -> CResult<BTreeMap<Vec<u8>, (u64, u32)>> {
        let mut index = BTreeMap::new();
        let file_len = self.file.metadata()?.len();
        let mut pos = 0u64;

        while pos < file_len {
            match self.read_batch_at(pos, file_len) {
                Some((ops, next_pos)) => {
                    for (key, value_loc) in ops {
                        match value_loc {
                            Some(loc) => {
                                index.insert(key, loc);
                            }
                            None => {
                                index.remove(&key);
                            }
                        }
                    }
                    pos = next_pos;
                }
                None => {
                    log::error!(
                        "found a torn transaction batch at offset {} in {:?}, truncating",
                        pos,
                        self.path
                    );
                    self.file.set_len(pos)?;
                    break;
                }
            }
        }

        Ok(index)
    }

    /// Parses one batch starting at `pos`, returning the ops (as key plus an
    /// optional (value_pos, value_len) for puts) and the offset of the next
    /// batch. Returns `None` if the batch is incomplete.
    fn read_batch_at(
        &mut self,
        pos: u64,
        file_len: u64,
    ) -> Option<(Vec<(Vec<u8>, Option<(u64, u32)>)>, u64)> {
        if pos + 8 > file_len {
            return None;
        }
        let mut len_buf = [0u8; 8];
        self.pread_exact(pos, &mut len_buf).ok()?;
        let body_len = u64::from_be_bytes(len_buf);
        let body_start = pos + 8;
        let next_pos = body_start + body_len;
        if next_pos > file_len {
            return None;
        }

        let mut body = vec![0u8; body_len as usize];
        self.pread_exact(body_start, &mut body).ok()?;
        let mut cursor = std::io::Cursor::new(body.as_slice());

        let op_count = cursor.read_u32::<BigEndian>().ok()?;
        let mut ops = Vec::with_capacity(op_count as usize);
        for _ in 0..op_count {
            let tag = cursor.read_u8().ok()?;
            let key_len = cursor.read_u32::<BigEndian>().ok()? as usize;
            let mut key = vec![0u8; key_len];
            cursor.read_exact(&mut key).ok()?;
            match tag {
                PUT_TAG => {
                    let value_len = cursor.read_u32::<BigEndian>().ok()?;
                    let value_pos = body_start + cursor.position();
                    cursor.set_position(cursor.position() + value_len as u64);
                    if cursor.position() > body_len {
                        return None;
                    }
                    ops.push((key, Some((value_pos, value_len))));
                }
                DELETE_TAG => {
                    ops.push((key, None));
                }
                _ => return None,
            }
        }

        Some((ops, next_pos))
    }

    /// Reads a value previously located by [`Self::build_index`] or
    /// [`Self::write_batch`].
    pub fn read_value(&mut self, value_pos: u64, value_len: u32) -> CResult<Vec<u8>> {
        let mut value = vec![0u8; value_len as usize];
        self.pread_exact(value_pos, &mut value)?;
        Ok(value)
    }

    /// Appends one transaction batch to the log as a single write, returning
    /// for each op the key together with its new (value_pos, value_len), or
    /// `None` for deletes, in the same order as `ops`.
    pub fn write_batch(&mut self, ops: &[Op]) -> CResult<Vec<(Vec<u8>, Option<(u64, u32)>)>> {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(ops.len() as u32)?;

        let mut locations = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                Op::Put(key, value) => {
                    body.write_u8(PUT_TAG)?;
                    body.write_u32::<BigEndian>(key.len() as u32)?;
                    body.extend_from_slice(key);
                    body.write_u32::<BigEndian>(value.len() as u32)?;
                    let value_offset_in_body = body.len() as u64;
                    body.extend_from_slice(value);
                    locations.push((key.clone(), Some((value_offset_in_body, value.len() as u32))));
                }
                Op::Delete(key) => {
                    body.write_u8(DELETE_TAG)?;
                    body.write_u32::<BigEndian>(key.len() as u32)?;
                    body.extend_from_slice(key);
                    locations.push((key.clone(), None));
                }
            }
        }

        let pos = self.file.metadata()?.len();
        let body_start = pos + 8;

        let mut w = BufWriter::with_capacity(8 + body.len(), &mut self.file);
        w.write_u64::<BigEndian>(body.len() as u64)?;
        w.write_all(&body)?;
        w.flush()?;
        drop(w);

        for loc in locations.iter_mut() {
            if let (_, Some((offset, _))) = loc {
                *offset += body_start;
            }
        }

        Ok(locations)
    }

    pub fn sync_all(&self) -> CResult<()> {
        Ok(self.file.sync_all()?)
    }

    pub fn len(&self) -> CResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    #[cfg(unix)]
    fn pread_exact(&self, offset: u64, buf: &mut [u8]) -> CResult<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    #[cfg(windows)]
    fn pread_exact(&self, offset: u64, buf: &mut [u8]) -> CResult<()> {
        use std::io::{Seek, SeekFrom};
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}
