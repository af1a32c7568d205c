use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{fresh_etag, Blob, BlobStore, ETag, StoreError, WriteCondition};

const TMP_EXTENSION: &str = "tmp";

#[derive(Serialize, Deserialize)]
struct Record {
    etag: String,
    body: Vec<u8>,
}

/// Encode a record to [len][bincode][crc32] format.
fn encode_record(writer: &mut impl Write, record: &Record) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

fn decode_record(bytes: &[u8]) -> Result<Record, String> {
    let (len_buf, rest) = bytes.split_first_chunk::<4>().ok_or("missing length prefix")?;
    let len = u32::from_le_bytes(*len_buf) as usize;
    if rest.len() < len + 4 {
        return Err(format!("truncated: expected {len} payload bytes"));
    }
    let (payload, crc_buf) = rest.split_at(len);
    let stored_crc = u32::from_le_bytes([crc_buf[0], crc_buf[1], crc_buf[2], crc_buf[3]]);
    if stored_crc != crc32fast::hash(payload) {
        return Err("checksum mismatch".into());
    }
    bincode::deserialize(payload).map_err(|e| e.to_string())
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

/// `[A-Za-z0-9_.-]` pass through, every other byte becomes `%XX`.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        if is_plain(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn decode_segment(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = name.get(i + 1..i + 3)
            && let Ok(b) = u8::from_str_radix(hex, 16)
        {
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// One file per key beneath `root`, each holding a single framed record.
///
/// Writes land in a temp file that is fsynced and then renamed over the
/// target (`IfMatch`) or hard-linked into place (`IfAbsent`). A hard link
/// fails if the target exists, so creation is atomic without a lock. The
/// `IfMatch` check-and-rename runs under a per-key mutex held only for the
/// synchronous file operations. The mutex is per process.
pub struct FsBlobStore {
    root: PathBuf,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FsBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path. Each segment is percent-encoded, so distinct keys
    /// never share a file and no segment can climb out of `root`.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment.chars().all(|c| c == '.') {
                return Err(StoreError::Io(format!("invalid key: {key}")));
            }
            path.push(encode_segment(segment));
        }
        Ok(path)
    }

    fn read_record(key: &str, path: &Path) -> Result<Option<Record>, StoreError> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        decode_record(&bytes).map(Some).map_err(|reason| StoreError::Corrupt {
            key: key.to_string(),
            reason,
        })
    }

    /// Write `record` to a fresh temp file beside `path` and fsync it.
    fn write_temp(path: &Path, record: &Record) -> io::Result<PathBuf> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp_path = path.with_extension(format!("{}.{}", fresh_etag(), TMP_EXTENSION));
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        encode_record(&mut writer, record)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(tmp_path)
    }

    fn put_sync(&self, key: &str, body: Bytes, condition: WriteCondition) -> Result<ETag, StoreError> {
        let path = self.path_for(key)?;
        let record = Record {
            etag: fresh_etag(),
            body: body.to_vec(),
        };
        let tmp_path = Self::write_temp(&path, &record)?;

        let result = match condition {
            WriteCondition::IfAbsent => match fs::hard_link(&tmp_path, &path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Err(StoreError::Conflict(key.to_string()))
                }
                Err(e) => Err(e.into()),
            },
            WriteCondition::IfMatch(expected) => {
                let lock = self.locks.entry(path.clone()).or_default().clone();
                let swapped = match lock.lock() {
                    Ok(_guard) => match Self::read_record(key, &path) {
                        Ok(Some(current)) if current.etag == expected => {
                            fs::rename(&tmp_path, &path).map_err(StoreError::from)
                        }
                        Ok(_) => Err(StoreError::Conflict(key.to_string())),
                        Err(e) => Err(e),
                    },
                    Err(_) => Err(StoreError::Io("key lock poisoned".into())),
                };
                swapped
            }
        };
        // The rename already consumed the temp file on success.
        let _ = fs::remove_file(&tmp_path);
        result.map(|()| record.etag)
    }

    fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = format!("{prefix}{}", decode_segment(&name));
            if entry.file_type()?.is_dir() {
                Self::collect_keys(&entry.path(), &format!("{key}/"), out)?;
            } else if !name.ends_with(&format!(".{TMP_EXTENSION}")) {
                out.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError> {
        let path = self.path_for(key)?;
        Ok(Self::read_record(key, &path)?.map(|r| Blob {
            body: Bytes::from(r.body),
            etag: r.etag,
        }))
    }

    async fn put(&self, key: &str, body: Bytes, condition: WriteCondition) -> Result<ETag, StoreError> {
        self.put_sync(key, body, condition)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Walk from the deepest directory the prefix names.
        let (dir_part, _) = prefix.rsplit_once('/').unwrap_or(("", prefix));
        let (dir, base) = if dir_part.is_empty() {
            (self.root.clone(), String::new())
        } else {
            (self.path_for(dir_part)?, format!("{dir_part}/"))
        };
        let mut keys = Vec::new();
        Self::collect_keys(&dir, &base, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
