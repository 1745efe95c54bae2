//! Hash-chained, MAC-tagged append-only audit log (§4.B).
//!
//! Each [`LogEntry`] forward-links to the one before it: `hash` covers
//! `{payload, prevHash}`, `mac` covers `{payload, prevHash, hash}`. The file
//! is opened with append semantics so concurrent writers cannot interleave
//! partial lines, one JSON object per line, `.tlog` on disk.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Source of the HMAC key used to seal the chain. A trait boundary so a
/// production deployment can plug in a secret-store-backed implementation
/// without touching the writer (Open Question, see DESIGN.md).
pub trait AuditKeySource: Send + Sync {
    fn key(&self) -> Vec<u8>;
}

static DEV_KEY_WARNING: Once = Once::new();

/// A fixed byte key, resolved once from an env var at construction time.
/// Falls back to a hard-coded development constant — logging a warning
/// exactly once — when the env var is unset. Production deployments must
/// supply a key through a real secret store via their own `AuditKeySource`.
pub struct StaticKey {
    key: Vec<u8>,
}

impl StaticKey {
    /// Development fallback key. Never use this for a real deployment.
    const DEV_FALLBACK: &'static [u8] = b"tangent-dev-audit-key-do-not-use-in-production";

    pub fn from_env(var_name: &str) -> Self {
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Self {
                key: val.into_bytes(),
            },
            _ => {
                DEV_KEY_WARNING.call_once(|| {
                    tracing::warn!(
                        env_var = var_name,
                        "TANGENT_AUDIT_KEY not set — falling back to the built-in \
                         development MAC key; this is not safe for production"
                    );
                });
                Self {
                    key: Self::DEV_FALLBACK.to_vec(),
                }
            }
        }
    }

    pub fn from_bytes(key: Vec<u8>) -> Self {
        Self { key }
    }
}

impl AuditKeySource for StaticKey {
    fn key(&self) -> Vec<u8> {
        self.key.clone()
    }
}

/// One entry in the hash chain, as written to disk (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub payload: serde_json::Value,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    pub hash: String,
    pub mac: String,
}

fn canonical_hash_input(payload: &serde_json::Value, prev_hash: &str) -> Vec<u8> {
    // serde_json::Value's default map backing (no `preserve_order` feature)
    // is a BTreeMap, so keys always serialize in sorted order — this is
    // the canonical encoding the hash and MAC are computed over.
    let canon = serde_json::json!({ "payload": payload, "prevHash": prev_hash });
    serde_json::to_vec(&canon).expect("json values always serialize")
}

fn canonical_mac_input(payload: &serde_json::Value, prev_hash: &str, hash: &str) -> Vec<u8> {
    let canon = serde_json::json!({ "payload": payload, "prevHash": prev_hash, "hash": hash });
    serde_json::to_vec(&canon).expect("json values always serialize")
}

fn compute_hash(payload: &serde_json::Value, prev_hash: &str) -> String {
    let bytes = canonical_hash_input(payload, prev_hash);
    hex::encode(Sha256::digest(&bytes))
}

fn compute_mac(key: &[u8], payload: &serde_json::Value, prev_hash: &str, hash: &str) -> String {
    let bytes = canonical_mac_input(payload, prev_hash, hash);
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts a key of any length");
    mac.update(&bytes);
    hex::encode(mac.finalize().into_bytes())
}

struct Inner {
    file: File,
    buffer: Vec<LogEntry>,
    flush_buffer_size: usize,
    last_hash: String,
    key: Vec<u8>,
    total_entries: u64,
}

/// Buffered append-only writer for one session's `.tlog` file.
pub struct HashChainWriter {
    inner: Mutex<Inner>,
    closed: AtomicBool,
}

impl HashChainWriter {
    /// Open (creating if necessary) the log file at `path` for append.
    pub fn open(
        path: &Path,
        key_source: &dyn AuditKeySource,
        flush_buffer_size: usize,
    ) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                buffer: Vec::new(),
                flush_buffer_size: flush_buffer_size.max(1),
                last_hash: String::new(),
                key: key_source.key(),
                total_entries: 0,
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Append one entry: clone payload, compute hash over `{payload,
    /// prevHash}`, compute mac over `{payload, prevHash, hash}`, buffer it,
    /// and flush if the buffer is now full.
    pub fn add_entry(&self, payload: serde_json::Value) -> std::io::Result<LogEntry> {
        if self.closed.load(Ordering::Acquire) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "hash chain writer is closed",
            ));
        }

        let mut inner = self.inner.lock();
        let prev_hash = inner.last_hash.clone();
        let hash = compute_hash(&payload, &prev_hash);
        let mac = compute_mac(&inner.key, &payload, &prev_hash, &hash);

        let entry = LogEntry {
            payload,
            prev_hash,
            hash: hash.clone(),
            mac,
        };

        inner.last_hash = hash;
        inner.buffer.push(entry.clone());
        inner.total_entries += 1;

        if inner.buffer.len() >= inner.flush_buffer_size {
            flush_locked(&mut inner)?;
        }

        Ok(entry)
    }

    /// Force a write of any buffered entries.
    pub fn flush(&self) -> std::io::Result<()> {
        let mut inner = self.inner.lock();
        flush_locked(&mut inner)
    }

    /// Flush remaining entries and mark the writer closed. Safe to call
    /// more than once — only the first call does any work.
    pub fn close(&self) -> std::io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        flush_locked(&mut inner)?;
        inner.file.sync_all()
    }

    /// Total entries ever appended, including ones already flushed to disk.
    pub fn entry_count(&self) -> u64 {
        self.inner.lock().total_entries
    }
}

fn flush_locked(inner: &mut Inner) -> std::io::Result<()> {
    if inner.buffer.is_empty() {
        return Ok(());
    }
    let mut out = String::new();
    for entry in inner.buffer.drain(..) {
        out.push_str(&serde_json::to_string(&entry)?);
        out.push('\n');
    }
    inner.file.write_all(out.as_bytes())?;
    inner.file.flush()
}

/// Error returned by [`verify_hashed_log`], qualified by the 1-indexed
/// line number where verification failed.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("line {line}: invalid JSON: {source}")]
    InvalidJson {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: hash mismatch")]
    HashMismatch { line: usize },
    #[error("line {line}: prevHash does not match previous entry's hash")]
    ChainBroken { line: usize },
    #[error("line {line}: mac mismatch")]
    MacMismatch { line: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream a `.tlog` file line by line, verifying the hash chain and MAC
/// tag of every entry. Returns the number of entries verified.
pub fn verify_hashed_log<R: BufRead>(reader: R, key: &[u8]) -> Result<u64, VerifyError> {
    let mut expected_prev_hash = String::new();
    let mut count = 0u64;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: LogEntry = serde_json::from_str(&line)
            .map_err(|source| VerifyError::InvalidJson { line: line_no, source })?;

        if entry.prev_hash != expected_prev_hash {
            return Err(VerifyError::ChainBroken { line: line_no });
        }

        let recomputed_hash = compute_hash(&entry.payload, &entry.prev_hash);
        if recomputed_hash != entry.hash {
            return Err(VerifyError::HashMismatch { line: line_no });
        }

        let recomputed_mac = compute_mac(key, &entry.payload, &entry.prev_hash, &entry.hash);
        if recomputed_mac != entry.mac {
            return Err(VerifyError::MacMismatch { line: line_no });
        }

        expected_prev_hash = entry.hash;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn key() -> Vec<u8> {
        b"test-mac-key".to_vec()
    }

    struct TestKey(Vec<u8>);
    impl AuditKeySource for TestKey {
        fn key(&self) -> Vec<u8> {
            self.0.clone()
        }
    }

    #[test]
    fn first_entry_has_empty_prev_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tlog");
        let writer = HashChainWriter::open(&path, &TestKey(key()), 8).unwrap();
        let entry = writer.add_entry(serde_json::json!({"kind": "skill_start"})).unwrap();
        assert_eq!(entry.prev_hash, "");
        assert!(!entry.hash.is_empty());
        assert!(!entry.mac.is_empty());
    }

    #[test]
    fn chain_links_forward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tlog");
        let writer = HashChainWriter::open(&path, &TestKey(key()), 8).unwrap();
        let e1 = writer.add_entry(serde_json::json!({"a": 1})).unwrap();
        let e2 = writer.add_entry(serde_json::json!({"a": 2})).unwrap();
        assert_eq!(e2.prev_hash, e1.hash);
    }

    #[test]
    fn write_then_verify_round_trip_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tlog");
        {
            let writer = HashChainWriter::open(&path, &TestKey(key()), 2).unwrap();
            for i in 0..5 {
                writer.add_entry(serde_json::json!({"i": i})).unwrap();
            }
            writer.close().unwrap();
        }

        let file = File::open(&path).unwrap();
        let count = verify_hashed_log(BufReader::new(file), &key()).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn single_byte_mutation_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tlog");
        {
            let writer = HashChainWriter::open(&path, &TestKey(key()), 1).unwrap();
            writer.add_entry(serde_json::json!({"a": 1})).unwrap();
            writer.add_entry(serde_json::json!({"a": 2})).unwrap();
            writer.close().unwrap();
        }

        let mut raw = std::fs::read_to_string(&path).unwrap();
        // Flip one character inside the first line's payload.
        let first_newline = raw.find('\n').unwrap();
        let corrupted_pos = raw[..first_newline].find("\"a\":1").unwrap() + 4;
        let bytes = unsafe { raw.as_bytes_mut() };
        bytes[corrupted_pos] = b'9';

        let err = verify_hashed_log(BufReader::new(raw.as_bytes()), &key()).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::HashMismatch { line: 1 } | VerifyError::MacMismatch { line: 1 }
        ));
    }

    #[test]
    fn wrong_key_fails_mac_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tlog");
        {
            let writer = HashChainWriter::open(&path, &TestKey(key()), 1).unwrap();
            writer.add_entry(serde_json::json!({"a": 1})).unwrap();
            writer.close().unwrap();
        }

        let file = File::open(&path).unwrap();
        let err = verify_hashed_log(BufReader::new(file), b"wrong-key").unwrap_err();
        assert!(matches!(err, VerifyError::MacMismatch { line: 1 }));
    }

    #[test]
    fn broken_chain_is_detected() {
        let entry_a = LogEntry {
            payload: serde_json::json!({"a": 1}),
            prev_hash: String::new(),
            hash: compute_hash(&serde_json::json!({"a": 1}), ""),
            mac: compute_mac(&key(), &serde_json::json!({"a": 1}), "", &compute_hash(&serde_json::json!({"a": 1}), "")),
        };
        // Second entry claims a bogus prevHash instead of entry_a's hash.
        let payload_b = serde_json::json!({"a": 2});
        let bogus_prev = "deadbeef".to_string();
        let hash_b = compute_hash(&payload_b, &bogus_prev);
        let mac_b = compute_mac(&key(), &payload_b, &bogus_prev, &hash_b);
        let entry_b = LogEntry {
            payload: payload_b,
            prev_hash: bogus_prev,
            hash: hash_b,
            mac: mac_b,
        };

        let mut raw = String::new();
        raw.push_str(&serde_json::to_string(&entry_a).unwrap());
        raw.push('\n');
        raw.push_str(&serde_json::to_string(&entry_b).unwrap());
        raw.push('\n');

        let err = verify_hashed_log(BufReader::new(raw.as_bytes()), &key()).unwrap_err();
        assert!(matches!(err, VerifyError::ChainBroken { line: 2 }));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tlog");
        let writer = HashChainWriter::open(&path, &TestKey(key()), 8).unwrap();
        writer.add_entry(serde_json::json!({"a": 1})).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn add_entry_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tlog");
        let writer = HashChainWriter::open(&path, &TestKey(key()), 8).unwrap();
        writer.close().unwrap();
        assert!(writer.add_entry(serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn static_key_falls_back_to_dev_constant_when_env_unset() {
        std::env::remove_var("TANGENT_AUDIT_KEY_TEST_UNSET");
        let source = StaticKey::from_env("TANGENT_AUDIT_KEY_TEST_UNSET");
        assert_eq!(source.key(), StaticKey::DEV_FALLBACK.to_vec());
    }
}
