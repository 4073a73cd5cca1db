//! # Fingerprint Generator
//!
//! Streaming SHA-256 over a document sequence.
//!
//! Each document is written to the hash in canonical JSON form: object keys in
//! lexicographic order, no whitespace. Documents are consumed one at a time,
//! so memory is bounded by the largest single document.
//!
//! The digest depends on delivery order. A source whose order is not stable
//! across calls will report drift where there is none.

use futures::{Stream, StreamExt};
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::io::{self, Write};

use crate::domain::{AnchorError, Document, Fingerprint, Scope};

/// Incremental fingerprint over documents.
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    hasher: Sha256,
    document_count: u64,
}

impl FingerprintHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one document.
    pub fn update(&mut self, document: &Document) -> io::Result<()> {
        let mut sink = HashSink(&mut self.hasher);
        write_canonical_object(&mut sink, document)?;
        self.document_count += 1;
        Ok(())
    }

    /// Finalize and hex-encode.
    pub fn finalize(self) -> Fingerprint {
        Fingerprint {
            digest: hex::encode(self.hasher.finalize()),
            document_count: self.document_count,
        }
    }
}

/// Hash a document stream for `scope`.
///
/// The first error from the stream or from serialization aborts the
/// computation; no partial digest escapes.
pub async fn compute_fingerprint<S>(scope: &Scope, documents: S) -> Result<Fingerprint, AnchorError>
where
    S: Stream<Item = Result<Document, AnchorError>>,
{
    let mut documents = std::pin::pin!(documents);
    let mut hasher = FingerprintHasher::new();

    while let Some(document) = documents.next().await {
        let document = document?;
        hasher
            .update(&document)
            .map_err(|e| AnchorError::Serialization {
                scope: scope.to_string(),
                reason: e.to_string(),
            })?;
    }

    Ok(hasher.finalize())
}

/// Canonical JSON of a single document, as fed to the hash.
pub fn canonical_json(document: &Document) -> io::Result<String> {
    let mut buf = Vec::new();
    write_canonical_object(&mut buf, document)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

struct HashSink<'a>(&'a mut Sha256);

impl Write for HashSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_canonical_object<W: Write>(out: &mut W, map: &Document) -> io::Result<()> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.write_all(b"{")?;
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        serde_json::to_writer(&mut *out, key)?;
        out.write_all(b":")?;
        write_canonical(out, &map[key.as_str()])?;
    }
    out.write_all(b"}")
}

fn write_canonical<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Object(map) => write_canonical_object(out, map),
        Value::Array(items) => {
            out.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                write_canonical(out, item)?;
            }
            out.write_all(b"]")
        }
        scalar => Ok(serde_json::to_writer(&mut *out, scalar)?),
    }
}
