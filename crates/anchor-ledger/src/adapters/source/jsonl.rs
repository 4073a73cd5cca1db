//! JSON-lines document source.
//!
//! A data directory stands for one database: each `<collection>.jsonl` file
//! holds one document per line. Files are read line by line and never loaded
//! whole; blank lines are skipped.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::algorithms::{matches_query, parse_filter, Projection};
use crate::domain::{AnchorError, Document, Scope};
use crate::ports::outbound::{DocumentSource, DocumentStream};

const EXTENSION: &str = "jsonl";

/// Document source over a directory of `.jsonl` collections.
#[derive(Clone, Debug)]
pub struct JsonLinesDocumentSource {
    data_dir: PathBuf,
    name: String,
}

impl JsonLinesDocumentSource {
    /// Source over `data_dir`, named after the directory.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, AnchorError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let name = data_dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| data_dir.display().to_string());
        Self::with_name(data_dir, name)
    }

    /// Source over `data_dir` with an explicit source name.
    pub fn with_name<P: AsRef<Path>>(
        data_dir: P,
        name: impl Into<String>,
    ) -> Result<Self, AnchorError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let name = name.into();
        if !data_dir.is_dir() {
            return Err(AnchorError::SourceUnavailable {
                scope: name,
                reason: format!("{} is not a directory", data_dir.display()),
            });
        }
        Ok(Self { data_dir, name })
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf, AnchorError> {
        if collection.is_empty()
            || collection.contains(['/', '\\'])
            || collection.starts_with('.')
        {
            return Err(AnchorError::InvalidScope(format!(
                "illegal collection name {:?}",
                collection
            )));
        }
        Ok(self
            .data_dir
            .join(format!("{}.{}", collection, EXTENSION)))
    }
}

struct LineCursor {
    lines: Lines<BufReader<File>>,
    filter: Document,
    projection: Projection,
    scope: String,
    line_no: u64,
    done: bool,
}

impl LineCursor {
    async fn next_document(&mut self) -> Option<Result<Document, AnchorError>> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => return Some(Err(self.fail_source(e.to_string()))),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(document)) => {
                    if matches_query(&document, &self.filter) {
                        return Some(Ok(self.projection.apply(document)));
                    }
                }
                Ok(_) => return Some(Err(self.fail_line("not a JSON object".to_string()))),
                Err(e) => return Some(Err(self.fail_line(e.to_string()))),
            }
        }
    }

    fn fail_source(&mut self, reason: String) -> AnchorError {
        self.done = true;
        AnchorError::SourceUnavailable {
            scope: self.scope.clone(),
            reason,
        }
    }

    fn fail_line(&mut self, reason: String) -> AnchorError {
        self.done = true;
        AnchorError::Serialization {
            scope: self.scope.clone(),
            reason: format!("line {}: {}", self.line_no, reason),
        }
    }
}

#[async_trait]
impl DocumentSource for JsonLinesDocumentSource {
    async fn query(&self, scope: &Scope) -> Result<DocumentStream, AnchorError> {
        if scope.source != self.name {
            return Err(AnchorError::SourceUnavailable {
                scope: scope.to_string(),
                reason: format!("source {} is not served here ({})", scope.source, self.name),
            });
        }
        let filter = parse_filter(&scope.query)?;
        let projection = Projection::parse(&scope.projection)?;
        let path = self.collection_path(&scope.collection)?;

        let file = File::open(&path)
            .await
            .map_err(|e| AnchorError::SourceUnavailable {
                scope: scope.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })?;
        tracing::debug!("[anchor] Streaming {} for {}", path.display(), scope);

        let cursor = LineCursor {
            lines: BufReader::new(file).lines(),
            filter,
            projection,
            scope: scope.to_string(),
            line_no: 0,
            done: false,
        };
        let documents = stream::unfold(cursor, |mut cursor| async move {
            cursor
                .next_document()
                .await
                .map(|document| (document, cursor))
        });
        Ok(documents.boxed())
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
