//! Document Source Adapters

mod jsonl;

pub use jsonl::JsonLinesDocumentSource;
