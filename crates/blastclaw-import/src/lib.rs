//! # BlastClaw Import
//!
//! Everything between a contact file on disk and rows in the contact
//! store: parsing (CSV / XLSX / JSON), the two-pass dedup admission
//! pipeline, and the chunked commit that turns accepted records into
//! contacts without ever aborting the batch on a single failure.

pub mod parser;
pub mod pipeline;

pub use parser::parse_contacts_file;
pub use pipeline::{BatchCounts, ImportBatch, COMMIT_CHUNK_SIZE};
