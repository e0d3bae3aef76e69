//! docimport - bulk document import pipeline.
//!
//! Reads delimited files describing documents, validates and normalizes each
//! record, deduplicates against the batch and the store, and writes the
//! survivors in bulk. Large files are split into chunks processed by a
//! worker pool, with progress and a final report delivered per run.

pub mod cache;
pub mod cli;
pub mod config;
pub mod import;
pub mod jobs;
pub mod models;
pub mod notify;
pub mod repository;
pub mod schema;
pub mod work_queue;
