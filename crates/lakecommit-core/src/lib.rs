//! Core engine for the lakecommit table-append workflow.
//!
//! This crate provides everything the `lakecommit` binary needs to register a
//! Parquet file with a table:
//!
//! - Object storage I/O over `object_store` for `s3://`, `file://`, and
//!   `memory://` locations (`storage` module).
//! - A table metadata model with schemas, snapshots, and data-file
//!   descriptors (`metadata` module).
//! - A storage-backed catalog with a CURRENT pointer and version-guard
//!   optimistic concurrency control (`catalog` module).
//! - Footer-only Parquet column metrics with configurable truncation
//!   (`metrics` module).
//! - An append transaction with an explicit commit retry boundary
//!   (`transaction` module).
//! - The four-stage create-or-load / upload / metrics / append pipeline
//!   (`pipeline` module), configured from the environment (`config` module).
#![deny(missing_docs)]
pub mod assets;
pub mod catalog;
pub mod config;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod table;
pub mod transaction;
