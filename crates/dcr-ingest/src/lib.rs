// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # dcr-ingest
//!
//! Turns loosely-typed tabular records (CSV rows or JSON objects) into
//! schema-safe JSON documents and ships them to a Logs Ingestion data
//! collection rule (DCR) stream.
//!
//! ## Pipeline
//!
//! ```text
//!   RecordSource ──> normalizer ──> record::assemble ──> BatchPacker ──> Transport
//!   (csv / json)     (names,        (TimeGenerated)      (byte ceiling)  (gzip, POST,
//!                     types)                                              retry)
//! ```
//!
//! - [`normalizer`]: field name sanitization and value type inference
//! - [`record`]: assembly of wire-ready records with a `TimeGenerated` field
//! - [`packer`]: byte-bounded batching that never drops a record
//! - [`transport`]: compression and delivery with bounded exponential backoff
//! - [`pipeline`]: end-to-end driver with running totals and preflight checks
//!
//! Everything runs sequentially: a batch is fully assembled before it is
//! sent and the next batch is not started until the previous delivery returns.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod http;
pub mod logger;
pub mod normalizer;
pub mod packer;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod target;
pub mod token;
pub mod transport;
