// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte-bounded batching of assembled records.
//!
//! Records are accumulated until adding the next one would bring the
//! uncompressed JSON array to or past the configured ceiling. At that point
//! the buffered records are flushed as one [`Batch`] and the record that
//! overflowed starts the next buffer.
//!
//! # Sizing
//!
//! A compact JSON array of `n` objects is `[` + the objects joined by `,` +
//! `]`, so its length is
//!
//! ```text
//! 2 + len(record_1) + ... + len(record_n) + (n - 1)
//! ```
//!
//! Each record is measured once when it arrives and the running total is
//! kept incrementally. The flush boundaries are identical to re-serializing
//! the whole buffer on every append.
//!
//! # Guarantees
//!
//! - every record pushed ends up in exactly one batch, in input order
//! - no batch is ever empty
//! - a batch is below the ceiling unless it is a single record that alone
//!   meets or exceeds it; such a record is flushed on its own

use crate::constants::DEFAULT_MAX_POST_BYTES;
use crate::record::AssembledRecord;
use tracing::{debug, warn};

/// Length of `[]`.
const ARRAY_OVERHEAD: usize = 2;

/// One POST-worthy group of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<AssembledRecord>,
    /// Byte length of the compact JSON array of `records`.
    payload_len: usize,
}

impl Batch {
    #[must_use]
    pub fn records(&self) -> &[AssembledRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Uncompressed UTF-8 size of the serialized batch in bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Compact JSON array of the records.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.records)
    }
}

/// Accumulates records into batches bounded by `max_post_bytes`.
#[derive(Debug)]
pub struct BatchPacker {
    buffer: Vec<AssembledRecord>,
    /// Serialized length of `buffer` as a JSON array; 0 when empty.
    buffered_len: usize,
    max_post_bytes: usize,
}

impl Default for BatchPacker {
    fn default() -> Self {
        BatchPacker::new(DEFAULT_MAX_POST_BYTES)
    }
}

impl BatchPacker {
    #[must_use]
    pub fn new(max_post_bytes: usize) -> Self {
        BatchPacker {
            buffer: Vec::new(),
            buffered_len: 0,
            max_post_bytes,
        }
    }

    /// Number of records waiting in the buffer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Adds a record and returns the batch that has to be delivered before it,
    /// if adding it would have reached the ceiling.
    pub fn push(&mut self, record: AssembledRecord) -> Result<Option<Batch>, serde_json::Error> {
        let record_len = record.serialized_len()?;

        let candidate_len = if self.buffer.is_empty() {
            ARRAY_OVERHEAD + record_len
        } else {
            self.buffered_len + 1 + record_len
        };

        if candidate_len < self.max_post_bytes {
            self.buffer.push(record);
            self.buffered_len = candidate_len;
            return Ok(None);
        }

        // Flush before append: the overflowing record opens the next buffer.
        let flushed = self.take();
        self.buffer.push(record);
        self.buffered_len = ARRAY_OVERHEAD + record_len;
        if self.buffered_len >= self.max_post_bytes {
            debug!(
                "Record of {} bytes alone reaches the {} byte ceiling, it will be sent on its own",
                self.buffered_len, self.max_post_bytes
            );
        }
        Ok(flushed)
    }

    /// Flushes whatever is left once the input is exhausted.
    pub fn finish(&mut self) -> Option<Batch> {
        self.take()
    }

    fn take(&mut self) -> Option<Batch> {
        if self.buffer.is_empty() {
            return None;
        }
        let batch = Batch {
            records: std::mem::take(&mut self.buffer),
            payload_len: std::mem::take(&mut self.buffered_len),
        };
        if batch.payload_len >= self.max_post_bytes {
            warn!(
                "Sending single record batch of {} bytes, above the {} byte ceiling",
                batch.payload_len, self.max_post_bytes
            );
        }
        Some(batch)
    }
}
