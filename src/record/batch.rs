//! Batches of records and their encoded wire form

use super::TelemetryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// The batch currently accepting records. Owned by the batcher task only.
#[derive(Debug)]
pub struct OpenBatch {
    records: Vec<TelemetryRecord>,
    opened_at: Option<Instant>,
    capacity: usize,
}

impl OpenBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            opened_at: None,
            capacity,
        }
    }

    /// Append a record; the age clock starts at the first record
    pub fn push(&mut self, record: TelemetryRecord) {
        if self.records.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Instant at which this batch reaches `max_age`, if it holds anything
    pub fn deadline(&self, max_age: Duration) -> Option<Instant> {
        self.opened_at.map(|opened| opened + max_age)
    }

    /// Seal the current contents into an immutable batch and reset.
    ///
    /// Returns `None` when empty. Records are moved out, so a record can
    /// never end up in two batches.
    pub fn seal(&mut self) -> Option<Batch> {
        if self.records.is_empty() {
            return None;
        }

        let records = std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity));
        self.opened_at = None;

        Some(Batch {
            id: Uuid::new_v4(),
            records,
            sealed_at: Utc::now(),
        })
    }
}

/// A sealed, ordered group of records handed to the transport
#[derive(Debug, Clone)]
pub struct Batch {
    id: Uuid,
    records: Vec<TelemetryRecord>,
    sealed_at: DateTime<Utc>,
}

impl Batch {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sealed_at(&self) -> DateTime<Utc> {
        self.sealed_at
    }

    /// Serialize into the collector payload
    pub fn encode(&self, instrumentation_key: &str) -> serde_json::Result<EncodedBatch> {
        let envelope = BatchEnvelope {
            instrumentation_key: Cow::Borrowed(instrumentation_key),
            batch_id: self.id,
            sealed_at: self.sealed_at,
            records: Cow::Borrowed(&self.records),
        };

        Ok(EncodedBatch {
            batch_id: self.id,
            record_count: self.records.len(),
            payload: serde_json::to_string(&envelope)?,
        })
    }
}

/// JSON body posted to the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnvelope<'a> {
    pub instrumentation_key: Cow<'a, str>,
    pub batch_id: Uuid,
    pub sealed_at: DateTime<Utc>,
    pub records: Cow<'a, [TelemetryRecord]>,
}

/// A batch ready for the wire; this is also what the retry cache persists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub batch_id: Uuid,
    pub record_count: usize,
    pub payload: String,
}

impl EncodedBatch {
    pub fn decode(&self) -> serde_json::Result<BatchEnvelope<'static>> {
        serde_json::from_str(&self.payload)
    }
}
