//! Benchmark messages and their wire format.
//!
//! Every payload is a SenML pack (RFC 8428, JSON encoding). Record 0 carries
//! the publisher's client id as base name and its wall-clock send stamp, in
//! microseconds since the Unix epoch, as value:
//!
//! ```json
//! [{"bn":"pub-20240610120000-3f2a9c1b-0","v":1718000000123456.0},
//!  {"n":"temperature","u":"Cel","v":21.5,"t":1718000000.12},...]
//! ```
//!
//! The remaining records are copies of a configurable template record, as
//! many as needed to bring the pack up to the configured message size.
//! Subscribers only look at record 0.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

use crate::session::QoS;
use crate::utils::error::{DecodeError, PublishError};

/// Record template used when none is configured.
pub const DEFAULT_RECORD: &str = r#"{"n":"temperature","u":"Cel","v":21.5}"#;

/// One SenML record. Only the fields the harness writes or reads are
/// modelled; unknown labels in a template are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SenmlRecord {
    #[serde(rename = "bn", default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    #[serde(rename = "bt", default, skip_serializing_if = "Option::is_none")]
    pub base_time: Option<f64>,
    #[serde(rename = "bu", default, skip_serializing_if = "Option::is_none")]
    pub base_unit: Option<String>,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(rename = "vs", default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(rename = "vb", default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    #[serde(rename = "vd", default, skip_serializing_if = "Option::is_none")]
    pub data_value: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(rename = "ut", default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<f64>,
}

impl SenmlRecord {
    fn stamp(publisher_id: &str, sent_unix_us: i64) -> Self {
        Self {
            base_name: Some(publisher_id.to_string()),
            value: Some(sent_unix_us as f64),
            ..Self::default()
        }
    }
}

/// Shape shared by every message of a run: the template record and the
/// target pack size in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadTemplate {
    record: SenmlRecord,
    size: usize,
}

impl PayloadTemplate {
    /// Parses `record` as one SenML record in JSON.
    pub fn new(record: &str, size: usize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            record: serde_json::from_str(record)?,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Upper bound of an encoded pack: the last record may overshoot
    /// `size` by one record and its `t` label.
    pub fn max_len(&self) -> usize {
        self.size + encoded_len(&self.record) + 32
    }

    // Template copies following the stamp record, timestamped `time`
    // seconds. Enough of them to reach `size` once the stamp is added.
    fn fill(&self, publisher_id: &str, time: f64) -> Vec<SenmlRecord> {
        let now_us = chrono::Utc::now().timestamp_micros();
        let stamp = encoded_len(&SenmlRecord::stamp(publisher_id, now_us));
        let record = SenmlRecord {
            time: Some(time),
            ..self.record.clone()
        };
        // Brackets around the pack plus one comma per extra record.
        let per_record = encoded_len(&record) + 1;
        let missing = self.size.saturating_sub(stamp + 2);
        vec![record; missing.div_ceil(per_record)]
    }
}

fn encoded_len(record: &SenmlRecord) -> usize {
    serde_json::to_vec(record).map(|v| v.len()).unwrap_or(0)
}

struct OutgoingPack<'a> {
    stamp: SenmlRecord,
    fill: &'a [SenmlRecord],
}

impl Serialize for OutgoingPack<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.fill.len() + 1))?;
        seq.serialize_element(&self.stamp)?;
        for record in self.fill {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

/// Publisher id and send stamp recovered from a received pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub publisher_id: String,
    pub sent_unix_us: i64,
}

pub fn decode_envelope(payload: &[u8]) -> Result<Envelope, DecodeError> {
    let pack: Vec<SenmlRecord> = serde_json::from_slice(payload)?;
    let stamp = pack.into_iter().next().ok_or(DecodeError::EmptyPack)?;
    let publisher_id = stamp
        .base_name
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingId)?;
    let sent = stamp.value.ok_or(DecodeError::MissingStamp)?;
    Ok(Envelope {
        publisher_id,
        sent_unix_us: sent as i64,
    })
}

/// One message of a publisher's run.
///
/// `sent_at`, `delivered_at` and `error` are each set at most once by the
/// publish path.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: Arc<str>,
    pub qos: QoS,
    pub retain: bool,
    pub client_id: Arc<str>,
    pub seq: usize,
    fill: Arc<[SenmlRecord]>,
    sent_at: Option<Instant>,
    delivered_at: Option<Instant>,
    error: Option<PublishError>,
}

impl Message {
    /// Encodes the pack with the given wall-clock send stamp.
    pub fn payload(&self, sent_unix_us: i64) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&OutgoingPack {
            stamp: SenmlRecord::stamp(&self.client_id, sent_unix_us),
            fill: &self.fill,
        })
    }

    pub fn mark_sent(&mut self) {
        if self.sent_at.is_none() {
            self.sent_at = Some(Instant::now());
        }
    }

    pub fn mark_delivered(&mut self) {
        if self.delivered_at.is_none() && self.error.is_none() {
            self.delivered_at = Some(Instant::now());
        }
    }

    pub fn fail(&mut self, error: PublishError) {
        if self.error.is_none() && self.delivered_at.is_none() {
            self.error = Some(error);
        }
    }

    pub fn error(&self) -> Option<&PublishError> {
        self.error.as_ref()
    }

    /// Publish-issued to acknowledgment time, for successful messages only.
    pub fn round_trip(&self) -> Option<Duration> {
        if self.error.is_some() {
            return None;
        }
        match (self.sent_at, self.delivered_at) {
            (Some(sent), Some(delivered)) => Some(delivered.saturating_duration_since(sent)),
            _ => None,
        }
    }
}

/// Produces exactly `count` messages for one publisher, in order.
#[derive(Debug)]
pub struct MessageGenerator {
    topic: Arc<str>,
    qos: QoS,
    retain: bool,
    client_id: Arc<str>,
    fill: Arc<[SenmlRecord]>,
    count: usize,
    next: usize,
}

impl MessageGenerator {
    pub fn new(
        client_id: &str,
        topic: &str,
        qos: QoS,
        retain: bool,
        template: &PayloadTemplate,
        count: usize,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_micros() as f64 / 1e6;
        Self {
            topic: topic.into(),
            qos,
            retain,
            client_id: client_id.into(),
            fill: template.fill(client_id, now).into(),
            count,
            next: 0,
        }
    }
}

impl Iterator for MessageGenerator {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if self.next >= self.count {
            return None;
        }
        let seq = self.next;
        self.next += 1;
        Some(Message {
            topic: Arc::clone(&self.topic),
            qos: self.qos,
            retain: self.retain,
            client_id: Arc::clone(&self.client_id),
            seq,
            fill: Arc::clone(&self.fill),
            sent_at: None,
            delivered_at: None,
            error: None,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for MessageGenerator {}
