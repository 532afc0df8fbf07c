use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single observation: a Unix timestamp (seconds) and its value.
///
/// On the wire a sample is the two-element array `[timestamp, value]`, never
/// an object. The detection engine serializes timestamps as doubles, so
/// decoding accepts a float timestamp and truncates it to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for Sample {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.timestamp, self.value).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(SampleVisitor)
    }
}

struct SampleVisitor;

impl<'de> Visitor<'de> for SampleVisitor {
    type Value = Sample;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a [timestamp, value] pair")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Sample, A::Error> {
        let WireTimestamp(timestamp) = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let value: f64 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(3, &self));
        }
        Ok(Sample { timestamp, value })
    }
}

/// Timestamp that may arrive as an integer or as a float.
struct WireTimestamp(i64);

impl<'de> Deserialize<'de> for WireTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WireTimestampVisitor)
    }
}

struct WireTimestampVisitor;

impl<'de> Visitor<'de> for WireTimestampVisitor {
    type Value = WireTimestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a unix timestamp in seconds")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireTimestamp, E> {
        Ok(WireTimestamp(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireTimestamp, E> {
        i64::try_from(v)
            .map(WireTimestamp)
            .map_err(|_| E::custom(format!("timestamp {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireTimestamp, E> {
        truncate_seconds(v)
            .map(WireTimestamp)
            .ok_or_else(|| E::custom(format!("timestamp {v} out of range")))
    }
}

/// Truncate a float second count toward zero, rejecting values that do not
/// fit in an `i64`.
pub fn truncate_seconds(v: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or above it overflows.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if v.is_finite() && v >= -LIMIT && v < LIMIT {
        Some(v.trunc() as i64)
    } else {
        None
    }
}
