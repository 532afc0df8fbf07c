//! Turning raw engine output into a [`Detection`].
//!
//! The engine returns a named list whose shape depends on the method. The
//! raw value is first serialized into its neutral JSON form and then read
//! into the typed result for that method, so field matching and number
//! coercion are serde's.

use gorp_core::{truncate_seconds, Detection, Method, Sample};
use gorp_rserve::RValue;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::DecodeError;

/// Result of the `vec` method: anomalies keyed by position in the batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorAnomalyResult {
    #[serde(alias = "anomalies", alias = "Anoms")]
    pub anoms: VectorAnoms,
    #[serde(alias = "image", alias = "Data")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VectorAnoms {
    #[serde(alias = "Index")]
    pub index: Vec<f64>,
    #[serde(alias = "value", alias = "Anoms")]
    pub anoms: Vec<f64>,
}

/// Result of the `ts` method: anomalies keyed by timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeAnomalyResult {
    #[serde(alias = "anomalies", alias = "Anoms")]
    pub anoms: TimeAnoms,
    #[serde(alias = "image", alias = "Data")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeAnoms {
    #[serde(alias = "Timestamp")]
    pub timestamp: Vec<f64>,
    #[serde(alias = "value", alias = "Anoms")]
    pub anoms: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyReport {
    Vector(VectorAnomalyResult),
    Time(TimeAnomalyResult),
}

impl AnomalyReport {
    pub fn method(&self) -> Method {
        match self {
            Self::Vector(_) => Method::Vec,
            Self::Time(_) => Method::Ts,
        }
    }

    /// Pair positions with values. The two columns must be the same length.
    pub fn into_detection(self) -> Result<Detection, DecodeError> {
        let method = self.method();
        let (anomalies, png_data) = match self {
            Self::Vector(r) => (pair(r.anoms.index, r.anoms.anoms, index_position)?, r.data),
            Self::Time(r) => (pair(r.anoms.timestamp, r.anoms.anoms, time_position)?, r.data),
        };
        Ok(Detection {
            anomalies,
            png_data,
            method,
        })
    }
}

/// Read `raw` as the result shape of `method`.
pub fn decode(raw: &RValue, method: Method) -> Result<AnomalyReport, DecodeError> {
    Ok(match method {
        Method::Vec => AnomalyReport::Vector(read_shape(raw, method)?),
        Method::Ts => AnomalyReport::Time(read_shape(raw, method)?),
    })
}

pub fn normalize(raw: &RValue, method: Method) -> Result<Detection, DecodeError> {
    decode(raw, method)?.into_detection()
}

fn read_shape<T: DeserializeOwned>(raw: &RValue, method: Method) -> Result<T, DecodeError> {
    let shape_err = |e: serde_json::Error| DecodeError::Shape {
        method,
        reason: e.to_string(),
    };
    let neutral = serde_json::to_value(raw).map_err(shape_err)?;
    serde_json::from_value(neutral).map_err(shape_err)
}

fn pair(
    positions: Vec<f64>,
    values: Vec<f64>,
    to_position: fn(f64) -> Result<i64, DecodeError>,
) -> Result<Vec<Sample>, DecodeError> {
    if positions.len() != values.len() {
        return Err(DecodeError::LengthMismatch {
            positions: positions.len(),
            values: values.len(),
        });
    }
    positions
        .into_iter()
        .zip(values)
        .map(|(p, v)| Ok(Sample::new(to_position(p)?, v)))
        .collect()
}

fn index_position(v: f64) -> Result<i64, DecodeError> {
    if v.fract() != 0.0 {
        return Err(DecodeError::NonIntegralIndex(v));
    }
    truncate_seconds(v).ok_or(DecodeError::PositionOutOfRange(v))
}

fn time_position(v: f64) -> Result<i64, DecodeError> {
    truncate_seconds(v).ok_or(DecodeError::PositionOutOfRange(v))
}
