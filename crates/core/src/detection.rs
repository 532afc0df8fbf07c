use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::sample::Sample;

/// Detection method the engine used to produce a result.
///
/// `Ts` treats the batch as a time-ordered series and reports anomalies by
/// timestamp; `Vec` treats it as a plain vector and reports them by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Ts,
    Vec,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ts => "ts",
            Self::Vec => "vec",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ts" => Ok(Self::Ts),
            "vec" => Ok(Self::Vec),
            other => Err(CoreError::UnknownMethod(other.to_string())),
        }
    }
}

/// Normalized outcome of one detection request: the anomalous samples, the
/// rendered PNG plot and the method that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub anomalies: Vec<Sample>,
    #[serde(rename = "pngData", with = "base64_bytes")]
    pub png_data: Vec<u8>,
    pub method: Method,
}

impl Detection {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_and_displays() {
        assert_eq!("ts".parse::<Method>().unwrap(), Method::Ts);
        assert_eq!("vec".parse::<Method>().unwrap(), Method::Vec);
        assert_eq!(Method::Vec.to_string(), "vec");
        assert_eq!(
            "blah".parse::<Method>(),
            Err(CoreError::UnknownMethod("blah".into()))
        );
    }

    #[test]
    fn detection_json_shape() {
        let d = Detection {
            anomalies: vec![Sample::new(0, 6.23), Sample::new(2, 6.39)],
            png_data: vec![0x89, b'P', b'N', b'G'],
            method: Method::Vec,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "anomalies": [[0, 6.23], [2, 6.39]],
                "pngData": "iVBORw==",
                "method": "vec",
            })
        );

        let back: Detection = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
        assert_eq!(back.anomaly_count(), 2);
    }
}
