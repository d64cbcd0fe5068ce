//! Pluggable encoding for persisted aggregates.
//!
//! A [`Codec`] turns the on-disk record into bytes and back. The store only
//! relies on two properties:
//!
//! - decoding must tolerate shape drift (unknown fields ignored, missing
//!   fields defaulted), which serde provides through `#[serde(default)]`
//! - an empty stream decodes to `None` rather than an error
//!
//! [`JsonCodec`] also refuses NaN and infinite floats up front. JSON has no
//! spelling for them, and writing `null` would produce a file the same type
//! cannot read back.

mod finite;

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

pub use finite::{check_finite, NonFiniteFloat};

/// Encode/decode capability used by the store.
pub trait Codec: Clone + Send + Sync {
    /// Serialize `value` into `writer`.
    fn encode<T: Serialize>(&self, value: &T, writer: &mut dyn Write) -> Result<(), CodecError>;

    /// Deserialize `bytes`, returning `Ok(None)` when there is no data.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Option<T>, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Compact output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output, for files people are expected to read.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T, writer: &mut dyn Write) -> Result<(), CodecError> {
        check_finite(value)?;
        if self.pretty {
            serde_json::to_writer_pretty(writer, value)?;
        } else {
            serde_json::to_writer(writer, value)?;
        }
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Option<T>, CodecError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(bytes)?))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct V1 {
        name: String,
        legacy: u32,
    }

    #[derive(Debug, Default, PartialEq, Deserialize)]
    struct V2 {
        name: String,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[test]
    fn empty_input_is_no_data() {
        let codec = JsonCodec::new();
        assert_eq!(codec.decode::<V1>(b"").unwrap(), None);
        assert_eq!(codec.decode::<V1>(b"  \n").unwrap(), None);
    }

    #[test]
    fn decode_tolerates_shape_drift() {
        let codec = JsonCodec::new();
        let mut buf = Vec::new();
        codec
            .encode(
                &V1 {
                    name: "crowe".to_string(),
                    legacy: 7,
                },
                &mut buf,
            )
            .unwrap();

        let v2: V2 = codec.decode(&buf).unwrap().unwrap();
        assert_eq!(v2.name, "crowe");
        assert!(v2.tags.is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        let codec = JsonCodec::new();
        assert!(codec.decode::<V1>(b"{not json").is_err());
    }

    #[test]
    fn pretty_output_is_indented() {
        let mut buf = Vec::new();
        JsonCodec::pretty()
            .encode(&V1::default(), &mut buf)
            .unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("\n  "));
    }

    #[test]
    fn non_finite_float_is_rejected_before_writing() {
        let codec = JsonCodec::new();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut buf = Vec::new();
            assert!(codec.encode(&vec![1.0, bad], &mut buf).is_err());
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn finite_floats_round_trip_exactly() {
        use rand::Rng;

        let codec = JsonCodec::new();
        let mut rng = rand::thread_rng();
        let values: Vec<f64> = (0..500)
            .map(|_| f64::from_bits(rng.gen::<u64>()))
            .filter(|v| v.is_finite())
            .chain([f64::MIN_POSITIVE, f64::EPSILON, 0.1 + 0.2, 1e-308])
            .collect();

        let mut buf = Vec::new();
        codec.encode(&values, &mut buf).unwrap();
        let back: Vec<f64> = codec.decode(&buf).unwrap().unwrap();

        assert_eq!(back.len(), values.len());
        for (a, b) in values.iter().zip(&back) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
