//! Fuzz test for the query key codec
//!
//! Builds keys from arbitrary bytes and checks that encoding never panics,
//! is deterministic, and always yields a JSON array. Keys without floats
//! must round-trip through serde_json to the same values.
//!
//! Run with: cargo +nightly fuzz run key_codec_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use querygate_core::{KeyPart, QueryKey};

fn parts_from_bytes(data: &[u8]) -> Vec<KeyPart> {
    let mut parts = Vec::new();
    for chunk in data.split(|b| *b == 0xFF) {
        let Some((tag, rest)) = chunk.split_first() else {
            continue;
        };
        let part = match tag % 4 {
            0 => KeyPart::Str(String::from_utf8_lossy(rest).into_owned()),
            1 => {
                let mut bytes = [0u8; 8];
                for (slot, byte) in bytes.iter_mut().zip(rest) {
                    *slot = *byte;
                }
                KeyPart::Int(i64::from_le_bytes(bytes))
            }
            2 => {
                let mut bytes = [0u8; 8];
                for (slot, byte) in bytes.iter_mut().zip(rest) {
                    *slot = *byte;
                }
                KeyPart::Float(f64::from_le_bytes(bytes))
            }
            _ => KeyPart::Bool(rest.first().map(|b| b % 2 == 0).unwrap_or(false)),
        };
        parts.push(part);
    }
    parts
}

fuzz_target!(|data: &[u8]| {
    let parts = parts_from_bytes(data);
    let key = QueryKey::from_parts(parts.clone());

    let encoded = key.encode();
    assert_eq!(encoded, key.encode(), "Encoding must be deterministic");
    assert!(encoded.as_str().starts_with('['));
    assert!(encoded.as_str().ends_with(']'));

    let parsed: serde_json::Value =
        serde_json::from_str(encoded.as_str()).expect("Encoded key must be valid JSON");
    let array = parsed.as_array().expect("Encoded key must be a JSON array");
    assert_eq!(array.len(), parts.len());

    for (part, value) in parts.iter().zip(array) {
        match part {
            KeyPart::Str(s) => assert_eq!(value.as_str(), Some(s.as_str())),
            KeyPart::Int(i) => assert_eq!(value.as_i64(), Some(*i)),
            KeyPart::Bool(b) => assert_eq!(value.as_bool(), Some(*b)),
            KeyPart::Float(f) if f.is_finite() => {
                let parsed = value.as_f64().expect("Finite float must stay a number");
                let tolerance = (f.abs() * 1e-15).max(f64::MIN_POSITIVE);
                assert!((parsed - f).abs() <= tolerance, "{} decoded as {}", f, parsed);
            }
            KeyPart::Float(_) => assert!(value.is_object()),
        }
    }
});
