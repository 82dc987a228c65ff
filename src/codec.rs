// Scalar wire codec
//
// Converts between host-native scalar values and the remote debugger's fixed
// little-endian wire formats, and decodes the typed textual payloads returned
// by remote function evaluation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// Encode `value` as exactly `width` little-endian bytes.
///
/// Fails with a decode error when the value does not fit in `width` bytes
/// for the requested signedness.
pub fn encode_fixed(value: i128, width: usize, signedness: Signedness) -> Result<Vec<u8>> {
    if width == 0 || width > 16 {
        return Err(Error::Decode(format!("unsupported field width {width}")));
    }
    let bits = width as u32 * 8;
    let fits = match signedness {
        Signedness::Signed => {
            let min = -(1i128 << (bits - 1));
            let max = (1i128 << (bits - 1)) - 1;
            value >= min && value <= max
        }
        Signedness::Unsigned => {
            value >= 0 && (bits == 128 || value < (1i128 << bits))
        }
    };
    if !fits {
        return Err(Error::Decode(format!(
            "value {value} does not fit in {width} {signedness:?} bytes"
        )));
    }
    Ok(value.to_le_bytes()[..width].to_vec())
}

// Function-evaluation result type discriminators, as returned by the remote
// side together with the textual payload.
pub mod result_types {
    pub const ERROR: u32 = 0x0000;
    pub const BOOLEAN: u32 = 0x0001;
    pub const BINARY: u32 = 0x0002;
    pub const HEX: u32 = 0x0004;
    pub const DECIMAL: u32 = 0x0008;
    pub const FLOAT: u32 = 0x0010;
    pub const ASCII_CONSTANT: u32 = 0x0020;
    pub const STRING: u32 = 0x0040;
    pub const NUMERIC_RANGE: u32 = 0x0080;
    pub const ADDRESS: u32 = 0x0100;
    pub const ADDRESS_RANGE: u32 = 0x0200;
    pub const TIME: u32 = 0x0400;
    pub const TIME_RANGE: u32 = 0x0800;
    pub const BITMASK: u32 = 0x4000;
    pub const EMPTY: u32 = 0x8000;
}

/// Typed result of a remote function evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FncValue {
    Error(String),
    Boolean(bool),
    Binary(u64),
    Hex(u64),
    Decimal(i64),
    Float(f64),
    AsciiConstant(String),
    String(String),
    NumericRange(String),
    Address(String),
    AddressRange(String),
    Time(f64),
    TimeRange(f64, f64),
    Bitmask(String),
    Empty,
}

/// Decode the textual payload of a function-evaluation reply according to
/// its type discriminator.
///
/// Unknown discriminators decode to `Empty`; the remote side reserves codes
/// the published table does not assign.
pub fn decode_function_result(type_code: u32, text: &str) -> Result<FncValue> {
    use result_types::*;
    match type_code {
        ERROR => Ok(FncValue::Error(text.to_string())),
        BOOLEAN => match text {
            "TRUE()" => Ok(FncValue::Boolean(true)),
            "FALSE()" => Ok(FncValue::Boolean(false)),
            other => Err(Error::Decode(format!("invalid boolean literal {other:?}"))),
        },
        BINARY => {
            let digits = text
                .strip_prefix("0y")
                .or_else(|| text.strip_prefix("0b"))
                .unwrap_or_else(|| &text[2.min(text.len())..]);
            u64::from_str_radix(digits, 2)
                .map(FncValue::Binary)
                .map_err(|_| Error::Decode(format!("invalid binary literal {text:?}")))
        }
        HEX => u64::from_str_radix(text.trim_start_matches("0x"), 16)
            .map(FncValue::Hex)
            .map_err(|_| Error::Decode(format!("invalid hex literal {text:?}"))),
        DECIMAL => {
            // decimal replies carry a trailing '.' radix marker
            let digits = text.strip_suffix('.').unwrap_or(text);
            digits
                .parse::<i64>()
                .map(FncValue::Decimal)
                .map_err(|_| Error::Decode(format!("invalid decimal literal {text:?}")))
        }
        FLOAT => text
            .parse::<f64>()
            .map(FncValue::Float)
            .map_err(|_| Error::Decode(format!("invalid float literal {text:?}"))),
        ASCII_CONSTANT => Ok(FncValue::AsciiConstant(text.to_string())),
        STRING => Ok(FncValue::String(text.to_string())),
        NUMERIC_RANGE => Ok(FncValue::NumericRange(text.to_string())),
        ADDRESS => Ok(FncValue::Address(text.to_string())),
        ADDRESS_RANGE => Ok(FncValue::AddressRange(text.to_string())),
        TIME => decode_time(text).map(FncValue::Time),
        TIME_RANGE => {
            let mut parts = text.split("--");
            match (parts.next(), parts.next(), parts.next()) {
                (Some(lo), Some(hi), None) => {
                    Ok(FncValue::TimeRange(decode_time(lo)?, decode_time(hi)?))
                }
                _ => Err(Error::Decode(format!("invalid time range {text:?}"))),
            }
        }
        BITMASK => Ok(FncValue::Bitmask(text.to_string())),
        EMPTY => Ok(FncValue::Empty),
        _ => Ok(FncValue::Empty),
    }
}

/// Time values carry a single trailing unit character (e.g. `1.5s`).
fn decode_time(text: &str) -> Result<f64> {
    // the unit may be any char, so cut on the last char boundary
    let stripped = match text.char_indices().last() {
        Some((unit_start, _)) => &text[..unit_start],
        None => return Err(Error::Decode("empty time value".to_string())),
    };
    stripped
        .parse::<f64>()
        .map_err(|_| Error::Decode(format!("invalid time value {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_fixed_width_and_order() {
        assert_eq!(
            encode_fixed(0x1234, 2, Signedness::Unsigned).unwrap(),
            vec![0x34, 0x12]
        );
        assert_eq!(
            encode_fixed(-1, 4, Signedness::Signed).unwrap(),
            vec![0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(encode_fixed(1, 8, Signedness::Unsigned).unwrap().len(), 8);
    }

    #[test]
    fn test_encode_fixed_range_check() {
        assert!(encode_fixed(256, 1, Signedness::Unsigned).is_err());
        assert!(encode_fixed(128, 1, Signedness::Signed).is_err());
        assert!(encode_fixed(-129, 1, Signedness::Signed).is_err());
        assert!(encode_fixed(-1, 1, Signedness::Unsigned).is_err());
        assert!(encode_fixed(127, 1, Signedness::Signed).is_ok());
        assert!(encode_fixed(255, 1, Signedness::Unsigned).is_ok());
    }

    #[test]
    fn test_decode_boolean_exact_tokens() {
        assert_eq!(
            decode_function_result(result_types::BOOLEAN, "TRUE()").unwrap(),
            FncValue::Boolean(true)
        );
        assert_eq!(
            decode_function_result(result_types::BOOLEAN, "FALSE()").unwrap(),
            FncValue::Boolean(false)
        );
        assert!(decode_function_result(result_types::BOOLEAN, "true").is_err());
        assert!(decode_function_result(result_types::BOOLEAN, "TRUE").is_err());
    }

    #[test]
    fn test_decode_numeric_forms() {
        assert_eq!(
            decode_function_result(result_types::HEX, "1FF").unwrap(),
            FncValue::Hex(0x1FF)
        );
        assert_eq!(
            decode_function_result(result_types::DECIMAL, "100.").unwrap(),
            FncValue::Decimal(100)
        );
        assert_eq!(
            decode_function_result(result_types::BINARY, "0y1010").unwrap(),
            FncValue::Binary(10)
        );
        assert_eq!(
            decode_function_result(result_types::FLOAT, "2.5").unwrap(),
            FncValue::Float(2.5)
        );
    }

    #[test]
    fn test_decode_time_strips_unit_suffix() {
        assert_eq!(
            decode_function_result(result_types::TIME, "1.5s").unwrap(),
            FncValue::Time(1.5)
        );
        // the unit character may be multi-byte
        assert_eq!(
            decode_function_result(result_types::TIME, "1.5µ").unwrap(),
            FncValue::Time(1.5)
        );
        assert!(decode_function_result(result_types::TIME, "µ").is_err());
        assert!(decode_function_result(result_types::TIME, "").is_err());
    }

    #[test]
    fn test_decode_time_range_splits_on_double_dash() {
        assert_eq!(
            decode_function_result(result_types::TIME_RANGE, "1.5s--3.0s").unwrap(),
            FncValue::TimeRange(1.5, 3.0)
        );
        assert!(decode_function_result(result_types::TIME_RANGE, "1.5s").is_err());
        assert!(decode_function_result(result_types::TIME_RANGE, "1s--2s--3s").is_err());
    }

    #[test]
    fn test_decode_empty_and_unknown() {
        assert_eq!(
            decode_function_result(result_types::EMPTY, "").unwrap(),
            FncValue::Empty
        );
        assert_eq!(
            decode_function_result(0x2000, "whatever").unwrap(),
            FncValue::Empty
        );
    }
}
