//! Leaf decoders: fixed-width integers, floats and UUIDs, all built as a
//! `translate` layered over [`super::leaf::bytes`] or [`super::leaf::bit_word`],
//! grounded on `original_source/src/formatbreaker/decoders.py`'s equivalent
//! `Translator(Bytes(n), ...)` constructions.

use super::leaf::{bit_word, bytes};
use super::Parser;
use crate::error::{Error, ErrorKind, Result};
use crate::value::{Uuid, Value};

fn as_bytes(v: Value) -> Result<Vec<u8>> {
    match v {
        Value::Bytes(b) => Ok(b),
        _ => Err(Error::new(ErrorKind::Type)),
    }
}

fn int_parser(width_bytes: u64, big_endian: bool, signed: bool, backup_label: &'static str) -> Parser {
    bytes(width_bytes).named_translate(backup_label, move |v| {
        let b = as_bytes(v)?;
        let mut buf = [0u8; 8];
        if big_endian {
            buf[8 - b.len()..].copy_from_slice(&b);
        } else {
            buf[..b.len()].copy_from_slice(&b);
        }
        let u = if big_endian {
            u64::from_be_bytes(buf)
        } else {
            u64::from_le_bytes(buf)
        };
        if signed {
            let shift = 64 - width_bytes * 8;
            Ok(Value::SInt(((u << shift) as i64) >> shift))
        } else {
            Ok(Value::UInt(u))
        }
    })
}

/// A single signed byte.
pub fn int8() -> Parser {
    int_parser(1, false, true, "Int8")
}

/// A single unsigned byte.
pub fn uint8() -> Parser {
    int_parser(1, false, false, "UInt8")
}

pub fn int16_l() -> Parser {
    int_parser(2, false, true, "Int16L")
}
pub fn int16_b() -> Parser {
    int_parser(2, true, true, "Int16B")
}
pub fn uint16_l() -> Parser {
    int_parser(2, false, false, "UInt16L")
}
pub fn uint16_b() -> Parser {
    int_parser(2, true, false, "UInt16B")
}
pub fn int32_l() -> Parser {
    int_parser(4, false, true, "Int32L")
}
pub fn int32_b() -> Parser {
    int_parser(4, true, true, "Int32B")
}
pub fn uint32_l() -> Parser {
    int_parser(4, false, false, "UInt32L")
}
pub fn uint32_b() -> Parser {
    int_parser(4, true, false, "UInt32B")
}

/// A little-endian IEEE-754 binary32.
pub fn float32_l() -> Parser {
    bytes(4).named_translate("Float32L", |v| {
        let b = as_bytes(v)?;
        let arr: [u8; 4] = b.try_into().map_err(|_| Error::new(ErrorKind::Bounds))?;
        Ok(Value::Float32(f32::from_le_bytes(arr)))
    })
}

/// A little-endian IEEE-754 binary64.
pub fn float64_l() -> Parser {
    bytes(8).named_translate("Float64L", |v| {
        let b = as_bytes(v)?;
        let arr: [u8; 8] = b.try_into().map_err(|_| Error::new(ErrorKind::Bounds))?;
        Ok(Value::Float64(f64::from_le_bytes(arr)))
    })
}

/// A 16-byte UUID whose first three RFC 4122 fields are little-endian.
pub fn uuid_l() -> Parser {
    bytes(16).named_translate("UuidL", |v| {
        let b = as_bytes(v)?;
        let arr: [u8; 16] = b.try_into().map_err(|_| Error::new(ErrorKind::Bounds))?;
        Ok(Value::Uuid(Uuid::from_bytes_le(arr)))
    })
}

/// A 16-byte UUID already in canonical big-endian byte order.
pub fn uuid_b() -> Parser {
    bytes(16).named_translate("UuidB", |v| {
        let b = as_bytes(v)?;
        let arr: [u8; 16] = b.try_into().map_err(|_| Error::new(ErrorKind::Bounds))?;
        Ok(Value::Uuid(Uuid::from_bytes_be(arr)))
    })
}

/// An `n`-bit unsigned integer, MSB-first.
pub fn bit_uint(n: u64) -> Parser {
    bit_word(n).named_translate("BitUInt", |v| match v {
        Value::Bits(b) => Ok(Value::UInt(b.to_uint_as::<u64>()?)),
        _ => Err(Error::new(ErrorKind::Type)),
    })
}

/// An `n`-bit field decoded as a sequence of individual flag bits.
pub fn bit_flags(n: u64) -> Parser {
    bit_word(n).named_translate("BitFlags", |v| match v {
        Value::Bits(b) => Ok(Value::Bools(b.to_bools())),
        _ => Err(Error::new(ErrorKind::Type)),
    })
}

/// A single bit that must be `1`.
pub fn bit_one() -> Parser {
    super::leaf::bit().constant(Value::Bool(true))
}

/// A single bit that must be `0`.
pub fn bit_zero() -> Parser {
    super::leaf::bit().constant(Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::AddrMode;

    #[test]
    fn uint8_reads_unsigned() {
        let result = uint8().labeled("v").parse_bytes(vec![0xFF], AddrMode::Byte).unwrap();
        assert_eq!(result.get("v"), Some(&Value::UInt(0xFF)));
    }

    #[test]
    fn int16_round_trips_both_endiannesses() {
        let le = int16_l().labeled("v").parse_bytes(vec![0x34, 0x12], AddrMode::Byte).unwrap();
        assert_eq!(le.get("v"), Some(&Value::SInt(0x1234)));
        let be = int16_b().labeled("v").parse_bytes(vec![0x12, 0x34], AddrMode::Byte).unwrap();
        assert_eq!(be.get("v"), Some(&Value::SInt(0x1234)));
    }

    #[test]
    fn uint16_round_trips_both_endiannesses() {
        let le = uint16_l().labeled("v").parse_bytes(vec![0xCD, 0xAB], AddrMode::Byte).unwrap();
        assert_eq!(le.get("v"), Some(&Value::UInt(0xABCD)));
        let be = uint16_b().labeled("v").parse_bytes(vec![0xAB, 0xCD], AddrMode::Byte).unwrap();
        assert_eq!(be.get("v"), Some(&Value::UInt(0xABCD)));
    }

    #[test]
    fn uint32_round_trips_both_endiannesses() {
        let le = uint32_l()
            .labeled("v")
            .parse_bytes(vec![0x04, 0x03, 0x02, 0x01], AddrMode::Byte)
            .unwrap();
        assert_eq!(le.get("v"), Some(&Value::UInt(0x01020304)));
        let be = uint32_b()
            .labeled("v")
            .parse_bytes(vec![0x01, 0x02, 0x03, 0x04], AddrMode::Byte)
            .unwrap();
        assert_eq!(be.get("v"), Some(&Value::UInt(0x01020304)));
    }

    #[test]
    fn uuid_l_reverses_first_three_fields_before_canonicalizing() {
        let wire = vec![
            0x01, 0x98, 0xf5, 0x0a, 0x4f, 0xf6, 0xc0, 0x58, 0x61, 0xc8, 0x86, 0x0d, 0x13, 0xa6,
            0x38, 0xea,
        ];
        let result = uuid_l().labeled("v").parse_bytes(wire, AddrMode::Byte).unwrap();
        match result.get("v").unwrap() {
            Value::Uuid(u) => assert_eq!(
                u.as_bytes(),
                &[
                    0x0a, 0xf5, 0x98, 0x01, 0xf6, 0x4f, 0x58, 0xc0, 0x61, 0xc8, 0x86, 0x0d, 0x13,
                    0xa6, 0x38, 0xea,
                ]
            ),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn uuid_b_passes_bytes_through_unchanged() {
        let wire: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
        let result = uuid_b().labeled("v").parse_bytes(wire.to_vec(), AddrMode::Byte).unwrap();
        match result.get("v").unwrap() {
            Value::Uuid(u) => assert_eq!(u.as_bytes(), &wire),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn bit_uint_reads_msb_first() {
        // 0xA5 = 1010_0101; the first 4 bits are 1010 = 0xA.
        let result = bit_uint(4).labeled("v").parse_bytes(vec![0xA5], AddrMode::Byte).unwrap();
        assert_eq!(result.get("v"), Some(&Value::UInt(0xA)));
    }

    #[test]
    fn bit_flags_reads_individual_bits_msb_first() {
        // 0xA5 = 1010_0101; the first 3 bits are 1, 0, 1.
        let result = bit_flags(3).labeled("v").parse_bytes(vec![0xA5], AddrMode::Byte).unwrap();
        assert_eq!(result.get("v"), Some(&Value::Bools(vec![true, false, true])));
    }

    #[test]
    fn bit_one_and_bit_zero_match_or_mismatch() {
        let ok = bit_one().parse_bytes(vec![0x80], AddrMode::Byte);
        assert!(ok.is_ok());
        let err = bit_one().parse_bytes(vec![0x00], AddrMode::Byte).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mismatch);

        let ok = bit_zero().parse_bytes(vec![0x00], AddrMode::Byte);
        assert!(ok.is_ok());
        let err = bit_zero().parse_bytes(vec![0x80], AddrMode::Byte).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mismatch);
    }
}
