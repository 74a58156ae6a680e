//! Text encoding between the guest's UTF-16 code units and host code points.
//!
//! Only well-formed input is guaranteed to round-trip. Unpaired surrogates
//! are passed through as-is, matching how the guest itself stores them.

use crate::{HostError, HostObject, HostRef, HostValue};

const HIGH_SURROGATES: std::ops::Range<u32> = 0xD800..0xDC00;
const LOW_SURROGATES: std::ops::Range<u32> = 0xDC00..0xE000;

pub fn utf16_to_ucs4(units: &[u16]) -> Vec<u32> {
    let mut points = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        let unit = units[i] as u32;
        if HIGH_SURROGATES.contains(&unit) {
            if let Some(&next) = units.get(i + 1) {
                let next = next as u32;
                if LOW_SURROGATES.contains(&next) {
                    points.push(0x10000 + ((unit - 0xD800) << 10) + (next - 0xDC00));
                    i += 2;
                    continue;
                }
            }
        }
        points.push(unit);
        i += 1;
    }
    points
}

pub fn ucs4_to_utf16(points: &[u32]) -> Vec<u16> {
    let mut units = Vec::with_capacity(points.len());
    for &point in points {
        match point {
            0..=0xFFFF => units.push(point as u16),
            0x10000..=0x10FFFF => {
                let offset = point - 0x10000;
                units.push((0xD800 + (offset >> 10)) as u16);
                units.push((0xDC00 + (offset & 0x3FF)) as u16);
            }
            _ => units.push(char::REPLACEMENT_CHARACTER as u16),
        }
    }
    units
}

/// Decode guest code units into a host string. Unpaired surrogates become
/// U+FFFD because a host string cannot hold them.
pub fn decode_utf16_lossy(units: &[u16]) -> String {
    utf16_to_ucs4(units)
        .into_iter()
        .map(|point| char::from_u32(point).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Convert a 16-bit form string into the 32-bit form.
///
/// Accepts a host string (already code points, returned as a fresh copy) or
/// a list of integer UTF-16 code units.
pub fn as_ucs4(value: &HostRef) -> Result<HostRef, HostError> {
    let expected = || HostError::Type("as_ucs4 expects a string as its first argument".into());
    match value.value() {
        HostValue::Str(text) => Ok(HostObject::string(text.clone())),
        HostValue::List(items) => {
            let units = items
                .borrow()
                .iter()
                .map(|item| item.as_int().and_then(|unit| u16::try_from(unit).ok()))
                .collect::<Option<Vec<u16>>>()
                .ok_or_else(expected)?;
            Ok(HostObject::string(decode_utf16_lossy(&units)))
        }
        _ => Err(expected()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surrogate_pair_combines() {
        // U+1F600 is D83D DE00 in UTF-16.
        assert_eq!(utf16_to_ucs4(&[0x61, 0xD83D, 0xDE00]), vec![0x61, 0x1F600]);
        assert_eq!(ucs4_to_utf16(&[0x61, 0x1F600]), vec![0x61, 0xD83D, 0xDE00]);
    }

    #[test]
    fn lone_surrogate_passes_through() {
        assert_eq!(utf16_to_ucs4(&[0xD83D, 0x61]), vec![0xD83D, 0x61]);
        assert_eq!(decode_utf16_lossy(&[0xD83D, 0x61]), "\u{FFFD}a");
    }

    #[test]
    fn as_ucs4_decodes_code_unit_lists() {
        let units = HostObject::list([0xD83D, 0xDE00].map(HostObject::int));
        let decoded = as_ucs4(&units).unwrap();
        assert_eq!(decoded.as_str(), Some("\u{1F600}"));

        let text = HostObject::string("plain");
        assert_eq!(as_ucs4(&text).unwrap().as_str(), Some("plain"));

        let err = as_ucs4(&HostObject::int(3)).unwrap_err();
        assert!(matches!(err, HostError::Type(_)));
    }
}
