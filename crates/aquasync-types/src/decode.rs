//! Payload decoding for AquaSense characteristic values.
//!
//! The bottle firmware reports its volume as a short UTF-8 string, base64
//! encoded at the transport layer, e.g. `" Volume: 142.3 mL"`, or the warm-up
//! sentinel `"Waiting..."` while the sensor has no stable reading. Battery
//! payloads are base64-encoded raw bytes with the percentage in the first
//! byte.
//!
//! Decoding never fails loudly: a payload that cannot be turned into a number
//! yields `None`. The caller cannot distinguish "sensor still settling" from
//! "unparseable text", and does not need to; both mean "wait and sync again".

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Prefix reported while the firmware has no stable reading yet.
const WAITING_PREFIX: &str = "waiting";

/// Decode a base64 volume payload into rounded millilitres.
///
/// Returns `None` for invalid base64, non-UTF-8 text, the warm-up sentinel,
/// and text without a numeric token.
///
/// # Examples
///
/// ```
/// use aquasync_types::decode::decode_volume;
///
/// assert_eq!(decode_volume(b"IFZvbHVtZTogMTQyLjMgbUw="), Some(142)); // " Volume: 142.3 mL"
/// assert_eq!(decode_volume(b"V2FpdGluZy4uLg=="), None); // "Waiting..."
/// assert_eq!(decode_volume(b""), None);
/// ```
pub fn decode_volume(raw: &[u8]) -> Option<i32> {
    let decoded = BASE64.decode(raw).ok()?;
    let text = std::str::from_utf8(&decoded).ok()?;
    parse_volume_text(text)
}

/// Parse the decoded text form of a volume reading.
///
/// Extracts the first numeric token, preferring one followed by an `mL`
/// unit suffix (case-insensitive) over a bare number, and rounds to the
/// nearest integer.
pub fn parse_volume_text(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed
        .get(..WAITING_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(WAITING_PREFIX))
    {
        return None;
    }
    extract_millilitres(trimmed).map(|ml| ml.round() as i32)
}

/// Decode a base64 battery payload; the first decoded byte is the percentage.
///
/// Values above 100 are clamped. Empty payloads yield `None`.
pub fn decode_battery(raw: &[u8]) -> Option<u8> {
    let decoded = BASE64.decode(raw).ok()?;
    parse_battery_bytes(&decoded)
}

/// Read a battery percentage from already-decoded characteristic bytes.
pub fn parse_battery_bytes(bytes: &[u8]) -> Option<u8> {
    bytes.first().map(|&level| level.min(100))
}

/// Decode the vendor battery-text payload (e.g. `"87%"`) into a percentage.
pub fn decode_battery_text(raw: &[u8]) -> Option<u8> {
    let decoded = BASE64.decode(raw).ok()?;
    let text = std::str::from_utf8(&decoded).ok()?;
    let percent = extract_first_number(text.trim())?.round();
    if (0.0..=100.0).contains(&percent) {
        Some(percent as u8)
    } else {
        None
    }
}

/// Find the millilitre value in a reading string.
///
/// The firmware format places the number right before "mL", but stray debug
/// output has been observed around it, so scan token by token rather than
/// assuming a fixed layout.
fn extract_millilitres(text: &str) -> Option<f64> {
    let mut bare = None;
    let mut index = 0;
    while index < text.len() {
        match scan_number(text, index) {
            Some((value, end)) => {
                if has_ml_suffix(&text[end..]) {
                    return Some(value);
                }
                if bare.is_none() {
                    bare = Some(value);
                }
                index = end;
            }
            None => {
                // Advance one character, staying on a UTF-8 boundary.
                index += text[index..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    bare
}

fn extract_first_number(text: &str) -> Option<f64> {
    let mut index = 0;
    while index < text.len() {
        if let Some((value, _)) = scan_number(text, index) {
            return Some(value);
        }
        index += text[index..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// Try to read a number (`[-+]?digits[.digits]` or `[-+]?.digits`) starting
/// exactly at `start`. Returns the value and the byte offset one past it.
fn scan_number(text: &str, start: usize) -> Option<(f64, usize)> {
    let bytes = text.as_bytes();
    let mut pos = start;

    if matches!(bytes.get(pos), Some(b'+') | Some(b'-')) {
        pos += 1;
    }

    let int_start = pos;
    while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    let int_digits = pos - int_start;

    let mut end = pos;
    if bytes.get(pos) == Some(&b'.') {
        let frac_start = pos + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        // A trailing dot without digits is not part of the number ("5." -> 5).
        if frac_end > frac_start {
            end = frac_end;
        }
    }

    if int_digits == 0 && end == pos {
        return None;
    }

    text[start..end].parse::<f64>().ok().map(|value| (value, end))
}

/// Check for a case-insensitive `mL` unit right after a number, allowing
/// whitespace in between.
fn has_ml_suffix(rest: &str) -> bool {
    let rest = rest.trim_start();
    let mut chars = rest.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(m), Some(l)) if m.eq_ignore_ascii_case(&'m') && l.eq_ignore_ascii_case(&'l')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(text: &str) -> Vec<u8> {
        BASE64.encode(text).into_bytes()
    }

    // --- Volume decoding ---

    #[test]
    fn test_decode_volume_standard_format() {
        assert_eq!(decode_volume(&encode(" Volume: 142.3 mL")), Some(142));
        assert_eq!(decode_volume(&encode(" Volume: 0.0 mL")), Some(0));
        assert_eq!(decode_volume(&encode("Volume: 750 mL")), Some(750));
    }

    #[test]
    fn test_decode_volume_rounds_to_nearest() {
        assert_eq!(parse_volume_text("Volume: 142.5 mL"), Some(143));
        assert_eq!(parse_volume_text("Volume: 142.49 mL"), Some(142));
        assert_eq!(parse_volume_text("Volume: -2.6 mL"), Some(-3));
    }

    #[test]
    fn test_decode_volume_waiting_sentinel() {
        assert_eq!(decode_volume(&encode("Waiting...")), None);
        assert_eq!(parse_volume_text("waiting for sensor"), None);
        assert_eq!(parse_volume_text("  WAITING...  "), None);
    }

    #[test]
    fn test_decode_volume_empty_and_garbage() {
        assert_eq!(decode_volume(&encode("")), None);
        assert_eq!(decode_volume(&encode("   ")), None);
        assert_eq!(decode_volume(&encode("garbage text")), None);
    }

    #[test]
    fn test_decode_volume_invalid_transport() {
        // Not base64 at all.
        assert_eq!(decode_volume(b"!!!not-base64!!!"), None);
        // Valid base64 but not UTF-8.
        assert_eq!(decode_volume(BASE64.encode([0xFF, 0xFE]).as_bytes()), None);
    }

    #[test]
    fn test_decode_volume_prefers_unit_suffixed_number() {
        // The "2" in the firmware tag must lose to the suffixed reading.
        assert_eq!(parse_volume_text("v2 Volume: 300.7 mL"), Some(301));
        assert_eq!(parse_volume_text("142.3mL"), Some(142));
    }

    #[test]
    fn test_decode_volume_bare_number_fallback() {
        assert_eq!(parse_volume_text("level 512.2"), Some(512));
        assert_eq!(parse_volume_text(".5"), Some(1));
    }

    #[test]
    fn test_decode_volume_trailing_dot() {
        assert_eq!(parse_volume_text("Volume: 500. mL"), Some(500));
    }

    // --- Battery decoding ---

    #[test]
    fn test_decode_battery_first_byte() {
        assert_eq!(parse_battery_bytes(&[73, 0]), Some(73));
        assert_eq!(decode_battery(BASE64.encode([73, 0]).as_bytes()), Some(73));
    }

    #[test]
    fn test_decode_battery_empty() {
        assert_eq!(parse_battery_bytes(&[]), None);
        assert_eq!(decode_battery(b""), None);
    }

    #[test]
    fn test_decode_battery_clamps_to_100() {
        assert_eq!(parse_battery_bytes(&[250]), Some(100));
    }

    #[test]
    fn test_decode_battery_text() {
        assert_eq!(decode_battery_text(&encode("87%")), Some(87));
        assert_eq!(decode_battery_text(&encode("Battery: 12 %")), Some(12));
        assert_eq!(decode_battery_text(&encode("no reading")), None);
        assert_eq!(decode_battery_text(&encode("450")), None);
    }

    // --- Properties ---

    proptest! {
        #[test]
        fn prop_formatted_volume_round_trips(ml in 0.0f64..10_000.0) {
            let text = format!(" Volume: {ml:.1} mL");
            let rendered: f64 = format!("{ml:.1}").parse().unwrap();
            prop_assert_eq!(
                decode_volume(&encode(&text)),
                Some(rendered.round() as i32)
            );
        }

        #[test]
        fn prop_decode_equals_parse_of_plaintext(text in "\\PC*") {
            prop_assert_eq!(decode_volume(&encode(&text)), parse_volume_text(&text));
        }

        #[test]
        fn prop_decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_volume(&raw);
            let _ = decode_battery(&raw);
            let _ = decode_battery_text(&raw);
        }
    }
}
