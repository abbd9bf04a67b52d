//! Bluetooth identifiers for AquaSense bottles.
//!
//! This module contains the UUIDs and advertised names needed to recognize
//! and talk to a bottle sensor over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- AquaSense service and characteristic UUIDs ---

/// Custom volume service advertised by the bottle firmware.
pub const VOLUME_SERVICE: Uuid = uuid!("12345678-1234-1234-1234-1234567890ab");

/// Volume reading characteristic (string-encoded, e.g. `" Volume: 142.3 mL"`).
pub const VOLUME_CHARACTERISTIC: Uuid = uuid!("abcd1234-5678-90ab-cdef-1234567890ab");

/// Vendor battery characteristic carrying a human-readable percent string.
///
/// Optional; not all firmware revisions expose it. Used as a fallback when
/// the standard battery level characteristic is missing.
pub const BATTERY_TEXT_CHARACTERISTIC: Uuid = uuid!("fedcba98-7654-4321-aaaa-bbbbbbbbbbbb");

// --- Standard BLE Service UUIDs ---

/// Battery service (0x180F).
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic (0x2A19).
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

// --- Advertised names ---

/// Names a bottle may advertise under.
///
/// Production units advertise as "AquaSense…"; prototype firmware built on
/// stock ESP32 boards still advertises as "Arduino". Matching is a
/// case-insensitive substring check, see [`is_bottle_name`].
pub const BOTTLE_NAMES: &[&str] = &["AquaSense", "Arduino"];

/// Check whether an advertised local name looks like a bottle.
///
/// # Examples
///
/// ```
/// use aquasync_types::ble::is_bottle_name;
///
/// assert!(is_bottle_name("AquaSense-2"));
/// assert!(is_bottle_name("arduino nano"));
/// assert!(!is_bottle_name("Mi Smart Band 5"));
/// ```
pub fn is_bottle_name(name: &str) -> bool {
    name_matches_any(name, BOTTLE_NAMES.iter().copied())
}

/// Check an advertised name against a caller-supplied allow-list.
///
/// Case-insensitive substring match; entries are trimmed first.
pub fn name_matches_any<'a>(name: &str, allowed: impl IntoIterator<Item = &'a str>) -> bool {
    let name_lower = name.to_lowercase();
    allowed
        .into_iter()
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .any(|candidate| name_lower.contains(&candidate.to_lowercase()))
}

/// Check whether an advertised service UUID is the bottle's volume service.
///
/// `Uuid` equality already canonicalizes case, so a textual advertised
/// identifier should be parsed (trimmed) before comparison; see
/// [`service_str_matches`].
pub fn is_volume_service(service: &Uuid) -> bool {
    *service == VOLUME_SERVICE
}

/// Compare a textual service identifier against the volume service.
///
/// Tolerates surrounding whitespace and any hex casing, which some
/// platforms introduce when relaying advertisement data.
pub fn service_str_matches(service: &str) -> bool {
    Uuid::parse_str(service.trim())
        .map(|uuid| uuid == VOLUME_SERVICE)
        .unwrap_or(false)
}
