//! Config-to-device matching
//!
//! Scores every config section against a device's identification attributes
//! and picks the best fit. A section that names no identification options
//! matches every device with score 0; each exactly-matching attribute adds
//! one point; any mismatch disqualifies the section outright. This lets a
//! config carry one broad catch-all section and narrower per-device
//! overrides without explicit priority syntax - the narrow section simply
//! scores higher on its device.

use tracing::trace;

use crate::config::DeviceConfig;
use crate::device::{DeviceAttributes, IdKey};

/// Sentinel score for a disqualified candidate
pub const REJECTED: i32 = -1;

/// Score one candidate section against a device's attributes
///
/// Walks every recognized identification key present on the device. A key
/// the candidate does not constrain contributes nothing; a constrained key
/// must match the device's value exactly or the candidate is rejected.
pub fn match_score(attributes: &DeviceAttributes, candidate: &DeviceConfig) -> i32 {
    let mut score = 0;

    for key in IdKey::ALL {
        let Some(wanted) = candidate.id_value(key) else {
            continue;
        };

        if attributes.id_value(key) != Some(wanted) {
            trace!(
                section = %candidate.name,
                key = key.name(),
                "Candidate rejected on mismatch"
            );
            return REJECTED;
        }

        score += 1;
    }

    score
}

/// Pick the best-matching section for a device, with its score
///
/// The strictly highest nonnegative score wins; on an exact tie the
/// earliest candidate in config order is kept (candidate iteration is the
/// config file's section order). Returns `None` when every candidate is
/// rejected - the device is simply unmanaged.
pub fn best_match<'a>(
    attributes: &DeviceAttributes,
    candidates: &'a [DeviceConfig],
) -> Option<(&'a DeviceConfig, i32)> {
    let mut best: Option<(&DeviceConfig, i32)> = None;

    for candidate in candidates {
        let score = match_score(attributes, candidate);
        // Strict '>' keeps the first-seen candidate on ties
        if score > best.map_or(REJECTED, |(_, s)| s) {
            best = Some((candidate, score));
        }
    }

    best
}
