//! Signal quality conversion and scan-result ranking.
//!
//! RSSI readings are mapped onto a 0..=100 quality percentage for display,
//! and scan results are ordered/filtered before rendering the network list.

use crate::radio::ScanResult;

/// Convert an RSSI reading in dBm to a quality percentage.
///
/// Clamps at -100 dBm (0%) and -50 dBm (100%); linear in between, so
/// -75 dBm is 50%. Total and deterministic.
pub fn rssi_to_quality(rssi_dbm: i16) -> u8 {
    if rssi_dbm <= -100 {
        0
    } else if rssi_dbm >= -50 {
        100
    } else {
        (2 * (rssi_dbm + 100)) as u8
    }
}

/// Rank scan results for rendering.
///
/// Returns indices into `scan`, strongest first (stable: equal RSSI keeps
/// scan order). With `dedupe` set, only the strongest entry of each SSID
/// survives. Entries are kept only when their quality is strictly above
/// `min_quality`; the sentinel `-1` therefore disables filtering, since
/// every quality value beats it.
pub fn rank_networks(scan: &[ScanResult], min_quality: i8, dedupe: bool) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scan.len()).collect();
    indices.sort_by(|&a, &b| scan[b].rssi_dbm.cmp(&scan[a].rssi_dbm));

    if dedupe {
        let mut seen = std::collections::HashSet::new();
        indices.retain(|&i| seen.insert(scan[i].ssid.as_str()));
    }

    indices.retain(|&i| i16::from(rssi_to_quality(scan[i].rssi_dbm)) > i16::from(min_quality));
    indices
}
