//! Per-region entrance/exit rates.
//!
//! Every catalog region gets a [`RegionRate`], including regions with no
//! activity. Counts are raw; rates divide by window hours and region area
//! in square miles, and are `None` whenever either divisor is not positive.

use std::collections::BTreeMap;

use airspace_models::{RateWindow, RegionId, RegionRate, TransitionEvent, TransitionKind};
use airspace_spatial::Region;

/// Counts `ENTRY`/`EXIT` events per region within `window`.
///
/// Events for [`RegionId::Outside`] and for identifiers not present in
/// `regions` are ignored.
#[must_use]
pub fn aggregate(
    transitions: &[TransitionEvent],
    regions: &[Region],
    window: RateWindow,
) -> BTreeMap<String, RegionRate> {
    let mut counts: BTreeMap<&str, (u64, u64)> = regions
        .iter()
        .map(|region| (region.id.as_str(), (0, 0)))
        .collect();

    for event in transitions.iter().filter(|e| window.contains(e.timestamp)) {
        let RegionId::Region(id) = &event.region_id else {
            continue;
        };
        let Some((entrances, exits)) = counts.get_mut(id.as_str()) else {
            log::debug!("Ignoring transition for unknown region {id}");
            continue;
        };
        match event.kind {
            TransitionKind::Entry => *entrances += 1,
            TransitionKind::Exit => *exits += 1,
        }
    }

    let hours = window.hours();

    regions
        .iter()
        .map(|region| {
            let (entrance_count, exit_count) =
                counts.get(region.id.as_str()).copied().unwrap_or_default();
            let event_count = entrance_count + exit_count;
            let area = (!region.is_degenerate()).then_some(region.area_sq_mi);

            let rate = RegionRate {
                region_id: region.id.clone(),
                window,
                entrance_count,
                exit_count,
                event_count,
                entrance_rate: normalize(entrance_count, hours, area),
                exit_rate: normalize(exit_count, hours, area),
                event_rate: normalize(event_count, hours, area),
            };
            (region.id.clone(), rate)
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn normalize(count: u64, hours: f64, area_sq_mi: Option<f64>) -> Option<f64> {
    let area = area_sq_mi?;
    if hours <= 0.0 || !hours.is_finite() {
        return None;
    }
    Some(count as f64 / hours / area)
}
