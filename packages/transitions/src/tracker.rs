//! Per-aircraft occupancy tracking.
//!
//! Observations are grouped by aircraft, stable-sorted by timestamp, and
//! folded into an [`OccupancyState`]. A change of region between two
//! consecutive observations emits an `EXIT` for the old region and an
//! `ENTRY` for the new one, both at the timestamp of the observation that
//! revealed the change. Elapsed time between reports is ignored.

use std::collections::BTreeMap;

use airspace_models::{EnrichedObservation, RegionId, TransitionEvent, TransitionKind};
use rayon::prelude::*;

/// Last known region and timestamp for one aircraft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyState {
    pub region_id: RegionId,
    pub timestamp: i64,
}

/// Transition events for a batch plus the final occupancy of every
/// aircraft seen.
#[derive(Debug, Clone, Default)]
pub struct TrackingOutcome {
    /// All events, stable-sorted by timestamp then aircraft identifier.
    pub transitions: Vec<TransitionEvent>,
    /// Aircraft identifier -> state after its last observation.
    pub occupancy: BTreeMap<String, OccupancyState>,
}

/// Detects region transitions for every aircraft in `assignments`.
///
/// Input order does not matter except as the tie-break between
/// observations of the same aircraft that share a timestamp.
#[must_use]
pub fn detect_transitions(assignments: &[EnrichedObservation]) -> TrackingOutcome {
    let mut timelines: BTreeMap<&str, Vec<&EnrichedObservation>> = BTreeMap::new();
    for assignment in assignments {
        timelines
            .entry(assignment.observation.icao24.as_str())
            .or_default()
            .push(assignment);
    }

    let tracked: Vec<(String, Option<OccupancyState>, Vec<TransitionEvent>)> = timelines
        .into_par_iter()
        .map(|(icao24, mut timeline)| {
            timeline.sort_by_key(|a| a.observation.timestamp);
            let (state, events) = track_aircraft(&timeline);
            (icao24.to_string(), state, events)
        })
        .collect();

    let mut outcome = TrackingOutcome::default();
    for (icao24, state, events) in tracked {
        outcome.transitions.extend(events);
        if let Some(state) = state {
            outcome.occupancy.insert(icao24, state);
        }
    }

    outcome.transitions.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.icao24.cmp(&b.icao24))
    });

    log::debug!(
        "Tracked {} aircraft, {} transition events",
        outcome.occupancy.len(),
        outcome.transitions.len()
    );

    outcome
}

/// Folds one aircraft's timeline, which must already be sorted by
/// timestamp.
#[must_use]
pub fn track_aircraft(
    timeline: &[&EnrichedObservation],
) -> (Option<OccupancyState>, Vec<TransitionEvent>) {
    timeline
        .iter()
        .fold((None, Vec::new()), |(state, mut events), assignment| {
            let next = advance(state.as_ref(), assignment, &mut events);
            (Some(next), events)
        })
}

/// Applies one observation to the aircraft's state, pushing any events it
/// causes, and returns the new state.
pub fn advance(
    state: Option<&OccupancyState>,
    assignment: &EnrichedObservation,
    events: &mut Vec<TransitionEvent>,
) -> OccupancyState {
    let observation = &assignment.observation;
    let next = OccupancyState {
        region_id: assignment.region_id.clone(),
        timestamp: observation.timestamp,
    };

    let event = |kind, region_id: &RegionId, previous: Option<&RegionId>| TransitionEvent {
        icao24: observation.icao24.clone(),
        callsign: observation.callsign.clone(),
        timestamp: observation.timestamp,
        kind,
        region_id: region_id.clone(),
        previous_region_id: previous.cloned(),
        next_region_id: next.region_id.clone(),
    };

    match state {
        None => {
            events.push(event(TransitionKind::Entry, &next.region_id, None));
        }
        Some(prev) if prev.region_id != next.region_id => {
            events.push(event(
                TransitionKind::Exit,
                &prev.region_id,
                Some(&prev.region_id),
            ));
            events.push(event(
                TransitionKind::Entry,
                &next.region_id,
                Some(&prev.region_id),
            ));
        }
        Some(_) => {}
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use airspace_models::AircraftObservation;

    fn obs(icao24: &str, timestamp: i64, region: &str) -> EnrichedObservation {
        let region_id = if region == "OUTSIDE" {
            RegionId::Outside
        } else {
            RegionId::region(region)
        };
        EnrichedObservation {
            observation: AircraftObservation {
                icao24: icao24.to_string(),
                timestamp,
                latitude: 40.0,
                longitude: -111.0,
                altitude: None,
                velocity: None,
                heading: None,
                callsign: Some(format!("CS{icao24}")),
                origin_country: None,
                on_ground: Some(false),
                vertical_rate: None,
                geo_altitude: None,
                squawk: None,
                last_contact: None,
            },
            region_id,
        }
    }

    fn summary(events: &[TransitionEvent]) -> Vec<(String, i64, TransitionKind, String)> {
        events
            .iter()
            .map(|e| {
                (
                    e.icao24.clone(),
                    e.timestamp,
                    e.kind,
                    e.region_id.to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn region_change_emits_exit_then_entry() {
        let outcome = detect_transitions(&[obs("a", 0, "X"), obs("a", 10, "X"), obs("a", 20, "Y")]);

        assert_eq!(
            summary(&outcome.transitions),
            vec![
                ("a".to_string(), 0, TransitionKind::Entry, "X".to_string()),
                ("a".to_string(), 20, TransitionKind::Exit, "X".to_string()),
                ("a".to_string(), 20, TransitionKind::Entry, "Y".to_string()),
            ]
        );

        let exit = &outcome.transitions[1];
        assert_eq!(exit.previous_region_id, Some(RegionId::region("X")));
        assert_eq!(exit.next_region_id, RegionId::region("Y"));

        let first = &outcome.transitions[0];
        assert_eq!(first.previous_region_id, None);
        assert_eq!(first.callsign.as_deref(), Some("CSa"));
    }

    #[test]
    fn single_outside_report_emits_one_entry() {
        let outcome = detect_transitions(&[obs("b", 5, "OUTSIDE")]);

        assert_eq!(outcome.transitions.len(), 1);
        let event = &outcome.transitions[0];
        assert_eq!(event.kind, TransitionKind::Entry);
        assert_eq!(event.region_id, RegionId::Outside);
        assert_eq!(event.timestamp, 5);
        assert_eq!(
            outcome.occupancy.get("b"),
            Some(&OccupancyState {
                region_id: RegionId::Outside,
                timestamp: 5,
            })
        );
    }

    #[test]
    fn repeated_region_never_emits() {
        let outcome = detect_transitions(&[
            obs("c", 1, "X"),
            obs("c", 2, "X"),
            obs("c", 3, "X"),
            obs("c", 4, "X"),
        ]);
        assert_eq!(outcome.transitions.len(), 1);
    }

    #[test]
    fn long_gap_is_an_ordinary_transition() {
        let outcome = detect_transitions(&[obs("d", 0, "X"), obs("d", 86_400, "Y")]);
        assert_eq!(outcome.transitions.len(), 3);
        assert!(outcome.transitions[1..].iter().all(|e| e.timestamp == 86_400));
    }

    #[test]
    fn entries_exceed_exits_by_one_per_aircraft() {
        let assignments = vec![
            obs("a", 0, "X"),
            obs("a", 1, "Y"),
            obs("a", 2, "OUTSIDE"),
            obs("a", 3, "X"),
            obs("b", 0, "Y"),
            obs("b", 5, "Y"),
            obs("c", 9, "OUTSIDE"),
            obs("c", 10, "Z"),
        ];
        let outcome = detect_transitions(&assignments);

        for icao24 in ["a", "b", "c"] {
            let entries = outcome
                .transitions
                .iter()
                .filter(|e| e.icao24 == icao24 && e.kind == TransitionKind::Entry)
                .count();
            let exits = outcome
                .transitions
                .iter()
                .filter(|e| e.icao24 == icao24 && e.kind == TransitionKind::Exit)
                .count();
            assert_eq!(entries, exits + 1, "aircraft {icao24}");
        }

        // a: 3 changes, b: 0, c: 1.
        assert_eq!(outcome.transitions.len(), (1 + 2 * 3) + 1 + (1 + 2));
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let assignments = vec![
            obs("a", 0, "X"),
            obs("b", 3, "Y"),
            obs("a", 7, "Y"),
            obs("b", 8, "OUTSIDE"),
            obs("a", 12, "Y"),
            obs("c", 7, "X"),
            obs("a", 15, "X"),
        ];
        let expected = detect_transitions(&assignments).transitions;

        let mut reversed = assignments.clone();
        reversed.reverse();
        assert_eq!(detect_transitions(&reversed).transitions, expected);

        let mut rotated = assignments;
        rotated.rotate_left(3);
        assert_eq!(detect_transitions(&rotated).transitions, expected);
    }

    #[test]
    fn output_is_sorted_by_timestamp_then_aircraft() {
        let outcome = detect_transitions(&[
            obs("zz", 1, "X"),
            obs("aa", 1, "Y"),
            obs("mm", 0, "X"),
        ]);
        let keys: Vec<(i64, &str)> = outcome
            .transitions
            .iter()
            .map(|e| (e.timestamp, e.icao24.as_str()))
            .collect();
        assert_eq!(keys, vec![(0, "mm"), (1, "aa"), (1, "zz")]);
    }

    #[test]
    fn duplicate_timestamps_keep_arrival_order() {
        let outcome = detect_transitions(&[obs("e", 0, "X"), obs("e", 5, "Y"), obs("e", 5, "X")]);
        // Y arrived first at t=5, then X: X -> Y -> X.
        assert_eq!(
            summary(&outcome.transitions)
                .into_iter()
                .map(|(_, _, kind, region)| (kind, region))
                .collect::<Vec<_>>(),
            vec![
                (TransitionKind::Entry, "X".to_string()),
                (TransitionKind::Exit, "X".to_string()),
                (TransitionKind::Entry, "Y".to_string()),
                (TransitionKind::Exit, "Y".to_string()),
                (TransitionKind::Entry, "X".to_string()),
            ]
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        let outcome = detect_transitions(&[]);
        assert!(outcome.transitions.is_empty());
        assert!(outcome.occupancy.is_empty());
    }
}
