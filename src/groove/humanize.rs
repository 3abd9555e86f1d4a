// Humanization - Timing jitter, articulation, drift, chord rolls and tempo sway
// Turns quantized note timing into a played-sounding rendition

use std::collections::HashSet;
use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arranger::sections::{MusicalSection, Pace};
use crate::notes::{time_groups, Hand, NoteId, NoteStore, DEFAULT_GROUP_THRESHOLD};

/// Shortest duration a note may be shortened to (30ms)
pub const MIN_NOTE_DURATION: f64 = 0.03;

/// Onset stagger between adjacent notes of a rolled chord (6ms)
pub const CHORD_ROLL_STEP: f64 = 0.006;

/// Upper bound of the random articulation reduction
pub const ARTICULATION_JITTER: f64 = 0.1;

/// Sections shorter than this (seconds) are not swayed
pub const MIN_SWAY_SECTION: f64 = 1.0;

#[derive(Debug, Error)]
pub enum HumanizeError {
    #[error("Timing variance must be finite and non-negative, got {0}")]
    InvalidTimingVariance(f64),
}

/// Settings for every humanization pass; each effect toggles independently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanizeSettings {
    /// Add Gaussian jitter to each onset group
    pub vary_timing: bool,

    /// Standard deviation of the jitter in seconds (clamped to 3 sigma)
    pub timing_variance: f64,

    /// Randomly shorten each group's articulation by up to 0.1
    pub vary_articulation: bool,

    /// Baseline duration ratio [0.0, 1.0]
    /// 1.0 = full written length, 0.5 = half length
    pub articulation: f64,

    /// Accumulate jitter as per-hand drift, decayed at resync points
    pub enable_drift_correction: bool,

    /// Drift multiplier applied at each resync point [0.0, 1.0]
    pub drift_decay_factor: f64,

    /// Stagger chord notes bottom to top
    pub enable_chord_roll: bool,

    /// Bend onsets inside each section along a sine bell
    pub enable_tempo_sway: bool,

    /// Peak sway displacement in seconds
    pub tempo_sway_intensity: f64,

    /// Sway fast sections more than slow ones instead of less
    pub invert_tempo_sway: bool,
}

impl Default for HumanizeSettings {
    fn default() -> Self {
        HumanizeSettings {
            vary_timing: false,
            timing_variance: 0.010,
            vary_articulation: false,
            articulation: 0.95,
            enable_drift_correction: false,
            drift_decay_factor: 0.25,
            enable_chord_roll: false,
            enable_tempo_sway: false,
            tempo_sway_intensity: 0.015,
            invert_tempo_sway: false,
        }
    }
}

impl HumanizeSettings {
    /// Whether the per-hand pass has anything to do
    pub fn affects_hands(&self) -> bool {
        self.vary_timing
            || self.vary_articulation
            || self.enable_drift_correction
            || self.enable_chord_roll
    }

    /// Sway multiplier for a section's pace
    pub fn pace_multiplier(&self, pace: Pace) -> f64 {
        match (pace, self.invert_tempo_sway) {
            (Pace::Fast, false) | (Pace::Slow, true) => 0.25,
            (Pace::Slow, false) | (Pace::Fast, true) => 1.5,
            (Pace::Normal, _) => 1.0,
        }
    }
}

/// Timestamps at which accumulated drift is decayed.
/// Stored at centisecond resolution so onsets are matched after rounding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncPoints {
    centiseconds: HashSet<i64>,
}

impl ResyncPoints {
    pub fn new() -> Self {
        ResyncPoints::default()
    }

    pub fn from_times(times: impl IntoIterator<Item = f64>) -> Self {
        let mut points = ResyncPoints::new();
        for time in times {
            points.insert(time);
        }
        points
    }

    /// One resync point at the start of every section
    pub fn from_sections(sections: &[MusicalSection]) -> Self {
        ResyncPoints::from_times(sections.iter().map(|s| s.start_time))
    }

    pub fn insert(&mut self, time: f64) {
        self.centiseconds.insert(to_centiseconds(time));
    }

    /// Whether `time`, rounded to two decimals, is a resync point
    pub fn contains(&self, time: f64) -> bool {
        self.centiseconds.contains(&to_centiseconds(time))
    }

    pub fn len(&self) -> usize {
        self.centiseconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centiseconds.is_empty()
    }
}

fn to_centiseconds(time: f64) -> i64 {
    (time * 100.0).round() as i64
}

/// Accumulated timing lag of each hand, in seconds.
/// Lives for one playback run; call [`HandDrift::reset`] between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HandDrift {
    pub left: f64,
    pub right: f64,
}

impl HandDrift {
    /// Drift of `hand`; unassigned notes share the right hand's slot
    pub fn get(&self, hand: Hand) -> f64 {
        match hand {
            Hand::Left => self.left,
            Hand::Right | Hand::Unknown => self.right,
        }
    }

    fn slot_mut(&mut self, hand: Hand) -> &mut f64 {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right | Hand::Unknown => &mut self.right,
        }
    }

    pub fn accumulate(&mut self, hand: Hand, offset: f64) {
        *self.slot_mut(hand) += offset;
    }

    pub fn decay(&mut self, hand: Hand, factor: f64) {
        *self.slot_mut(hand) *= factor;
    }

    pub fn reset(&mut self) {
        *self = HandDrift::default();
    }
}

/// Applies the randomized humanization passes.
///
/// Both passes move onsets destructively and compound if repeated; run each
/// once per performance.
#[derive(Debug, Clone)]
pub struct Humanizer {
    settings: HumanizeSettings,
    jitter: Normal<f64>,
}

impl Humanizer {
    pub fn new(settings: HumanizeSettings) -> Result<Self, HumanizeError> {
        let sigma = settings.timing_variance;
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(HumanizeError::InvalidTimingVariance(sigma));
        }
        let jitter =
            Normal::new(0.0, sigma).map_err(|_| HumanizeError::InvalidTimingVariance(sigma))?;

        Ok(Humanizer { settings, jitter })
    }

    /// Humanize one hand's notes (`ids` in start-time order), group by group.
    ///
    /// Per group: decay drift at resync points, draw one timing offset and one
    /// articulation ratio, roll chords, then shift every note by the offset
    /// plus the hand's drift so far and rescale its duration.
    pub fn apply_to_hand<R: Rng + ?Sized>(
        &self,
        store: &mut NoteStore,
        ids: &[NoteId],
        hand: Hand,
        resync_points: &ResyncPoints,
        drift: &mut HandDrift,
        rng: &mut R,
    ) {
        let settings = &self.settings;
        if !settings.affects_hands() {
            return;
        }

        let groups = time_groups(store, ids, DEFAULT_GROUP_THRESHOLD);
        log::debug!("Humanizing {} {} groups", groups.len(), hand.to_string());

        for mut group in groups {
            let group_start = match group.first().and_then(|id| store.get(*id)) {
                Some(note) => note.start_time,
                None => continue,
            };

            if settings.enable_drift_correction && resync_points.contains(group_start) {
                drift.decay(hand, settings.drift_decay_factor);
            }

            let timing_offset = if settings.vary_timing {
                let limit = 3.0 * settings.timing_variance;
                self.jitter.sample(rng).clamp(-limit, limit)
            } else {
                0.0
            };

            let mut articulation = settings.articulation;
            if settings.vary_articulation {
                articulation -= rng.random::<f64>() * ARTICULATION_JITTER;
            }

            if settings.enable_chord_roll && group.len() > 1 {
                group.sort_by_key(|id| store.get(*id).map(|n| n.pitch));
                for (i, id) in group.iter().enumerate() {
                    if let Some(note) = store.get_mut(*id) {
                        note.start_time += i as f64 * CHORD_ROLL_STEP;
                    }
                }
            }

            let current_drift = drift.get(hand);
            for id in &group {
                let Some(note) = store.get_mut(*id) else {
                    continue;
                };

                note.start_time += timing_offset;
                if settings.enable_drift_correction {
                    note.start_time += current_drift;
                }

                note.duration *= articulation;
                if note.duration < MIN_NOTE_DURATION {
                    note.duration = MIN_NOTE_DURATION;
                }
            }

            if settings.enable_drift_correction {
                drift.accumulate(hand, timing_offset);
            }
        }
    }

    /// Pull onsets earlier along a sine bell spanning each section.
    ///
    /// Zero displacement at a section's edges, full `tempo_sway_intensity`
    /// (scaled by pace) at its midpoint. Durations are left alone.
    pub fn apply_tempo_rubato(&self, store: &mut NoteStore, sections: &[MusicalSection]) {
        let settings = &self.settings;
        if !settings.enable_tempo_sway {
            return;
        }

        for section in sections {
            let section_duration = section.duration();
            if section_duration < MIN_SWAY_SECTION || section.duration_beats() <= 0.0 {
                continue;
            }

            let intensity = settings.tempo_sway_intensity * settings.pace_multiplier(section.pace);
            for id in &section.notes {
                let Some(note) = store.get_mut(*id) else {
                    continue;
                };
                let position = (note.start_time - section.start_time) / section_duration;
                note.start_time -= (position * PI).sin() * intensity;
            }
        }
    }
}
