// Sustain Pedal - Synthesizes pedal down/up events from the final notes
// Gap- and interval-driven heuristics, one strategy per pedal style

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::sections::MusicalSection;
use crate::notes::{time_groups, Hand, Note, NoteStore, DEFAULT_GROUP_THRESHOLD};

/// Silence in the driver voice that always lifts the pedal (hybrid style)
pub const DRIVER_GAP_RELEASE: f64 = 0.35;

/// Delay before re-pressing after a dissonant change (hybrid style)
pub const PEDAL_LAG: f64 = 0.05;

/// Silence between bass notes that lifts the pedal (harmonic style)
pub const HARMONIC_GAP_RELEASE: f64 = 0.15;

/// Intervals (mod 12) that ring well together: unison/octave, thirds, fourth, fifth
const CONSONANT_INTERVALS: [u8; 5] = [0, 3, 4, 5, 7];

/// Intervals (mod 12) that clash: minor second, tritone
const DISSONANT_INTERVALS: [u8; 2] = [1, 6];

/// Pedaling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum PedalStyle {
    /// No pedal at all
    None,

    /// One driver voice, re-pedaled on silences and dissonant steps
    #[default]
    Hybrid,

    /// Re-pedal on every bass onset
    Rhythmic,

    /// Re-pedal when the bass note changes
    Harmonic,
}

impl PedalStyle {
    /// Convert from string representation; anything unrecognized is harmonic
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => PedalStyle::None,
            "hybrid" => PedalStyle::Hybrid,
            "rhythmic" => PedalStyle::Rhythmic,
            _ => PedalStyle::Harmonic,
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            PedalStyle::None => "none",
            PedalStyle::Hybrid => "hybrid",
            PedalStyle::Rhythmic => "rhythmic",
            PedalStyle::Harmonic => "harmonic",
        }
    }
}

impl From<String> for PedalStyle {
    fn from(s: String) -> Self {
        PedalStyle::from_string(&s)
    }
}

/// What the pedal does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PedalAction {
    Engage,
    Disengage,
}

impl PedalAction {
    /// Sort key among events at the same instant: releases before presses
    pub fn priority(&self) -> u8 {
        match self {
            PedalAction::Disengage => 0,
            PedalAction::Engage => 1,
        }
    }
}

/// A timed pedal event for the playback scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// When to act, in seconds
    pub time: f64,

    /// Tie-break at equal times; lower goes first
    pub priority: u8,

    /// Press or release
    pub action: PedalAction,

    /// Pitch of the note that triggered a press, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,

    /// Velocity of the note that triggered a press, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
}

impl KeyEvent {
    /// Pedal down, optionally tagged with the note that caused it
    pub fn engage(time: f64, note: Option<&Note>) -> Self {
        KeyEvent {
            time,
            priority: PedalAction::Engage.priority(),
            action: PedalAction::Engage,
            pitch: note.map(|n| n.pitch),
            velocity: note.map(|n| n.velocity),
        }
    }

    /// Pedal up
    pub fn disengage(time: f64) -> Self {
        KeyEvent {
            time,
            priority: PedalAction::Disengage.priority(),
            action: PedalAction::Disengage,
            pitch: None,
            velocity: None,
        }
    }

    /// Ordering by (time, priority)
    pub fn schedule_cmp(&self, other: &KeyEvent) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.priority.cmp(&other.priority))
    }
}

/// Builds the pedal track for a performance
pub struct PedalGenerator;

impl PedalGenerator {
    /// Generate pedal events, sorted by (time, priority).
    ///
    /// Hybrid ignores sections and drives the pedal from the left hand (or the
    /// right hand when there is no left hand). The other styles work section by
    /// section from the left-hand notes; a section without any gets one press
    /// spanning all of its notes.
    pub fn generate_events(
        style: PedalStyle,
        store: &NoteStore,
        sections: &[MusicalSection],
    ) -> Vec<KeyEvent> {
        let mut events = match style {
            PedalStyle::None => return Vec::new(),
            PedalStyle::Hybrid => {
                let mut driver = hand_notes(store.iter(), Hand::Left);
                if driver.is_empty() {
                    driver = hand_notes(store.iter(), Hand::Right);
                }
                adaptive_driver(&driver)
            }
            PedalStyle::Rhythmic | PedalStyle::Harmonic => {
                let mut events = Vec::new();
                for section in sections {
                    section_events(style, store, section, &mut events);
                }
                events
            }
        };

        events.sort_by(KeyEvent::schedule_cmp);
        log::debug!(
            "Generated {} pedal events ({})",
            events.len(),
            style.to_string()
        );
        events
    }
}

fn section_events(
    style: PedalStyle,
    store: &NoteStore,
    section: &MusicalSection,
    events: &mut Vec<KeyEvent>,
) {
    let section_notes = section.notes.iter().filter_map(|id| store.get(*id));
    let bass = hand_notes(section_notes, Hand::Left);

    if bass.is_empty() {
        let first = section.notes.first().and_then(|id| store.get(*id));
        if let (Some(first), Some(end)) = (first, store.max_end(&section.notes)) {
            events.push(KeyEvent::engage(first.start_time, Some(first)));
            events.push(KeyEvent::disengage(end));
        }
        return;
    }

    if style == PedalStyle::Rhythmic {
        let ids: Vec<_> = bass.iter().map(|n| n.id).collect();
        for group in time_groups(store, &ids, DEFAULT_GROUP_THRESHOLD) {
            let first = group.first().and_then(|id| store.get(*id));
            if let (Some(first), Some(end)) = (first, store.max_end(&group)) {
                events.push(KeyEvent::engage(first.start_time, Some(first)));
                events.push(KeyEvent::disengage(end));
            }
        }
    } else {
        harmonic_pedal(&bass, events);
    }
}

/// Notes of `hand` among `notes`, sorted by start time
fn hand_notes<'a>(notes: impl Iterator<Item = &'a Note>, hand: Hand) -> Vec<&'a Note> {
    let mut selected: Vec<&Note> = notes.filter(|n| n.hand == hand).collect();
    selected.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    selected
}

fn max_end(notes: &[&Note]) -> Option<f64> {
    notes.iter().map(|n| n.end_time()).reduce(f64::max)
}

/// Hybrid-style pedaling over a single voice.
///
/// Silences longer than [`DRIVER_GAP_RELEASE`] lift the pedal for their
/// duration. Otherwise the step to the next note decides: consonant steps
/// ring through, dissonant ones re-pedal [`PEDAL_LAG`] after the new onset.
fn adaptive_driver(driver: &[&Note]) -> Vec<KeyEvent> {
    let mut events = Vec::new();
    let Some(first) = driver.first() else {
        return events;
    };

    events.push(KeyEvent::engage(first.start_time, Some(first)));

    for pair in driver.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        let gap = next.start_time - current.end_time();

        if gap > DRIVER_GAP_RELEASE {
            events.push(KeyEvent::disengage(current.end_time()));
            events.push(KeyEvent::engage(next.start_time, Some(next)));
            continue;
        }

        let interval = (next.pitch as i16 - current.pitch as i16).unsigned_abs() % 12;
        let interval = interval as u8;
        if CONSONANT_INTERVALS.contains(&interval) {
            continue;
        }
        if DISSONANT_INTERVALS.contains(&interval) {
            events.push(KeyEvent::disengage(next.start_time));
            events.push(KeyEvent::engage(next.start_time + PEDAL_LAG, Some(next)));
        }
    }

    if let Some(end) = max_end(driver) {
        events.push(KeyEvent::disengage(end));
    }
    events
}

/// Harmonic-style pedaling over a section's bass line.
///
/// A silence longer than [`HARMONIC_GAP_RELEASE`] lifts the pedal at the
/// previous release; a new bass pitch re-pedals at its own onset (release and
/// press share the timestamp); a repeated pitch rides through.
fn harmonic_pedal(bass: &[&Note], events: &mut Vec<KeyEvent>) {
    let mut bass_pitch: Option<u8> = None;

    for (i, note) in bass.iter().enumerate() {
        if i == 0 {
            events.push(KeyEvent::engage(note.start_time, Some(note)));
        } else {
            let previous_end = bass[i - 1].end_time();
            if note.start_time - previous_end > HARMONIC_GAP_RELEASE {
                events.push(KeyEvent::disengage(previous_end));
                events.push(KeyEvent::engage(note.start_time, Some(note)));
            } else if bass_pitch != Some(note.pitch) {
                events.push(KeyEvent::disengage(note.start_time));
                events.push(KeyEvent::engage(note.start_time, Some(note)));
            }
        }
        bass_pitch = Some(note.pitch);
    }

    if let Some(end) = max_end(bass) {
        events.push(KeyEvent::disengage(end));
    }
}
