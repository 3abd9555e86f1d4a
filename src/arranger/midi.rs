// MIDI Import - Read Standard MIDI Files into timed notes using midly crate
// Produces per-track note lists plus the piece's tempo map

use std::collections::{HashMap, VecDeque};

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::groove::grid::TimeSignature;
use crate::groove::tempo::{TempoEvent, TempoMap, DEFAULT_TEMPO_US};
use crate::notes::{Hand, Note, NoteId, NoteStore};

/// Notes this short or shorter are dropped on import (seconds)
pub const MIN_IMPORT_DURATION: f64 = 0.01;

/// General MIDI percussion channel (channel 10, zero-based)
pub const DRUM_CHANNEL: u8 = 9;

/// Sustain pedal controller number
const SUSTAIN_CONTROLLER: u8 = 64;

#[derive(Debug, Error)]
pub enum MidiImportError {
    #[error("Failed to parse MIDI: {0}")]
    ParseError(#[from] midly::Error),

    #[error("Unsupported timing: SMPTE timecode files are not supported")]
    UnsupportedTiming,

    #[error("Invalid tempo scale: {0}")]
    InvalidTempoScale(f64),

    #[error("Track {0} does not exist")]
    UnknownTrack(usize),
}

/// One track of the source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiTrack {
    /// Position in the file's track list
    pub index: usize,

    /// Track name meta event, or "Track N"
    pub name: String,

    /// Last program change seen (0 if none)
    pub program: u8,

    /// Percussion track (program change or notes on channel 10)
    pub is_drum: bool,

    /// Notes sorted by start time
    pub notes: Vec<Note>,

    /// Sustain pedal controller values as (time, value)
    pub pedal_events: Vec<(f64, u8)>,
}

impl MidiTrack {
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// General MIDI instrument family
    pub fn instrument_name(&self) -> String {
        if self.is_drum {
            return "Drums/Percussion".to_string();
        }
        match self.program {
            0..=7 => "Piano".to_string(),
            8..=15 => "Chromatic Perc".to_string(),
            16..=23 => "Organ".to_string(),
            24..=31 => "Guitar".to_string(),
            32..=39 => "Bass".to_string(),
            40..=47 => "Strings".to_string(),
            48..=55 => "Ensemble".to_string(),
            other => format!("Instrument {}", other),
        }
    }
}

/// Which hand plays a selected track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackRole {
    /// Hands decided later from pitch
    #[default]
    Auto,
    Left,
    Right,
}

impl TrackRole {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(TrackRole::Auto),
            "left" | "l" => Some(TrackRole::Left),
            "right" | "r" => Some(TrackRole::Right),
            _ => None,
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            TrackRole::Auto => "auto",
            TrackRole::Left => "left",
            TrackRole::Right => "right",
        }
    }

    fn hand(&self) -> Hand {
        match self {
            TrackRole::Auto => Hand::Unknown,
            TrackRole::Left => Hand::Left,
            TrackRole::Right => Hand::Right,
        }
    }
}

/// A track picked for performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSelection {
    pub index: usize,
    pub role: TrackRole,
}

impl TrackSelection {
    pub fn new(index: usize, role: TrackRole) -> Self {
        TrackSelection { index, role }
    }
}

/// Parsed file: tracks that contain notes, plus the global tempo map
#[derive(Debug, Clone)]
pub struct MidiScore {
    pub tracks: Vec<MidiTrack>,
    pub tempo_map: TempoMap,
}

impl MidiScore {
    /// Every non-drum track with automatic hands
    pub fn default_selection(&self) -> Vec<TrackSelection> {
        self.tracks
            .iter()
            .filter(|t| !t.is_drum)
            .map(|t| TrackSelection::new(t.index, TrackRole::Auto))
            .collect()
    }

    pub fn track(&self, index: usize) -> Option<&MidiTrack> {
        self.tracks.iter().find(|t| t.index == index)
    }

    /// Flatten the selected tracks into one store.
    /// Left/Right roles force the hand of every note in the track.
    pub fn into_note_store(&self, selection: &[TrackSelection]) -> Result<NoteStore, MidiImportError> {
        let mut notes = Vec::new();

        for selected in selection {
            let track = self
                .track(selected.index)
                .ok_or(MidiImportError::UnknownTrack(selected.index))?;
            let hand = selected.role.hand();

            notes.extend(track.notes.iter().cloned().map(|mut note| {
                if hand != Hand::Unknown {
                    note.hand = hand;
                }
                note
            }));
        }

        Ok(NoteStore::new(notes))
    }
}

/// Absolute tick -> seconds, from tempo changes on every track
struct GlobalTickMap {
    ticks_per_beat: f64,
    /// (tick, seconds, microseconds per quarter)
    entries: Vec<(u64, f64, u32)>,
}

impl GlobalTickMap {
    fn new(ticks_per_beat: u16, mut tempo_changes: Vec<(u64, u32)>) -> Self {
        // Stable: same-tick changes keep file order, the last one wins
        tempo_changes.sort_by_key(|(tick, _)| *tick);

        let ticks_per_beat = if ticks_per_beat == 0 { 480.0 } else { ticks_per_beat as f64 };
        let mut entries = vec![(0, 0.0, DEFAULT_TEMPO_US)];

        for (tick, tempo) in tempo_changes {
            let (last_tick, last_time, last_tempo) = entries[entries.len() - 1];
            let time = last_time + ticks_to_seconds(tick - last_tick, ticks_per_beat, last_tempo);
            entries.push((tick, time, tempo));
        }

        GlobalTickMap {
            ticks_per_beat,
            entries,
        }
    }

    fn tick_to_time(&self, tick: u64) -> f64 {
        let idx = self.entries.partition_point(|(t, _, _)| *t <= tick);
        let (entry_tick, entry_time, tempo) = self.entries[idx.saturating_sub(1)];
        entry_time + ticks_to_seconds(tick - entry_tick, self.ticks_per_beat, tempo)
    }

    /// File-declared tempo changes (the implicit 120 BPM start excluded)
    fn tempo_events(&self) -> impl Iterator<Item = (f64, u32)> + '_ {
        self.entries.iter().skip(1).map(|(_, time, tempo)| (*time, *tempo))
    }
}

fn ticks_to_seconds(ticks: u64, ticks_per_beat: f64, us_per_quarter: u32) -> f64 {
    ticks as f64 * us_per_quarter as f64 / 1_000_000.0 / ticks_per_beat
}

/// Parse a Standard MIDI File.
///
/// `tempo_scale` speeds playback up (>1) or down (<1): every time and every
/// tempo value is divided by it, so the tempo map stays aligned with the notes.
/// Tracks without notes are left out.
pub fn parse_midi(data: &[u8], tempo_scale: f64) -> Result<MidiScore, MidiImportError> {
    if !tempo_scale.is_finite() || tempo_scale <= 0.0 {
        return Err(MidiImportError::InvalidTempoScale(tempo_scale));
    }

    let smf = Smf::parse(data)?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => return Err(MidiImportError::UnsupportedTiming),
    };

    // First pass: global tempo and meter
    let mut tempo_changes = Vec::new();
    let mut signature_ticks = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push((tick, tempo.as_int()));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, power, _, _)) => {
                    match 1u8.checked_shl(power as u32) {
                        Some(denominator) if numerator > 0 => {
                            signature_ticks.push((tick, numerator, denominator));
                        }
                        _ => log::warn!("Ignoring time signature {}/2^{} at tick {}", numerator, power, tick),
                    }
                }
                _ => {}
            }
        }
    }

    let tick_map = GlobalTickMap::new(ticks_per_beat, tempo_changes);

    let tempo_events = tick_map
        .tempo_events()
        .map(|(time, tempo)| TempoEvent::new(time, tempo).scaled(tempo_scale))
        .collect();
    signature_ticks.sort_by_key(|(tick, _, _)| *tick);
    let time_signatures = signature_ticks
        .into_iter()
        .map(|(tick, numerator, denominator)| {
            TimeSignature::new(tick_map.tick_to_time(tick) / tempo_scale, numerator, denominator)
        })
        .collect();
    let tempo_map = TempoMap::new(tempo_events, time_signatures);

    // Second pass: notes
    let mut tracks = Vec::new();
    let mut next_id = 0usize;

    for (index, track) in smf.tracks.iter().enumerate() {
        let mut name = format!("Track {}", index);
        let mut program = 0u8;
        let mut is_drum = false;
        let mut notes = Vec::new();
        let mut pedal_events = Vec::new();
        let mut open: HashMap<u8, VecDeque<(u64, u8)>> = HashMap::new();
        let mut tick = 0u64;

        for event in track {
            tick += event.delta.as_int() as u64;

            let (channel, message) = match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    name = String::from_utf8_lossy(raw).into_owned();
                    continue;
                }
                TrackEventKind::Midi { channel, message } => (channel.as_int(), message),
                _ => continue,
            };

            match message {
                MidiMessage::ProgramChange { program: p } => {
                    program = p.as_int();
                    if channel == DRUM_CHANNEL {
                        is_drum = true;
                    }
                }
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.entry(key.as_int()).or_default().push_back((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let pitch = key.as_int();
                    let Some((on_tick, velocity)) = open.get_mut(&pitch).and_then(|q| q.pop_front()) else {
                        continue;
                    };

                    let start = tick_map.tick_to_time(on_tick);
                    let duration = tick_map.tick_to_time(tick) - start;
                    if duration <= MIN_IMPORT_DURATION {
                        continue;
                    }

                    let mut note = Note::new(pitch, velocity, start / tempo_scale, duration / tempo_scale);
                    note.id = NoteId(next_id);
                    note.track_index = Some(index);
                    note.channel = Some(channel);
                    notes.push(note);
                    next_id += 1;
                }
                MidiMessage::Controller { controller, value } if controller.as_int() == SUSTAIN_CONTROLLER => {
                    let time = tick_map.tick_to_time(tick) / tempo_scale;
                    pedal_events.push((time, value.as_int()));
                }
                _ => {}
            }
        }

        if notes.iter().any(|n: &Note| n.channel == Some(DRUM_CHANNEL)) {
            is_drum = true;
        }
        if notes.is_empty() {
            continue;
        }

        notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        tracks.push(MidiTrack {
            index,
            name,
            program,
            is_drum,
            notes,
            pedal_events,
        });
    }

    log::info!(
        "Parsed MIDI: {} tracks with notes, {} notes, {} tempo changes",
        tracks.len(),
        next_id,
        tempo_map.tempo_events().len()
    );
    for event in tempo_map.tempo_events() {
        log::debug!("Tempo {:.1} BPM at {:.3}s", event.bpm(), event.time);
    }

    Ok(MidiScore { tracks, tempo_map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u24, u28, u4, u7};
    use midly::{Format, Header, Track, TrackEvent};

    fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Meta(message),
        }
    }

    fn midi(delta: u32, channel: u8, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message,
            },
        }
    }

    fn on(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
        midi(delta, channel, MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) })
    }

    fn off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
        midi(delta, channel, MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(0) })
    }

    fn end() -> TrackEvent<'static> {
        meta(0, MetaMessage::EndOfTrack)
    }

    fn encode(tracks: Vec<Track<'static>>) -> Vec<u8> {
        let smf = Smf {
            header: Header::new(Format::Parallel, Timing::Metrical(u15::new(480))),
            tracks,
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();
        bytes
    }

    /// Conductor track at 120 BPM switching to 60 BPM at beat 4, in 3/4
    fn conductor() -> Track<'static> {
        vec![
            meta(0, MetaMessage::TrackName(b"Conductor")),
            meta(0, MetaMessage::Tempo(u24::new(500_000))),
            meta(0, MetaMessage::TimeSignature(3, 2, 24, 8)),
            meta(1920, MetaMessage::Tempo(u24::new(1_000_000))),
            end(),
        ]
    }

    #[test]
    fn test_parse_notes_across_tempo_change() {
        let piano = vec![
            meta(0, MetaMessage::TrackName(b"Piano")),
            on(0, 0, 60, 90),
            off(480, 0, 60),
            // Beat 4 (2.0s) for one beat at 60 BPM
            on(1440, 0, 64, 70),
            off(480, 0, 64),
            end(),
        ];

        let score = parse_midi(&encode(vec![conductor(), piano]), 1.0).unwrap();

        // The conductor has no notes and is left out
        assert_eq!(score.tracks.len(), 1);
        let track = &score.tracks[0];
        assert_eq!(track.index, 1);
        assert_eq!(track.name, "Piano");
        assert_eq!(track.instrument_name(), "Piano");

        let notes = &track.notes;
        assert_eq!(notes.len(), 2);
        assert!((notes[0].start_time - 0.0).abs() < 1e-9);
        assert!((notes[0].duration - 0.5).abs() < 1e-9);
        assert!((notes[1].start_time - 2.0).abs() < 1e-9);
        assert!((notes[1].duration - 1.0).abs() < 1e-9);
        assert_eq!(notes[1].velocity, 70);
        assert_eq!(notes[1].track_index, Some(1));
        assert_eq!(notes[1].channel, Some(0));

        let map = &score.tempo_map;
        assert!(map.has_explicit_time_signatures());
        assert_eq!(map.time_signatures()[0].numerator, 3);
        assert_eq!(map.time_signatures()[0].denominator, 4);
        assert_eq!(map.get_tempo_at(2.5), 1_000_000);
        assert!((map.time_to_beat(3.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_scale_divides_times_and_tempo() {
        let piano = vec![on(0, 0, 60, 90), off(1920, 0, 60), on(0, 0, 62, 90), off(960, 0, 62), end()];

        let score = parse_midi(&encode(vec![conductor(), piano]), 2.0).unwrap();

        let notes = &score.tracks[0].notes;
        assert!((notes[0].duration - 1.0).abs() < 1e-9);
        assert!((notes[1].start_time - 1.0).abs() < 1e-9);
        assert!((notes[1].duration - 1.0).abs() < 1e-9);

        // Beat positions are unchanged by the speed-up
        let map = &score.tempo_map;
        assert!((map.time_to_beat(notes[1].start_time) - 4.0).abs() < 1e-9);
        assert!((map.time_to_beat(notes[1].end_time()) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_uneven_tempo_scale_keeps_bar_lines() {
        let conductor = vec![
            meta(0, MetaMessage::Tempo(u24::new(500_000))),
            meta(0, MetaMessage::TimeSignature(3, 2, 24, 8)),
            end(),
        ];
        // Downbeat of bar 101 (beat 300)
        let piano = vec![on(300 * 480, 0, 60, 90), off(480, 0, 60), end()];

        let score = parse_midi(&encode(vec![conductor, piano]), 3.0).unwrap();

        let note = &score.tracks[0].notes[0];
        let map = &score.tempo_map;
        assert!((note.start_time - 50.0).abs() < 1e-9);
        assert!((map.time_to_beat(note.start_time) - 300.0).abs() < 1e-9);

        let measures = map.get_measure_boundaries(note.end_time());
        let bar = measures.iter().position(|m| m.contains(note.start_time));
        assert_eq!(bar, Some(100));
        assert!((measures[100].start_time - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlapping_same_pitch_pairs_fifo() {
        let piano = vec![
            on(0, 0, 60, 100),
            on(240, 0, 60, 50),
            off(240, 0, 60),
            // Note-on with velocity zero closes too
            on(480, 0, 60, 0),
            end(),
        ];

        let score = parse_midi(&encode(vec![piano]), 1.0).unwrap();

        let notes = &score.tracks[0].notes;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].velocity, 100);
        assert!((notes[0].duration - 0.5).abs() < 1e-9);
        assert_eq!(notes[1].velocity, 50);
        assert!((notes[1].duration - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_short_and_unmatched_notes_dropped() {
        let piano = vec![
            on(0, 0, 60, 100),
            // 4 ticks at 120 BPM/480 PPQ is about 4ms
            off(4, 0, 60),
            off(100, 0, 61),
            on(0, 0, 62, 100),
            off(480, 0, 62),
            end(),
        ];

        let score = parse_midi(&encode(vec![piano]), 1.0).unwrap();

        let notes = &score.tracks[0].notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 62);
    }

    #[test]
    fn test_drum_and_pedal_metadata() {
        let drums = vec![
            midi(0, 9, MidiMessage::ProgramChange { program: u7::new(0) }),
            on(0, 9, 36, 100),
            off(240, 9, 36),
            end(),
        ];
        let bass = vec![
            midi(0, 1, MidiMessage::ProgramChange { program: u7::new(33) }),
            midi(0, 1, MidiMessage::Controller { controller: u7::new(64), value: u7::new(127) }),
            on(0, 1, 40, 100),
            off(480, 1, 40),
            midi(0, 1, MidiMessage::Controller { controller: u7::new(64), value: u7::new(0) }),
            end(),
        ];

        let score = parse_midi(&encode(vec![drums, bass]), 1.0).unwrap();

        assert!(score.tracks[0].is_drum);
        assert_eq!(score.tracks[0].instrument_name(), "Drums/Percussion");
        assert!(!score.tracks[1].is_drum);
        assert_eq!(score.tracks[1].instrument_name(), "Bass");
        assert_eq!(score.tracks[1].pedal_events, vec![(0.0, 127), (0.5, 0)]);

        assert_eq!(
            score.default_selection(),
            vec![TrackSelection::new(1, TrackRole::Auto)]
        );
    }

    #[test]
    fn test_into_note_store_forces_roles() {
        let upper = vec![on(0, 0, 50, 90), off(480, 0, 50), end()];
        let lower = vec![on(240, 0, 72, 90), off(480, 0, 72), end()];

        let score = parse_midi(&encode(vec![upper, lower]), 1.0).unwrap();
        let store = score
            .into_note_store(&[
                TrackSelection::new(0, TrackRole::Right),
                TrackSelection::new(1, TrackRole::Auto),
            ])
            .unwrap();

        assert_eq!(store.len(), 2);
        let first = store.get(NoteId(0)).unwrap();
        assert_eq!(first.pitch, 50);
        assert_eq!(first.hand, Hand::Right);
        assert_eq!(store.get(NoteId(1)).unwrap().hand, Hand::Unknown);

        assert!(matches!(
            score.into_note_store(&[TrackSelection::new(7, TrackRole::Auto)]),
            Err(MidiImportError::UnknownTrack(7))
        ));
    }

    #[test]
    fn test_rejects_timecode_and_garbage() {
        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Timecode(midly::Fps::Fps25, 40)),
            tracks: vec![vec![end()]],
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();

        assert!(matches!(parse_midi(&bytes, 1.0), Err(MidiImportError::UnsupportedTiming)));
        assert!(matches!(parse_midi(b"not a midi file", 1.0), Err(MidiImportError::ParseError(_))));
        assert!(matches!(parse_midi(&bytes, 0.0), Err(MidiImportError::InvalidTempoScale(_))));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(TrackRole::from_string("LEFT"), Some(TrackRole::Left));
        assert_eq!(TrackRole::from_string("r"), Some(TrackRole::Right));
        assert_eq!(TrackRole::from_string("auto"), Some(TrackRole::Auto));
        assert_eq!(TrackRole::from_string("both"), None);
    }
}
