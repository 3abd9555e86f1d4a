// Note types
// Defines notes, hand labels, and the arena that owns a performance's notes

use serde::{Deserialize, Serialize};

/// Middle C; notes below are played by the left hand by default
pub const HAND_SPLIT_PITCH: u8 = 60;

/// Which hand plays a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    /// Not yet assigned
    #[default]
    Unknown,

    /// Left hand (bass)
    Left,

    /// Right hand (treble)
    Right,
}

impl Hand {
    /// Hand that would play a pitch (or an average pitch) under the split-point heuristic
    pub fn for_pitch(pitch: f64) -> Self {
        if pitch < HAND_SPLIT_PITCH as f64 {
            Hand::Left
        } else {
            Hand::Right
        }
    }

    /// Convert from string representation
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "left" | "l" => Hand::Left,
            "right" | "r" => Hand::Right,
            _ => Hand::Unknown,
        }
    }

    /// Convert to string representation
    pub fn to_string(&self) -> &'static str {
        match self {
            Hand::Unknown => "unknown",
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

/// Stable handle of a note inside a [`NoteStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub usize);

/// A single note of the transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Handle into the owning store (assigned by [`NoteStore::new`])
    pub id: NoteId,

    /// MIDI pitch (0-127)
    pub pitch: u8,

    /// MIDI velocity (1-127)
    pub velocity: u8,

    /// Onset in seconds from the start of the piece
    pub start_time: f64,

    /// Length in seconds
    pub duration: f64,

    /// Playing hand
    pub hand: Hand,

    /// Index of the MIDI track the note came from, if any
    pub track_index: Option<usize>,

    /// MIDI channel, if known
    pub channel: Option<u8>,
}

impl Note {
    /// Create a note with no hand, track or channel
    pub fn new(pitch: u8, velocity: u8, start_time: f64, duration: f64) -> Self {
        Note {
            id: NoteId(0),
            pitch,
            velocity,
            start_time,
            duration,
            hand: Hand::Unknown,
            track_index: None,
            channel: None,
        }
    }

    /// Builder-style hand override
    pub fn with_hand(mut self, hand: Hand) -> Self {
        self.hand = hand;
        self
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Arena owning every note of a performance.
///
/// Notes are sorted by onset on construction and addressed by [`NoteId`]
/// afterwards; ids never change even when later stages move notes in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteStore {
    notes: Vec<Note>,
}

impl NoteStore {
    /// Take ownership of `notes`, sort them by start time and assign ids
    pub fn new(mut notes: Vec<Note>) -> Self {
        notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        for (i, note) in notes.iter_mut().enumerate() {
            note.id = NoteId(i);
        }
        NoteStore { notes }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NoteId) -> Option<&mut Note> {
        self.notes.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Note> {
        self.notes.iter_mut()
    }

    pub fn as_slice(&self) -> &[Note] {
        &self.notes
    }

    /// All ids in current start-time order (stable for ties)
    pub fn ids_by_start(&self) -> Vec<NoteId> {
        let mut ids: Vec<NoteId> = self.notes.iter().map(|n| n.id).collect();
        self.sort_by_start(&mut ids);
        ids
    }

    /// Ids of the notes played by `hand`, in current start-time order
    pub fn ids_for_hand(&self, hand: Hand) -> Vec<NoteId> {
        let mut ids: Vec<NoteId> = self
            .notes
            .iter()
            .filter(|n| n.hand == hand)
            .map(|n| n.id)
            .collect();
        self.sort_by_start(&mut ids);
        ids
    }

    /// Stable sort of `ids` by the current start time of their notes
    pub fn sort_by_start(&self, ids: &mut [NoteId]) {
        ids.sort_by(|a, b| self.start_of(*a).total_cmp(&self.start_of(*b)));
    }

    /// Latest end time among `ids`, or `None` when empty
    pub fn max_end(&self, ids: &[NoteId]) -> Option<f64> {
        ids.iter()
            .filter_map(|id| self.get(*id))
            .map(Note::end_time)
            .reduce(f64::max)
    }

    fn start_of(&self, id: NoteId) -> f64 {
        self.get(id).map(|n| n.start_time).unwrap_or(f64::INFINITY)
    }
}
