// Hand Assignment - Labels unassigned notes as left or right hand
// Pitch-split heuristic applied per simultaneity group

use crate::notes::{time_groups, Hand, NoteId, NoteStore, DEFAULT_GROUP_THRESHOLD};

/// Widest comfortable chord for one hand, in semitones.
/// Declared for reference only; chords are never rejected or split on span.
pub const MAX_HAND_SPAN: u8 = 14;

/// Fills in missing hand labels. Notes that already have a hand keep it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingeringEngine;

impl FingeringEngine {
    pub fn new() -> Self {
        FingeringEngine
    }

    /// Assign hands group by group over `ids` (start-time order).
    ///
    /// Single notes split at middle C. In a chord, the unassigned members all
    /// go to the hand chosen by their own average pitch.
    pub fn assign_hands(&self, store: &mut NoteStore, ids: &[NoteId]) {
        for group in time_groups(store, ids, DEFAULT_GROUP_THRESHOLD) {
            if group.len() == 1 {
                self.assign_single_note(store, group[0]);
            } else {
                self.assign_chord(store, &group);
            }
        }
    }

    fn assign_single_note(&self, store: &mut NoteStore, id: NoteId) {
        if let Some(note) = store.get_mut(id) {
            if note.hand == Hand::Unknown {
                note.hand = Hand::for_pitch(note.pitch as f64);
            }
        }
    }

    fn assign_chord(&self, store: &mut NoteStore, chord: &[NoteId]) {
        let unassigned: Vec<NoteId> = chord
            .iter()
            .copied()
            .filter(|id| store.get(*id).is_some_and(|n| n.hand == Hand::Unknown))
            .collect();
        if unassigned.is_empty() {
            return;
        }

        let pitch_sum: f64 = unassigned
            .iter()
            .filter_map(|id| store.get(*id))
            .map(|n| n.pitch as f64)
            .sum();
        let hand = Hand::for_pitch(pitch_sum / unassigned.len() as f64);

        for id in unassigned {
            if let Some(note) = store.get_mut(id) {
                note.hand = hand;
            }
        }
    }

    /// Label every unassigned note by its own pitch, ignoring chords
    pub fn assign_by_pitch(&self, store: &mut NoteStore) {
        for note in store.iter_mut() {
            if note.hand == Hand::Unknown {
                note.hand = Hand::for_pitch(note.pitch as f64);
            }
        }
    }
}
