// Arranger - Performance structure on top of the raw notes
// Section analysis, hand assignment, sustain pedal, key mapping and MIDI import

pub mod fingering;
pub mod keymap;
pub mod midi;
pub mod pedal;
pub mod sections;

// Re-export main types
pub use fingering::{FingeringEngine, MAX_HAND_SPAN};
pub use keymap::{is_black_key, pitch_to_name, KeyBinding, KeyMapper, KeyModifier};
pub use midi::{parse_midi, MidiImportError, MidiScore, MidiTrack, TrackRole, TrackSelection};
pub use pedal::{KeyEvent, PedalAction, PedalGenerator, PedalStyle};
pub use sections::{classify_pace, Articulation, MusicalSection, Pace, SectionAnalyzer};
