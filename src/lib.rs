// Pianola - Quantized MIDI to humanized piano performance
// Module declarations

pub mod arranger;
pub mod config;
pub mod groove;
pub mod notes;
pub mod pipeline;

pub use arranger::{
    parse_midi, FingeringEngine, KeyBinding, KeyEvent, KeyMapper, MidiScore, MusicalSection, PedalGenerator, PedalStyle,
    SectionAnalyzer, TrackRole, TrackSelection,
};
pub use config::{load_config, PerformanceConfig};
pub use groove::{HandDrift, HumanizeSettings, Humanizer, TempoMap};
pub use notes::{Hand, Note, NoteId, NoteStore};
pub use pipeline::{Performance, Performer, PipelineError};
