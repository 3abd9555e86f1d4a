// Groove Engine - Tempo, Meter, and Humanization
// Musical timing and the expressive deviations applied to it

pub mod grid;
pub mod humanize;
pub mod tempo;

pub use grid::{Measure, TimeSignature};
pub use humanize::{HandDrift, HumanizeError, HumanizeSettings, Humanizer, ResyncPoints};
pub use tempo::{Breakpoint, TempoEvent, TempoMap};
