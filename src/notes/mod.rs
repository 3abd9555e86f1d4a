// Note model - notes, hands, and simultaneity groups
// Shared by every analysis and humanization stage

pub mod grouping;
pub mod types;

pub use grouping::{onset_clusters, time_groups, DEFAULT_GROUP_THRESHOLD};
pub use types::{Hand, Note, NoteId, NoteStore, HAND_SPLIT_PITCH};
