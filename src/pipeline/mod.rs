// Pipeline execution and monitoring module
// Orchestrates the quantized-notes-to-performance pipeline

pub mod trace;

pub use trace::{read_trace_file, TraceEntry, TraceError, TraceWriter};

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::arranger::fingering::FingeringEngine;
use crate::arranger::keymap::{KeyBinding, KeyMapper};
use crate::arranger::midi::{parse_midi, MidiImportError, TrackSelection};
use crate::arranger::pedal::{KeyEvent, PedalGenerator};
use crate::arranger::sections::{MusicalSection, SectionAnalyzer};
use crate::config::{ConfigError, PerformanceConfig};
use crate::groove::humanize::{HandDrift, HumanizeError, Humanizer, ResyncPoints};
use crate::groove::tempo::TempoMap;
use crate::notes::{Hand, Note, NoteStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("MIDI import error: {0}")]
    Import(#[from] MidiImportError),

    #[error("Humanizer error: {0}")]
    Humanize(#[from] HumanizeError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

/// How a stage touches the note collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAccess {
    Read,
    Write,
}

/// Stages of a performance, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    HandAssignment,
    SectionAnalysis,
    Humanize,
    TempoRubato,
    PedalGeneration,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::HandAssignment,
        PipelineStage::SectionAnalysis,
        PipelineStage::Humanize,
        PipelineStage::TempoRubato,
        PipelineStage::PedalGeneration,
    ];

    /// Whether the stage needs exclusive access to the notes
    pub fn access(&self) -> StageAccess {
        match self {
            PipelineStage::HandAssignment
            | PipelineStage::Humanize
            | PipelineStage::TempoRubato => StageAccess::Write,
            PipelineStage::SectionAnalysis | PipelineStage::PedalGeneration => StageAccess::Read,
        }
    }

    /// Fraction of the run complete once this stage finishes
    pub fn progress(&self) -> f32 {
        let position = PipelineStage::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or(0);
        (position + 1) as f32 / PipelineStage::ALL.len() as f32
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            PipelineStage::HandAssignment => "hand_assignment",
            PipelineStage::SectionAnalysis => "section_analysis",
            PipelineStage::Humanize => "humanize",
            PipelineStage::TempoRubato => "tempo_rubato",
            PipelineStage::PedalGeneration => "pedal_generation",
        }
    }
}

/// Everything a playback scheduler needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    pub run_id: Uuid,

    /// Final notes; `NoteId(i)` is `notes[i]`
    pub notes: Vec<Note>,

    /// Sections for diagnostics; note ids refer to `notes`
    pub sections: Vec<MusicalSection>,

    /// Pedal events sorted by (time, priority)
    pub pedal_events: Vec<KeyEvent>,

    /// Keyboard key for each note; `key_bindings[i]` plays `notes[i]`
    pub key_bindings: Vec<Option<KeyBinding>>,

    /// Latest note end in seconds
    pub duration: f64,
}

impl Performance {
    /// Notes in playback order (humanization can reorder onsets)
    pub fn notes_by_start(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.iter().collect();
        notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        notes
    }

    pub fn key_for(&self, note: &Note) -> Option<KeyBinding> {
        self.key_bindings.get(note.id.0).copied().flatten()
    }
}

/// Runs the stages over one note collection.
///
/// Stages run strictly one after another. Write stages get the store
/// mutably, read stages only see it shared.
pub struct Performer {
    config: PerformanceConfig,
    humanizer: Humanizer,
    fingering: FingeringEngine,
    keymap: KeyMapper,
    trace: Option<TraceWriter>,
    run_id: Uuid,
}

impl Performer {
    pub fn new(config: PerformanceConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let humanizer = Humanizer::new(config.humanize.clone())?;
        let keymap = KeyMapper::new(config.use_88_key_layout);

        Ok(Performer {
            config,
            humanizer,
            fingering: FingeringEngine::new(),
            keymap,
            trace: None,
            run_id: Uuid::new_v4(),
        })
    }

    /// Record one JSONL entry per stage
    pub fn with_trace(mut self, writer: TraceWriter) -> Self {
        self.trace = Some(writer);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Parse a MIDI file and perform the selected tracks (all non-drum tracks
    /// when `selection` is `None`), seeding from the config when it has a seed
    pub fn perform_midi(
        &self,
        data: &[u8],
        selection: Option<&[TrackSelection]>,
    ) -> Result<Performance, PipelineError> {
        let score = parse_midi(data, self.config.tempo_scale)?;
        let default_selection;
        let selection = match selection {
            Some(selection) => selection,
            None => {
                default_selection = score.default_selection();
                &default_selection
            }
        };
        let notes = score.into_note_store(selection)?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.perform(notes, &score.tempo_map, &mut rng)
    }

    /// Run every stage over `notes`
    pub fn perform<R: Rng + ?Sized>(
        &self,
        mut notes: NoteStore,
        tempo_map: &TempoMap,
        rng: &mut R,
    ) -> Result<Performance, PipelineError> {
        log::info!(
            "Performing {} notes (run {}, pedal {})",
            notes.len(),
            self.run_id,
            self.config.pedal_style.to_string()
        );

        let simulate_hands = self.config.simulate_hands;
        self.write_stage(PipelineStage::HandAssignment, &mut notes, |store| {
            if simulate_hands {
                let ids = store.ids_by_start();
                self.fingering.assign_hands(store, &ids);
            } else {
                self.fingering.assign_by_pitch(store);
            }
            let left = store.iter().filter(|n| n.hand == Hand::Left).count();
            format!("{} left, {} right", left, store.len() - left)
        })?;

        let sections = self.read_stage(PipelineStage::SectionAnalysis, &notes, |store| {
            let sections = SectionAnalyzer::new(store, tempo_map).analyze();
            let message = format!("{} sections", sections.len());
            (sections, message)
        })?;

        let resync_points = ResyncPoints::from_sections(&sections);
        self.write_stage(PipelineStage::Humanize, &mut notes, |store| {
            let mut drift = HandDrift::default();
            for hand in [Hand::Left, Hand::Right] {
                let ids = store.ids_for_hand(hand);
                self.humanizer
                    .apply_to_hand(store, &ids, hand, &resync_points, &mut drift, rng);
            }
            format!(
                "drift left {:.4}s, right {:.4}s ({} resync points)",
                drift.left,
                drift.right,
                resync_points.len()
            )
        })?;

        self.write_stage(PipelineStage::TempoRubato, &mut notes, |store| {
            self.humanizer.apply_tempo_rubato(store, &sections);
            format!("sway over {} sections", sections.len())
        })?;

        let pedal_style = self.config.pedal_style;
        let pedal_events = self.read_stage(PipelineStage::PedalGeneration, &notes, |store| {
            let events = PedalGenerator::generate_events(pedal_style, store, &sections);
            let message = format!("{} pedal events", events.len());
            (events, message)
        })?;

        let key_bindings: Vec<Option<KeyBinding>> =
            notes.iter().map(|n| self.keymap.binding_for(n.pitch)).collect();
        let folded = notes
            .iter()
            .filter(|n| self.keymap.fold_into_range(n.pitch) != n.pitch)
            .count();
        if folded > 0 {
            log::info!(
                "{} notes outside {}..={} folded by octaves",
                folded,
                self.keymap.min_pitch(),
                self.keymap.max_pitch()
            );
        }

        let duration = notes.max_end(&notes.ids_by_start()).unwrap_or(0.0);
        log::info!(
            "Performance ready: {} notes, {} sections, {} pedal events, {:.2}s",
            notes.len(),
            sections.len(),
            pedal_events.len(),
            duration
        );

        Ok(Performance {
            run_id: self.run_id,
            notes: notes.as_slice().to_vec(),
            sections,
            pedal_events,
            key_bindings,
            duration,
        })
    }

    fn write_stage(
        &self,
        stage: PipelineStage,
        store: &mut NoteStore,
        run: impl FnOnce(&mut NoteStore) -> String,
    ) -> Result<(), PipelineError> {
        debug_assert_eq!(stage.access(), StageAccess::Write);
        let started = Instant::now();
        let message = run(store);
        self.record(stage, store.len(), started, message)
    }

    fn read_stage<T>(
        &self,
        stage: PipelineStage,
        store: &NoteStore,
        run: impl FnOnce(&NoteStore) -> (T, String),
    ) -> Result<T, PipelineError> {
        debug_assert_eq!(stage.access(), StageAccess::Read);
        let started = Instant::now();
        let (output, message) = run(store);
        self.record(stage, store.len(), started, message)?;
        Ok(output)
    }

    fn record(
        &self,
        stage: PipelineStage,
        note_count: usize,
        started: Instant,
        message: String,
    ) -> Result<(), PipelineError> {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::debug!("[{}] {} ({:.2}ms)", stage.to_string(), message, elapsed_ms);

        if let Some(writer) = &self.trace {
            let entry = TraceEntry::for_stage(self.run_id, stage, message)
                .with_data(serde_json::json!({
                    "notes": note_count,
                    "elapsed_ms": elapsed_ms,
                }));
            writer.append(&entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::pedal::{PedalAction, PedalStyle};
    use tempfile::TempDir;

    fn phrase() -> NoteStore {
        // Bass half notes under a right-hand melody, 120 BPM
        let mut notes = Vec::new();
        for i in 0..4 {
            notes.push(Note::new(40 + (i % 2) as u8 * 7, 70, i as f64, 1.0));
            notes.push(Note::new(72 + i as u8, 90, i as f64, 0.5));
            notes.push(Note::new(74 + i as u8, 90, i as f64 + 0.5, 0.5));
        }
        NoteStore::new(notes)
    }

    fn humanized_config() -> PerformanceConfig {
        let mut config = PerformanceConfig::default();
        config.humanize.vary_timing = true;
        config.humanize.vary_articulation = true;
        config.humanize.enable_drift_correction = true;
        config.humanize.enable_chord_roll = true;
        config.humanize.enable_tempo_sway = true;
        config
    }

    #[test]
    fn test_stage_access() {
        assert_eq!(PipelineStage::HandAssignment.access(), StageAccess::Write);
        assert_eq!(PipelineStage::SectionAnalysis.access(), StageAccess::Read);
        assert_eq!(PipelineStage::Humanize.access(), StageAccess::Write);
        assert_eq!(PipelineStage::TempoRubato.access(), StageAccess::Write);
        assert_eq!(PipelineStage::PedalGeneration.access(), StageAccess::Read);
        assert_eq!(PipelineStage::PedalGeneration.progress(), 1.0);
    }

    #[test]
    fn test_default_config_keeps_timing() {
        let performer = Performer::new(PerformanceConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let performance = performer
            .perform(phrase(), &TempoMap::constant(), &mut rng)
            .unwrap();

        let original = phrase();
        for (note, before) in performance.notes.iter().zip(original.iter()) {
            assert_eq!(note.start_time, before.start_time);
            // Articulation only applies when a per-hand pass is enabled
            assert_eq!(note.duration, before.duration);
            assert_ne!(note.hand, Hand::Unknown);
        }
        assert!(!performance.sections.is_empty());
        assert!(!performance.pedal_events.is_empty());
        assert!((performance.duration - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let performer = Performer::new(humanized_config()).unwrap();
        let map = TempoMap::constant();

        let first = performer
            .perform(phrase(), &map, &mut StdRng::seed_from_u64(99))
            .unwrap();
        let second = performer
            .perform(phrase(), &map, &mut StdRng::seed_from_u64(99))
            .unwrap();

        let starts = |p: &Performance| p.notes.iter().map(|n| n.start_time).collect::<Vec<_>>();
        assert_eq!(starts(&first), starts(&second));
        assert_eq!(first.pedal_events, second.pedal_events);
    }

    #[test]
    fn test_pedal_output_is_ordered() {
        let mut config = humanized_config();
        config.pedal_style = PedalStyle::Harmonic;
        let performer = Performer::new(config).unwrap();

        let performance = performer
            .perform(phrase(), &TempoMap::constant(), &mut StdRng::seed_from_u64(5))
            .unwrap();

        let events = &performance.pedal_events;
        assert_eq!(events.first().map(|e| e.action), Some(PedalAction::Engage));
        assert_eq!(events.last().map(|e| e.action), Some(PedalAction::Disengage));
        for pair in events.windows(2) {
            assert!(pair[0].schedule_cmp(&pair[1]) != std::cmp::Ordering::Greater);
        }
    }

    #[test]
    fn test_durations_respect_floor() {
        let mut config = humanized_config();
        config.humanize.articulation = 0.0;
        let performer = Performer::new(config).unwrap();

        let performance = performer
            .perform(phrase(), &TempoMap::constant(), &mut StdRng::seed_from_u64(3))
            .unwrap();

        for note in &performance.notes {
            assert!((note.duration - 0.03).abs() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PerformanceConfig::default();
        config.humanize.timing_variance = -1.0;

        assert!(matches!(
            Performer::new(config),
            Err(PipelineError::Config(ConfigError::InvalidParameter(_)))
        ));
    }

    #[test]
    fn test_key_bindings_follow_layout() {
        use crate::arranger::keymap::KeyModifier;

        let notes = || NoteStore::new(vec![Note::new(30, 80, 0.0, 0.5), Note::new(60, 80, 0.5, 0.5)]);
        let mut rng = StdRng::seed_from_u64(0);

        let small = Performer::new(PerformanceConfig::default())
            .unwrap()
            .perform(notes(), &TempoMap::constant(), &mut rng)
            .unwrap();
        assert_eq!(small.key_bindings.len(), 2);
        let low = small.key_for(&small.notes[0]).unwrap();
        assert_eq!((low.key, low.modifier), ('4', Some(KeyModifier::Shift)));
        assert_eq!(small.key_for(&small.notes[1]).map(|b| b.key), Some('t'));

        let mut config = PerformanceConfig::default();
        config.use_88_key_layout = true;
        let full = Performer::new(config)
            .unwrap()
            .perform(notes(), &TempoMap::constant(), &mut rng)
            .unwrap();
        let low = full.key_for(&full.notes[0]).unwrap();
        assert_eq!((low.key, low.modifier), ('0', Some(KeyModifier::Ctrl)));
    }

    #[test]
    fn test_notes_by_start_follows_humanized_onsets() {
        let performer = Performer::new(humanized_config()).unwrap();
        let performance = performer
            .perform(phrase(), &TempoMap::constant(), &mut StdRng::seed_from_u64(8))
            .unwrap();

        let ordered = performance.notes_by_start();
        assert_eq!(ordered.len(), performance.notes.len());
        for pair in ordered.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
        }
    }

    #[test]
    fn test_trace_records_every_stage() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");

        let performer = Performer::new(PerformanceConfig::default())
            .unwrap()
            .with_trace(TraceWriter::new(trace_path.clone()));
        performer
            .perform(phrase(), &TempoMap::constant(), &mut StdRng::seed_from_u64(0))
            .unwrap();

        let entries = read_trace_file(&trace_path).unwrap();
        let stages: Vec<PipelineStage> = entries.iter().map(|e| e.stage).collect();
        assert_eq!(stages, PipelineStage::ALL.to_vec());
        assert!(entries.iter().all(|e| e.run_id == performer.run_id()));
        assert_eq!(entries[0].data.as_ref().unwrap()["notes"], 12);
    }
}
