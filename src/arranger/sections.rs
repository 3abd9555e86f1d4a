// Section Analysis - Splits a piece into sections labeled by articulation and pace
// Uses bar structure when the piece declares a meter, grand pauses otherwise

use serde::{Deserialize, Serialize};

use crate::groove::grid::Measure;
use crate::groove::tempo::TempoMap;
use crate::notes::{Hand, Note, NoteId, NoteStore};

/// Silence (in beats) that separates two sections when no meter is declared
pub const GRAND_PAUSE_BEATS: f64 = 2.0;

/// Duration/IOI ratios are capped here so one long note can't dominate
const OVERLAP_RATIO_CAP: f64 = 1.2;
const LEGATO_MIN_RATIO: f64 = 0.95;
const STACCATO_MAX_RATIO: f64 = 0.60;

/// Notes per beat above which a section is fast
const FAST_DENSITY: f64 = 3.5;
/// Notes per beat below which a section is slow
const SLOW_DENSITY: f64 = 1.0;

/// How connected the bass line is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Articulation {
    /// Notes held through to the next onset
    Legato,

    /// Notes released well before the next onset
    Staccato,

    /// Somewhere in between
    Hybrid,
}

impl Articulation {
    pub fn to_string(&self) -> &'static str {
        match self {
            Articulation::Legato => "legato",
            Articulation::Staccato => "staccato",
            Articulation::Hybrid => "hybrid",
        }
    }
}

/// Note density of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    Slow,
    Normal,
    Fast,
}

impl Pace {
    pub fn to_string(&self) -> &'static str {
        match self {
            Pace::Slow => "slow",
            Pace::Normal => "normal",
            Pace::Fast => "fast",
        }
    }
}

/// A contiguous span of the piece with a single character.
/// Notes are handles into the performance's [`NoteStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalSection {
    /// Start in seconds
    pub start_time: f64,

    /// End in seconds
    pub end_time: f64,

    /// Start in beats
    pub start_beat: f64,

    /// End in beats
    pub end_beat: f64,

    /// Notes of the section, in start-time order
    pub notes: Vec<NoteId>,

    /// Bass articulation label
    pub articulation: Articulation,

    /// Density label
    pub pace: Pace,
}

impl MusicalSection {
    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Length in beats
    pub fn duration_beats(&self) -> f64 {
        self.end_beat - self.start_beat
    }
}

/// Splits a note collection into [`MusicalSection`]s
pub struct SectionAnalyzer<'a> {
    store: &'a NoteStore,
    tempo_map: &'a TempoMap,
    ids: Vec<NoteId>,
}

impl<'a> SectionAnalyzer<'a> {
    /// Prepare an analyzer over every note of `store`, sorted by start time
    pub fn new(store: &'a NoteStore, tempo_map: &'a TempoMap) -> Self {
        SectionAnalyzer {
            store,
            tempo_map,
            ids: store.ids_by_start(),
        }
    }

    /// Produce the ordered section list (empty for an empty piece)
    pub fn analyze(&self) -> Vec<MusicalSection> {
        if self.ids.is_empty() {
            return Vec::new();
        }

        let sections = if self.tempo_map.has_explicit_time_signatures() {
            self.analyze_by_measures()
        } else {
            self.analyze_by_silence()
        };

        for (i, section) in sections.iter().enumerate() {
            log::debug!(
                "Section {} [{:.2}s - {:.2}s] {} / {} ({} notes)",
                i,
                section.start_time,
                section.end_time,
                section.articulation.to_string(),
                section.pace.to_string(),
                section.notes.len()
            );
        }

        sections
    }

    /// One section per run of notes between grand pauses
    fn analyze_by_silence(&self) -> Vec<MusicalSection> {
        let boundaries = self.detect_grand_pauses();
        let mut sections = Vec::new();

        for window in boundaries.windows(2) {
            let slice = &self.ids[window[0]..window[1]];
            let Some(first) = slice.first().and_then(|id| self.store.get(*id)) else {
                continue;
            };
            let start_time = first.start_time;
            let Some(end_time) = self.store.max_end(slice) else {
                continue;
            };

            let start_beat = self.tempo_map.time_to_beat(start_time);
            let end_beat = self.tempo_map.time_to_beat(end_time);

            sections.push(MusicalSection {
                start_time,
                end_time,
                start_beat,
                end_beat,
                notes: slice.to_vec(),
                articulation: self.classify_bass_articulation(slice),
                pace: classify_pace(slice.len(), start_beat, end_beat),
            });
        }

        sections
    }

    /// Indices into the sorted note list where a new section begins, bracketed
    /// by 0 and the note count.
    ///
    /// The gap before each note is measured from the latest end seen so far and
    /// converted to beats with the tempo in force at that end.
    fn detect_grand_pauses(&self) -> Vec<usize> {
        let notes: Vec<&Note> = self.ids.iter().filter_map(|id| self.store.get(*id)).collect();
        let mut boundaries = vec![0];

        if let Some(first) = notes.first() {
            let mut last_end = first.end_time();
            for (i, note) in notes.iter().enumerate().skip(1) {
                let gap_seconds = note.start_time - last_end;
                let gap_beats = gap_seconds / self.tempo_map.seconds_per_beat_at(last_end);
                if gap_beats > GRAND_PAUSE_BEATS {
                    boundaries.push(i);
                }
                last_end = last_end.max(note.end_time());
            }
        }

        boundaries.push(notes.len());
        boundaries
    }

    /// Merge consecutive bars of the same articulation into sections.
    ///
    /// A merged run keeps the pace of its first bar. Empty bars repeat the
    /// previous bar's labels.
    fn analyze_by_measures(&self) -> Vec<MusicalSection> {
        let Some(total_duration) = self.store.max_end(&self.ids) else {
            return Vec::new();
        };
        let measures = self.tempo_map.get_measure_boundaries(total_duration);

        let mut sections = Vec::new();
        let mut section_start = measures.first().map_or(0.0, |m| m.start_time);
        let mut section_notes: Vec<NoteId> = Vec::new();
        let mut current: Option<(Articulation, Pace)> = None;

        for measure in &measures {
            let measure_notes = self.notes_in_measure(measure);

            let (style, pace) = if measure_notes.is_empty() {
                current.unwrap_or((Articulation::Legato, Pace::Normal))
            } else {
                let start_beat = self.tempo_map.time_to_beat(measure.start_time);
                let end_beat = self.tempo_map.time_to_beat(measure.end_time);
                (
                    self.classify_bass_articulation(&measure_notes),
                    classify_pace(measure_notes.len(), start_beat, end_beat),
                )
            };

            let previous = current;
            match previous {
                None => current = Some((style, pace)),
                Some((run_style, run_pace)) if run_style != style => {
                    if !section_notes.is_empty() {
                        sections.push(self.build_section(
                            section_start,
                            measure.start_time,
                            std::mem::take(&mut section_notes),
                            run_style,
                            run_pace,
                        ));
                    }
                    section_start = measure.start_time;
                    current = Some((style, pace));
                }
                Some(_) => {}
            }

            section_notes.extend(measure_notes);
        }

        if let (Some((style, pace)), Some(last)) = (current, measures.last()) {
            if !section_notes.is_empty() {
                sections.push(self.build_section(
                    section_start,
                    last.end_time,
                    section_notes,
                    style,
                    pace,
                ));
            }
        }

        sections
    }

    fn notes_in_measure(&self, measure: &Measure) -> Vec<NoteId> {
        self.ids
            .iter()
            .filter(|id| {
                self.store
                    .get(**id)
                    .is_some_and(|n| measure.contains(n.start_time))
            })
            .copied()
            .collect()
    }

    fn build_section(
        &self,
        start_time: f64,
        end_time: f64,
        notes: Vec<NoteId>,
        articulation: Articulation,
        pace: Pace,
    ) -> MusicalSection {
        MusicalSection {
            start_time,
            end_time,
            start_beat: self.tempo_map.time_to_beat(start_time),
            end_beat: self.tempo_map.time_to_beat(end_time),
            notes,
            articulation,
            pace,
        }
    }

    /// Label the left-hand line of `ids` by how much each note fills the gap
    /// to the next onset (in beats). Fewer than two bass notes count as legato.
    pub fn classify_bass_articulation(&self, ids: &[NoteId]) -> Articulation {
        let mut bass: Vec<&Note> = ids
            .iter()
            .filter_map(|id| self.store.get(*id))
            .filter(|n| n.hand == Hand::Left)
            .collect();
        if bass.len() < 2 {
            return Articulation::Legato;
        }
        bass.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let mut total_ratio = 0.0;
        let mut pairs = 0usize;
        for pair in bass.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            let current_beat = self.tempo_map.time_to_beat(current.start_time);
            let ioi_beats = self.tempo_map.time_to_beat(next.start_time) - current_beat;
            if ioi_beats <= 0.0 {
                continue;
            }
            let duration_beats = self.tempo_map.time_to_beat(current.end_time()) - current_beat;
            total_ratio += (duration_beats / ioi_beats).min(OVERLAP_RATIO_CAP);
            pairs += 1;
        }

        if pairs == 0 {
            return Articulation::Legato;
        }

        let average = total_ratio / pairs as f64;
        if average >= LEGATO_MIN_RATIO {
            Articulation::Legato
        } else if average <= STACCATO_MAX_RATIO {
            Articulation::Staccato
        } else {
            Articulation::Hybrid
        }
    }
}

/// Label density as notes per beat over `[start_beat, end_beat]`
pub fn classify_pace(note_count: usize, start_beat: f64, end_beat: f64) -> Pace {
    let duration_beats = end_beat - start_beat;
    if duration_beats <= 0.0 {
        return Pace::Normal;
    }

    let notes_per_beat = note_count as f64 / duration_beats;
    if notes_per_beat > FAST_DENSITY {
        Pace::Fast
    } else if notes_per_beat < SLOW_DENSITY {
        Pace::Slow
    } else {
        Pace::Normal
    }
}
