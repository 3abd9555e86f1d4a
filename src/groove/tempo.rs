// Tempo Map - Bidirectional seconds <-> beats conversion
// Piecewise-linear mapping built from tempo change breakpoints

use serde::{Deserialize, Serialize};

use super::grid::{active_signature, Measure, TimeSignature};

/// MIDI default tempo: 500000 microseconds per quarter note (120 BPM)
pub const DEFAULT_TEMPO_US: u32 = 500_000;

/// A tempo change as read from the source file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    /// When the change takes effect, in seconds
    pub time: f64,

    /// Microseconds per quarter note, rounded after any speed change
    pub us_per_quarter: u32,

    /// Exact segment tempo; beat math uses this, not `us_per_quarter`
    pub seconds_per_beat: f64,
}

impl TempoEvent {
    pub fn new(time: f64, us_per_quarter: u32) -> Self {
        TempoEvent {
            time,
            us_per_quarter,
            seconds_per_beat: seconds_per_beat(us_per_quarter),
        }
    }

    /// The same change played `factor` times faster
    pub fn scaled(&self, factor: f64) -> Self {
        TempoEvent {
            time: self.time / factor,
            us_per_quarter: (self.us_per_quarter as f64 / factor).round() as u32,
            seconds_per_beat: self.seconds_per_beat / factor,
        }
    }

    /// Tempo in beats per minute
    pub fn bpm(&self) -> f64 {
        60.0 / self.seconds_per_beat
    }
}

/// Start of a constant-tempo segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Segment start in seconds
    pub time: f64,

    /// Beats elapsed before the segment starts
    pub beat: f64,

    /// Tempo for the whole segment
    pub seconds_per_beat: f64,
}

fn seconds_per_beat(us_per_quarter: u32) -> f64 {
    us_per_quarter as f64 / 1_000_000.0
}

/// Immutable mapping between wall-clock time and beat position.
///
/// Within each breakpoint segment the mapping is linear. Built once per
/// piece and shared read-only by every analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoMap {
    events: Vec<TempoEvent>,
    time_signatures: Vec<TimeSignature>,
    breakpoints: Vec<Breakpoint>,
    explicit_time_signatures: bool,
}

impl TempoMap {
    /// Build a map from tempo changes and time signatures (both sorted here by time)
    pub fn new(tempo_events: Vec<TempoEvent>, time_signatures: Vec<TimeSignature>) -> Self {
        let mut events = tempo_events;
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        let mut time_signatures = time_signatures;
        time_signatures.sort_by(|a, b| a.time.total_cmp(&b.time));

        let explicit_time_signatures = match time_signatures.as_slice() {
            [] => false,
            [only] => !only.is_default(),
            _ => true,
        };

        let breakpoints = build_breakpoints(&events);

        TempoMap {
            events,
            time_signatures,
            breakpoints,
            explicit_time_signatures,
        }
    }

    /// Constant 120 BPM, no time signatures
    pub fn constant() -> Self {
        TempoMap::new(Vec::new(), Vec::new())
    }

    /// Constant tempo at `bpm`, optionally with time signatures
    pub fn with_bpm(bpm: f64, time_signatures: Vec<TimeSignature>) -> Self {
        let us_per_quarter = (60_000_000.0 / bpm).round() as u32;
        TempoMap::new(vec![TempoEvent::new(0.0, us_per_quarter)], time_signatures)
    }

    pub fn tempo_events(&self) -> &[TempoEvent] {
        &self.events
    }

    pub fn time_signatures(&self) -> &[TimeSignature] {
        &self.time_signatures
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Whether the piece declares a meter beyond the 4/4 placeholder.
    /// Selects measure-based over silence-based section analysis.
    pub fn has_explicit_time_signatures(&self) -> bool {
        self.explicit_time_signatures
    }

    /// Beat position of `time` (0 before the first breakpoint)
    pub fn time_to_beat(&self, time: f64) -> f64 {
        let idx = self.breakpoints.partition_point(|b| b.time <= time);
        if idx == 0 {
            return 0.0;
        }
        let segment = &self.breakpoints[idx - 1];
        segment.beat + (time - segment.time) / segment.seconds_per_beat
    }

    /// Wall-clock time of beat position `beat` (0 before the first breakpoint)
    pub fn beat_to_time(&self, beat: f64) -> f64 {
        let idx = self.breakpoints.partition_point(|b| b.beat <= beat);
        if idx == 0 {
            return 0.0;
        }
        let segment = &self.breakpoints[idx - 1];
        segment.time + (beat - segment.beat) * segment.seconds_per_beat
    }

    /// Tempo change in force at `time`, if the piece declares one by then
    pub fn tempo_event_at(&self, time: f64) -> Option<&TempoEvent> {
        let idx = self.events.partition_point(|e| e.time <= time);
        idx.checked_sub(1).map(|i| &self.events[i])
    }

    /// Tempo (microseconds per quarter) of the latest change at or before `time`
    pub fn get_tempo_at(&self, time: f64) -> u32 {
        self.tempo_event_at(time)
            .map_or(DEFAULT_TEMPO_US, |e| e.us_per_quarter)
    }

    /// Seconds per beat at `time`, exact under a speed change
    pub fn seconds_per_beat_at(&self, time: f64) -> f64 {
        self.tempo_event_at(time)
            .map_or(seconds_per_beat(DEFAULT_TEMPO_US), |e| e.seconds_per_beat)
    }

    /// Bars covering `[0, total_duration]`, walking beat space from zero.
    ///
    /// Each bar's length comes from the signature active at its start; with no
    /// signatures the piece is treated as 4/4 throughout.
    pub fn get_measure_boundaries(&self, total_duration: f64) -> Vec<Measure> {
        let common = [TimeSignature::common_time()];
        let signatures: &[TimeSignature] = if self.time_signatures.is_empty() {
            &common
        } else {
            &self.time_signatures
        };

        let total_beats = self.time_to_beat(total_duration);
        let mut measures = Vec::new();
        let mut beat = 0.0;

        while beat < total_beats {
            let start_time = self.beat_to_time(beat);
            let measure_beats = active_signature(signatures, start_time).beats_per_measure();
            if measure_beats <= 0.0 {
                log::warn!("Time signature with zero-length bar at {:.3}s", start_time);
                break;
            }

            let end_beat = beat + measure_beats;
            measures.push(Measure::new(start_time, self.beat_to_time(end_beat)));
            beat = end_beat;
        }

        measures
    }
}

/// Integrate tempo changes into breakpoints.
/// A 120 BPM segment covers time zero if the first change comes later.
fn build_breakpoints(events: &[TempoEvent]) -> Vec<Breakpoint> {
    let mut breakpoints = Vec::with_capacity(events.len() + 1);
    let mut beat = 0.0;
    let mut last_time = 0.0;
    let mut spb = seconds_per_beat(DEFAULT_TEMPO_US);

    if events.first().map_or(true, |e| e.time > 0.0) {
        breakpoints.push(Breakpoint {
            time: 0.0,
            beat: 0.0,
            seconds_per_beat: spb,
        });
    }

    for event in events {
        beat += (event.time - last_time) / spb;
        breakpoints.push(Breakpoint {
            time: event.time,
            beat,
            seconds_per_beat: event.seconds_per_beat,
        });
        last_time = event.time;
        spb = event.seconds_per_beat;
    }

    breakpoints
}
