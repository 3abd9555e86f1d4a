use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pianola_lib::arranger::keymap::{pitch_to_name, KeyModifier};
use pianola_lib::arranger::midi::parse_midi;
use pianola_lib::config::{load_config, PerformanceConfig};
use pianola_lib::pipeline::{Performance, Performer, TraceWriter};
use pianola_lib::{TrackRole, TrackSelection};

/// Quantized MIDI to humanized piano performance
#[derive(Parser)]
#[command(name = "pianola")]
#[command(about = "Turn quantized MIDI into a humanized piano performance with pedaling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform a MIDI file and write the result as JSON
    Perform {
        /// Input MIDI file
        input: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Track to play, as INDEX or INDEX=left|right|auto (repeatable)
        #[arg(short, long = "track")]
        tracks: Vec<String>,

        /// RNG seed, overrides the config
        #[arg(long)]
        seed: Option<u64>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append a JSONL stage trace to this file
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Print sections and a timed key sheet instead of JSON
        #[arg(long)]
        keys: bool,
    },
    /// List the tracks of a MIDI file
    Tracks {
        /// Input MIDI file
        input: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn parse_track(arg: &str) -> anyhow::Result<TrackSelection> {
    let (index, role) = match arg.split_once('=') {
        Some((index, role)) => {
            let role = TrackRole::from_string(role.trim())
                .ok_or_else(|| anyhow::anyhow!("Unknown hand '{}' in --track {}", role, arg))?;
            (index, role)
        }
        None => (arg, TrackRole::Auto),
    };
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow::anyhow!("Invalid track index in --track {}", arg))?;
    Ok(TrackSelection::new(index, role))
}

fn key_sheet(performance: &Performance) -> String {
    let mut lines = Vec::new();

    for (i, section) in performance.sections.iter().enumerate() {
        lines.push(format!(
            "# section {} {:>8.3}s {:>6.1} beats  {} / {}",
            i,
            section.start_time,
            section.duration_beats(),
            section.articulation.to_string(),
            section.pace.to_string()
        ));
    }

    for note in performance.notes_by_start() {
        let key = match performance.key_for(note) {
            Some(binding) => {
                let prefix = match binding.modifier {
                    Some(KeyModifier::Shift) => "shift+",
                    Some(KeyModifier::Ctrl) => "ctrl+",
                    None => "",
                };
                format!("{}{}", prefix, binding.key)
            }
            None => "-".to_string(),
        };
        lines.push(format!(
            "{:>8.3}s {:>6.3}s  {:<7} {:<4} {}",
            note.start_time,
            note.duration,
            note.hand.to_string(),
            pitch_to_name(note.pitch),
            key
        ));
    }

    lines.join("\n")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Perform {
            input,
            config,
            tracks,
            seed,
            output,
            trace,
            keys,
        } => {
            let mut config = if let Some(config_path) = config {
                load_config(config_path)?
            } else {
                PerformanceConfig::default()
            };
            if seed.is_some() {
                config.seed = seed;
            }

            let selection = tracks
                .iter()
                .map(|arg| parse_track(arg))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut performer = Performer::new(config)?;
            if let Some(trace_path) = trace {
                performer = performer.with_trace(TraceWriter::new(trace_path));
            }

            let data = std::fs::read(&input)?;
            let selection = if selection.is_empty() {
                None
            } else {
                Some(selection.as_slice())
            };
            let performance = performer.perform_midi(&data, selection)?;

            let rendered = if keys {
                key_sheet(&performance)
            } else {
                serde_json::to_string_pretty(&performance)?
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    log::info!("Performance saved to {}", path.display());
                }
                None => println!("{}", rendered),
            }
        }
        Commands::Tracks { input } => {
            let data = std::fs::read(&input)?;
            let score = parse_midi(&data, 1.0)?;

            for event in score.tempo_map.tempo_events() {
                println!("tempo {:>6.1} BPM at {:.3}s", event.bpm(), event.time);
            }
            for track in &score.tracks {
                let low = track.notes.iter().map(|n| n.pitch).min().unwrap_or(0);
                let high = track.notes.iter().map(|n| n.pitch).max().unwrap_or(0);
                println!(
                    "{:>3}  {:<24} {:<18} {:>5} notes  {}-{}{}",
                    track.index,
                    track.name,
                    track.instrument_name(),
                    track.note_count(),
                    pitch_to_name(low),
                    pitch_to_name(high),
                    if track.is_drum { "  (skipped by default)" } else { "" }
                );
            }
        }
        Commands::ShowConfig => {
            let config = PerformanceConfig::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
