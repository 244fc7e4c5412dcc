// Justly renderer: CLI entry point.
//
// Loads a song JSON file, schedules a selection of it and writes the result
// as a MIDI file. The pipeline: load song → build selection → schedule →
// MidiFileTransport (start / wait / stop).
//
// Usage:
//   cargo run -p justly_music --bin render -- <song.json | --demo>
//     [--group N] [--leaf G:N] [--count N] [--midi out.mid]
//     [--config render.json] [--verbose]
//
// With no --group or --leaf the whole song plays. --count widens the
// selection to N consecutive siblings. Without --midi the schedule is only
// printed.

use justly_music::config::RenderConfig;
use justly_music::midi::{MidiFileTransport, describe};
use justly_song::{Player, Selection, Song, TreePath, demo_song};
use std::error::Error;
use std::path::{Path, PathBuf};

const USAGE: &str = "usage: render <song.json | --demo> [--group N] [--leaf G:N] [--count N] \
                     [--midi out.mid] [--config file] [--verbose]";

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    init_logging(verbose);

    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let config = match parse_flag::<PathBuf>(args, "--config") {
        Some(path) => RenderConfig::from_json(&read_file(&path)?)?,
        None => RenderConfig::default(),
    };

    let song = if args.iter().any(|a| a == "--demo") {
        demo_song()?
    } else {
        let Some(path) = args.get(1).filter(|s| !s.starts_with("--")) else {
            return Err(USAGE.into());
        };
        Song::from_json(&read_file(Path::new(path))?)?
    };

    let selection = build_selection(args, &song)?;
    let player = Player::new(config.song.clone());
    let schedule = player.schedule(&song, &selection)?;

    println!("=== Justly Renderer ===");
    println!(
        "Song: {} Hz, {}% volume, {} bpm",
        song.frequency(),
        song.volume_percent(),
        song.tempo()
    );
    println!("Notes: {}", schedule.triggers.len());
    println!("Total time: {:.3}s", schedule.total_time);
    if !schedule.missing_instruments.is_empty() {
        let names: Vec<&str> = schedule.missing_instruments.iter().map(String::as_str).collect();
        println!("Missing instruments (default used): {}", names.join(", "));
    }
    println!();
    for trigger in &schedule.triggers {
        println!("  {}", describe(trigger));
    }

    let midi_path: Option<PathBuf> = parse_flag(args, "--midi");
    if midi_path.is_some() {
        let mut transport = MidiFileTransport::new(
            config.midi.clone(),
            config.song.playback.full_note_volume,
            midi_path,
        );
        player.perform(schedule, &mut transport)?;
    }
    Ok(())
}

/// Selection from --group / --leaf / --count, defaulting to every group.
fn build_selection(args: &[String], song: &Song) -> Result<Selection, Box<dyn Error>> {
    let count: Option<usize> = parse_flag(args, "--count");
    if let Some(value) = parse_flag::<String>(args, "--leaf") {
        let (group, leaf) = value
            .split_once(':')
            .and_then(|(g, l)| Some((g.parse::<usize>().ok()?, l.parse::<usize>().ok()?)))
            .ok_or_else(|| format!("bad --leaf value {value:?}, expected G:N"))?;
        return Ok(Selection::new(TreePath::leaf(group, leaf), count.unwrap_or(1)));
    }
    if let Some(group) = parse_flag::<usize>(args, "--group") {
        return Ok(Selection::new(TreePath::group(group), count.unwrap_or(1)));
    }
    let groups = song.row_count(&TreePath::root())?;
    Ok(Selection::new(TreePath::group(0), count.unwrap_or(groups)))
}

fn read_file(path: &Path) -> Result<String, Box<dyn Error>> {
    std::fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()).into())
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Writes log records to stderr so they never mix with the printed schedule.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: bool) {
    // Only fails if a logger is already installed.
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        });
    }
}
