// Playback scheduling: from a selection to a batch of timed note triggers.
//
// The tree stores everything relatively. A node's pitch, volume and tempo
// are ratios against whatever came before it, and the absolute values only
// exist after folding those ratios together from the song's globals
// downwards. `schedule()` does that fold over a selection and produces a
// `PlaybackSchedule`: one `Trigger` per note plus the time by which the last
// note has finished sounding.
//
// The fold runs over the song's groups in order. Every group up to the end
// of the selection multiplies into the running key, volume and tempo, even
// groups before the selection, so a passage played from the middle sounds
// the same as it does in context. Only selected groups emit their leaves and
// advance the clock; a group's own beat count drives the clock, and its
// leaves all start together at the group's start (a chord). Selecting leaves
// folds groups up to and including their parent, then emits the selected
// leaves at one shared start time.
//
// Group beats may be zero or negative, stepping the clock backwards. The
// batch is sorted by start time (stably) before hand-off, so consumers always
// see non-decreasing start times.
//
// Scheduling is two-phase: the selection is validated and every note request
// computed first, and only then are instruments asked for their actual
// durations. A selection that fails validation never reaches an instrument.
// That includes folds that leave floating-point range: extreme octaves or
// stacked tiny tempo ratios can drive the key, tempo or clock to infinity or
// zero, and any note or clock that is no longer finite fails the whole
// request with `NonFiniteSchedule`.
//
// `Player` wraps the scheduler with a config and an `InstrumentRegistry`, and
// drives an `AudioTransport`: hand over the batch, hold for the total time
// plus the envelope overlap and two transitions, then stop. Playback blocks
// the caller and cannot be cancelled.
//
// See also: `instrument.rs` for the producers, `config.rs` for the constants.

use crate::config::{JustlyConfig, PlaybackConfig};
use crate::error::SongError;
use crate::instrument::InstrumentRegistry;
use crate::item::{Interval, IntervalItem};
use crate::song::Song;
use crate::types::{GlobalParameter, Level, Selection, TreePath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const SECONDS_PER_MINUTE: f64 = 60.0;
const PERCENT: f64 = 100.0;
const MILLISECONDS_PER_SECOND: f64 = 1000.0;

/// One note, in absolute terms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Seconds from the start of playback.
    pub start_time: f64,
    /// Hz.
    pub frequency: f64,
    pub amplitude: f64,
    /// Seconds, as reported back by the instrument.
    pub duration: f64,
    /// The leaf's instrument name (before any fallback).
    pub instrument: String,
}

impl Trigger {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// The full batch for one playback request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSchedule {
    /// Sorted by `start_time`.
    pub triggers: Vec<Trigger>,
    /// No earlier than the lead-in, and no earlier than any trigger's end.
    pub total_time: f64,
    /// Instrument names that had to fall back to the default.
    pub missing_instruments: BTreeSet<String>,
}

/// A note before its instrument has been consulted.
struct NoteRequest<'a> {
    start_time: f64,
    frequency: f64,
    amplitude: f64,
    duration: f64,
    instrument: &'a str,
}

impl NoteRequest<'_> {
    fn is_finite(&self) -> bool {
        self.start_time.is_finite()
            && self.frequency.is_finite()
            && self.amplitude.is_finite()
            && self.duration.is_finite()
    }
}

/// Fail with `NonFiniteSchedule` at `path` unless `value` is finite.
fn check_finite(value: f64, path: impl FnOnce() -> TreePath) -> Result<(), SongError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SongError::NonFiniteSchedule { path: path() })
    }
}

/// Running absolute values during the fold.
struct Accumulator {
    key: f64,
    volume: f64,
    tempo: f64,
    clock: f64,
}

impl Accumulator {
    fn new(song: &Song, config: &PlaybackConfig) -> Self {
        Accumulator {
            key: f64::from(song.frequency()),
            volume: f64::from(song.volume_percent()) / PERCENT * config.full_note_volume,
            tempo: f64::from(song.tempo()),
            clock: config.transition_seconds,
        }
    }

    fn modulate(&mut self, interval: &Interval) {
        self.key *= interval.pitch_ratio();
        self.volume *= interval.volume_ratio;
        self.tempo *= interval.tempo_ratio;
    }

    fn beat_seconds(&self) -> f64 {
        SECONDS_PER_MINUTE / self.tempo
    }

    /// The request for one leaf, or `NonFiniteSchedule` if the fold has
    /// overflowed or underflowed on the way to it.
    fn note<'a>(
        &self,
        item: &'a IntervalItem,
        path: TreePath,
    ) -> Result<NoteRequest<'a>, SongError> {
        let interval = item.interval();
        let note = NoteRequest {
            start_time: self.clock,
            frequency: self.key * interval.pitch_ratio(),
            amplitude: self.volume * interval.volume_ratio,
            duration: self.beat_seconds() * f64::from(interval.beats),
            instrument: item.instrument().unwrap_or_default(),
        };
        if !note.is_finite() {
            return Err(SongError::NonFiniteSchedule { path });
        }
        Ok(note)
    }
}

/// Fold and collect note requests for `selection`, checking everything that
/// can go wrong.
fn collect_notes<'a>(
    song: &'a Song,
    selection: &Selection,
    config: &PlaybackConfig,
) -> Result<(Vec<NoteRequest<'a>>, f64), SongError> {
    if selection.is_empty() {
        return Err(SongError::EmptySelection);
    }
    let (Some(parent_path), Some(first)) = (selection.first.parent(), selection.first.row()) else {
        return Err(SongError::InvalidPlaybackLevel { level: Level::Root });
    };
    if song.tempo() <= 0 {
        return Err(SongError::InvalidGlobal {
            name: GlobalParameter::Tempo.name(),
            value: song.tempo(),
        });
    }
    let tree = song.tree();
    let parent = tree.resolve(&parent_path)?;
    tree.check_range(parent, first, selection.count)?;
    let end = first + selection.count;

    let mut acc = Accumulator::new(song, config);
    let mut notes = Vec::new();
    match tree.level(parent)? {
        Level::Root => {
            let groups = tree.children(parent)?;
            for (row, &group) in groups.iter().enumerate().take(end) {
                let interval = tree.item(group)?.interval();
                acc.modulate(interval);
                if row < first {
                    continue;
                }
                for (leaf_row, &leaf) in tree.children(group)?.iter().enumerate() {
                    notes.push(acc.note(tree.item(leaf)?, TreePath::leaf(row, leaf_row))?);
                }
                acc.clock += acc.beat_seconds() * f64::from(interval.beats);
                check_finite(acc.clock, || TreePath::group(row))?;
            }
        }
        Level::Group => {
            let root = tree.root();
            let Some(parent_row) = tree.row_of(parent)? else {
                return Err(SongError::IsRoot);
            };
            for &group in tree.children(root)?.iter().take(parent_row + 1) {
                acc.modulate(tree.item(group)?.interval());
            }
            for (offset, &leaf) in tree.children(parent)?[first..end].iter().enumerate() {
                notes.push(acc.note(tree.item(leaf)?, parent_path.child(first + offset))?);
            }
        }
        Level::Leaf => {
            return Err(SongError::InvalidPlaybackLevel { level: Level::Leaf });
        }
    }
    Ok((notes, config.transition_seconds))
}

/// Compute the trigger batch for `selection` (a run of groups or a run of
/// leaves in one group).
pub fn schedule(
    song: &Song,
    selection: &Selection,
    config: &PlaybackConfig,
    registry: &InstrumentRegistry,
) -> Result<PlaybackSchedule, SongError> {
    let (notes, lead_in) = collect_notes(song, selection, config)?;

    let mut result = PlaybackSchedule {
        triggers: Vec::with_capacity(notes.len()),
        total_time: lead_in,
        missing_instruments: BTreeSet::new(),
    };
    for note in notes {
        let resolved = registry.resolve(note.instrument);
        if resolved.fallback && result.missing_instruments.insert(note.instrument.to_string()) {
            log::warn!(
                "instrument {:?} not defined; using the default instrument",
                note.instrument
            );
        }
        let duration = resolved.producer.schedule(
            note.start_time,
            note.frequency,
            note.amplitude,
            note.duration,
        );
        let trigger = Trigger {
            start_time: note.start_time,
            frequency: note.frequency,
            amplitude: note.amplitude,
            duration,
            instrument: note.instrument.to_string(),
        };
        result.total_time = result.total_time.max(trigger.end_time());
        result.triggers.push(trigger);
    }
    result
        .triggers
        .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    log::debug!(
        "scheduled {} notes, total {:.3}s",
        result.triggers.len(),
        result.total_time
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// Output side of playback: receives the batch, then is held open and
/// stopped.
pub trait AudioTransport {
    /// Take ownership of the batch and start sounding it.
    fn start(&mut self, schedule: PlaybackSchedule) -> Result<(), SongError>;

    /// Block while the batch plays.
    fn wait(&mut self, hold: Duration) -> Result<(), SongError> {
        std::thread::sleep(hold);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SongError>;
}

/// Scheduler plus instruments plus timing config.
pub struct Player {
    config: JustlyConfig,
    registry: InstrumentRegistry,
}

impl Default for Player {
    fn default() -> Self {
        Self::new(JustlyConfig::default())
    }
}

impl Player {
    /// A player with only the default instrument, shaped by `config`.
    pub fn new(config: JustlyConfig) -> Self {
        let registry = InstrumentRegistry::new(config.envelope.clone());
        Player { config, registry }
    }

    pub fn with_registry(config: JustlyConfig, registry: InstrumentRegistry) -> Self {
        Player { config, registry }
    }

    pub fn config(&self) -> &JustlyConfig {
        &self.config
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut InstrumentRegistry {
        &mut self.registry
    }

    pub fn schedule(
        &self,
        song: &Song,
        selection: &Selection,
    ) -> Result<PlaybackSchedule, SongError> {
        schedule(song, selection, &self.config.playback, &self.registry)
    }

    /// How long to keep the transport open for a batch lasting `total_time`
    /// seconds: the total plus the envelope overlap, rounded up to whole
    /// milliseconds, plus a transition on either side.
    pub fn hold_duration(&self, total_time: f64) -> Duration {
        let transition_ms = (self.config.playback.transition_seconds * MILLISECONDS_PER_SECOND)
            .round()
            .max(0.0) as u64;
        let sounding = (total_time + self.config.envelope.overlap) * MILLISECONDS_PER_SECOND;
        // Shave float noise so 1400.0000000000002 rounds up to 1400, not 1401.
        // Float-to-int `as` saturates, so an absurd total clamps to u64::MAX.
        let sounding_ms = (sounding - 1e-6).ceil().max(0.0) as u64;
        Duration::from_millis(sounding_ms.saturating_add(transition_ms.saturating_mul(2)))
    }

    /// Hand a prepared batch to `transport`, hold, and stop. Returns the
    /// batch's total time.
    pub fn perform(
        &self,
        schedule: PlaybackSchedule,
        transport: &mut dyn AudioTransport,
    ) -> Result<f64, SongError> {
        let total_time = schedule.total_time;
        let hold = self.hold_duration(total_time);
        transport.start(schedule)?;
        transport.wait(hold)?;
        transport.stop()?;
        Ok(total_time)
    }

    /// Schedule `selection` and play it to completion.
    pub fn play(
        &self,
        song: &Song,
        selection: &Selection,
        transport: &mut dyn AudioTransport,
    ) -> Result<f64, SongError> {
        let schedule = self.schedule(song, selection)?;
        self.perform(schedule, transport)
    }
}
