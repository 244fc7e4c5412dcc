// MIDI output from playback schedules.
//
// Converts a `PlaybackSchedule` into a Standard MIDI File (SMF) so a song can
// be rendered without an audio device. The schedule is in seconds and Hz;
// MIDI is in ticks and equal-tempered keys, so each trigger becomes:
// - a key: the nearest equal-tempered note to its frequency, plus the
//   remaining offset in cents, which is sent as a pitch bend so just
//   intervals survive the trip;
// - a velocity: its amplitude as a fraction of a full-volume note;
// - a tick span from a fixed seconds-to-ticks clock (`MidiConfig::tempo_bpm`).
//
// Pitch bend is per channel, so notes are spread round-robin over the 15
// melodic channels (channel 10 is drums). Chords wider than that share
// channels and may share a bend. Each leaf instrument name maps to a General
// MIDI program through `MidiConfig::programs`.
//
// Negative start times (possible when a group has negative beats) clamp to
// tick 0.
//
// Uses the `midly` crate for MIDI writing. Output is SMF Format 1: a tempo
// track followed by one note track.

use justly_song::{AudioTransport, PlaybackSchedule, SongError, Trigger};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, Track, TrackEvent,
    TrackEventKind,
    num::{u4, u7, u14, u15, u24, u28},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// MIDI key of A4.
const A4_KEY: f64 = 69.0;
const A4_FREQUENCY: f64 = 440.0;
const CENTS_PER_SEMITONE: f64 = 100.0;
/// Pitch bend range assumed by General MIDI receivers, in cents either way.
const BEND_RANGE_CENTS: f64 = 200.0;
const BEND_CENTER: i32 = 8192;
const BEND_MAX: i32 = 16383;
const MAX_VELOCITY: f64 = 127.0;
const DRUM_CHANNEL: u8 = 9;
/// Largest tick an SMF can reach: delta times are 28-bit.
const MAX_TICK: u32 = 0x0FFF_FFFF;
const MICROSECONDS_PER_MINUTE: u32 = 60_000_000;
/// Slowest tempo whose microseconds-per-quarter fits in 24 bits.
const MIN_TEMPO_BPM: u32 = 4;
const MAX_TICKS_PER_QUARTER: u16 = 0x7FFF;

/// How schedules are laid out as MIDI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Clamped to 1..=32767.
    pub ticks_per_quarter: u16,
    /// Clock used to turn seconds into ticks. It only changes how the file
    /// looks in a sequencer. Clamped to 4..=60_000_000.
    pub tempo_bpm: u32,
    /// Emit pitch bends for the cents offset of each note.
    pub pitch_bend: bool,
    /// General MIDI program for instruments not listed in `programs`.
    pub default_program: u8,
    /// Instrument name to General MIDI program.
    pub programs: BTreeMap<String, u8>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter: 480,
            tempo_bpm: 120,
            pitch_bend: true,
            default_program: 0,
            programs: BTreeMap::new(),
        }
    }
}

impl MidiConfig {
    fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter.clamp(1, MAX_TICKS_PER_QUARTER)
    }

    fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm.clamp(MIN_TEMPO_BPM, MICROSECONDS_PER_MINUTE)
    }

    fn microseconds_per_quarter(&self) -> u32 {
        MICROSECONDS_PER_MINUTE / self.tempo_bpm()
    }

    /// Tick for `seconds`, with negative times at 0. Times past the last
    /// tick a file can address are an error.
    fn seconds_to_ticks(&self, seconds: f64) -> Result<u32, SongError> {
        let ticks_per_second =
            f64::from(self.ticks_per_quarter()) * f64::from(self.tempo_bpm()) / 60.0;
        let ticks = (seconds.max(0.0) * ticks_per_second).round();
        if !ticks.is_finite() || ticks > f64::from(MAX_TICK) {
            return Err(SongError::Transport(format!(
                "time {seconds}s is beyond the end of a MIDI file"
            )));
        }
        Ok(ticks as u32)
    }

    fn program_for(&self, instrument: &str) -> u8 {
        self.programs
            .get(instrument)
            .copied()
            .unwrap_or(self.default_program)
            .min(127)
    }
}

/// Nearest MIDI key to `frequency` and the remaining offset in cents.
pub fn frequency_to_key(frequency: f64) -> (u8, f64) {
    let exact = A4_KEY + 12.0 * (frequency / A4_FREQUENCY).log2();
    let key = exact.round().clamp(0.0, 127.0);
    (key as u8, (exact - key) * CENTS_PER_SEMITONE)
}

/// Velocity for `amplitude`, where `full_note_volume` maps to 127. Audible
/// notes never drop to velocity 0, which MIDI treats as a note-off.
pub fn amplitude_to_velocity(amplitude: f64, full_note_volume: f64) -> u8 {
    if full_note_volume <= 0.0 {
        return MAX_VELOCITY as u8;
    }
    (amplitude / full_note_volume * MAX_VELOCITY)
        .round()
        .clamp(1.0, MAX_VELOCITY) as u8
}

fn bend_for_cents(cents: f64) -> u16 {
    let offset = (cents / BEND_RANGE_CENTS * f64::from(BEND_CENTER)).round() as i32;
    (BEND_CENTER + offset).clamp(0, BEND_MAX) as u16
}

fn melodic_channels() -> Vec<u8> {
    (0..16).filter(|&channel| channel != DRUM_CHANNEL).collect()
}

/// Absolute-tick event before delta encoding. `rank` orders events sharing
/// a tick: note-offs first, then setup, then note-ons.
struct Timed {
    tick: u32,
    rank: u8,
    kind: TrackEventKind<'static>,
}

fn note_events(
    schedule: &PlaybackSchedule,
    config: &MidiConfig,
    full_note_volume: f64,
) -> Result<Vec<Timed>, SongError> {
    let channels = melodic_channels();
    let mut programs: BTreeMap<u8, u8> = BTreeMap::new();
    let mut bends: BTreeMap<u8, u16> = BTreeMap::new();
    let mut events = Vec::with_capacity(schedule.triggers.len() * 4);

    for (index, trigger) in schedule.triggers.iter().enumerate() {
        let channel = channels[index % channels.len()];
        let (key, cents) = frequency_to_key(trigger.frequency);
        let on = config.seconds_to_ticks(trigger.start_time)?;
        let off = config.seconds_to_ticks(trigger.end_time())?.max(on.saturating_add(1));
        if off > MAX_TICK {
            return Err(SongError::Transport(format!(
                "note at {}s ends beyond the end of a MIDI file",
                trigger.start_time
            )));
        }
        let midi = |message| TrackEventKind::Midi {
            channel: u4::new(channel),
            message,
        };

        let program = config.program_for(&trigger.instrument);
        if programs.insert(channel, program) != Some(program) {
            events.push(Timed {
                tick: on,
                rank: 1,
                kind: midi(MidiMessage::ProgramChange {
                    program: u7::new(program),
                }),
            });
        }
        if config.pitch_bend {
            let bend = bend_for_cents(cents);
            if bends.insert(channel, bend) != Some(bend) {
                events.push(Timed {
                    tick: on,
                    rank: 2,
                    kind: midi(MidiMessage::PitchBend {
                        bend: PitchBend(u14::new(bend)),
                    }),
                });
            }
        }
        events.push(Timed {
            tick: on,
            rank: 3,
            kind: midi(MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(amplitude_to_velocity(trigger.amplitude, full_note_volume)),
            }),
        });
        events.push(Timed {
            tick: off,
            rank: 0,
            kind: midi(MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            }),
        });
    }
    // Stable, so same-tick same-rank events keep trigger order.
    events.sort_by_key(|event| (event.tick, event.rank));
    Ok(events)
}

/// Convert a schedule to an in-memory SMF. Fails if a note lies beyond the
/// tick range an SMF can express.
pub fn schedule_to_smf(
    schedule: &PlaybackSchedule,
    config: &MidiConfig,
    full_note_volume: f64,
) -> Result<Smf<'static>, SongError> {
    let events = note_events(schedule, config, full_note_volume)?;
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(config.ticks_per_quarter())),
    ));

    // Track 0: tempo track
    let tempo_microseconds = config.microseconds_per_quarter();
    let tempo_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    let mut track: Track<'static> = Vec::new();
    let mut last_tick = 0;
    for event in events {
        track.push(TrackEvent {
            delta: u28::new(event.tick - last_tick),
            kind: event.kind,
        });
        last_tick = event.tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);
    Ok(smf)
}

/// Encode a schedule as SMF bytes.
pub fn schedule_to_bytes(
    schedule: &PlaybackSchedule,
    config: &MidiConfig,
    full_note_volume: f64,
) -> Result<Vec<u8>, SongError> {
    let smf = schedule_to_smf(schedule, config, full_note_volume)?;
    let mut buf = Vec::new();
    smf.write(&mut buf).map_err(transport_error)?;
    Ok(buf)
}

/// Convert a schedule to MIDI and write it to a file.
pub fn write_midi(
    schedule: &PlaybackSchedule,
    config: &MidiConfig,
    full_note_volume: f64,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let buf = schedule_to_bytes(schedule, config, full_note_volume)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// An `AudioTransport` that renders to a MIDI file instead of a device.
///
/// `start` encodes the batch, `wait` returns immediately (there is nothing
/// to listen to), and `stop` writes the file if a path was given. The
/// encoded bytes stay available through `bytes()` either way.
pub struct MidiFileTransport {
    config: MidiConfig,
    full_note_volume: f64,
    path: Option<PathBuf>,
    bytes: Option<Vec<u8>>,
    notes: usize,
}

impl MidiFileTransport {
    pub fn new(config: MidiConfig, full_note_volume: f64, path: Option<PathBuf>) -> Self {
        Self {
            config,
            full_note_volume,
            path,
            bytes: None,
            notes: 0,
        }
    }

    /// Encoded SMF of the last batch, once started.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    /// Number of notes in the last batch.
    pub fn notes(&self) -> usize {
        self.notes
    }
}

fn transport_error(error: impl std::fmt::Display) -> SongError {
    SongError::Transport(error.to_string())
}

impl AudioTransport for MidiFileTransport {
    fn start(&mut self, schedule: PlaybackSchedule) -> Result<(), SongError> {
        self.notes = schedule.triggers.len();
        self.bytes = None;
        self.bytes = Some(schedule_to_bytes(&schedule, &self.config, self.full_note_volume)?);
        Ok(())
    }

    fn wait(&mut self, hold: std::time::Duration) -> Result<(), SongError> {
        log::debug!("rendering offline; skipping {hold:?} hold");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SongError> {
        let (Some(path), Some(bytes)) = (&self.path, &self.bytes) else {
            return Ok(());
        };
        std::fs::write(path, bytes).map_err(transport_error)?;
        log::info!("wrote {} notes to {}", self.notes, path.display());
        Ok(())
    }
}

/// The notes a schedule would turn into, for printing.
pub fn describe(trigger: &Trigger) -> String {
    let (key, cents) = frequency_to_key(trigger.frequency);
    format!(
        "{:>8.3}s  {:>9.3} Hz  key {:>3} {:>+6.1}c  amp {:.4}  dur {:.3}s  {}",
        trigger.start_time,
        trigger.frequency,
        key,
        cents,
        trigger.amplitude,
        trigger.duration,
        trigger.instrument
    )
}
