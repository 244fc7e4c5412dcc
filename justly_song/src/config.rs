// Data-driven playback configuration.
//
// Every timing and loudness constant the scheduler and the built-in
// instrument use lives in `JustlyConfig`, loadable from JSON. Playback code
// reads from the config rather than hard-coding numbers, so a render can be
// retuned (longer lead-in, softer notes, a snappier envelope) without a
// rebuild.
//
// Two groups:
// - `PlaybackConfig`: the lead-in before the first note (`transition_seconds`)
//   and the amplitude of a note at 100% song volume (`full_note_volume`).
// - `EnvelopeConfig`: the default instrument's ADSR shape and the overlap
//   between consecutive notes. `min_duration()` is the shortest note the
//   envelope can actually sound.
//
// Every field is `#[serde(default)]`, so a config file only lists what it
// changes.
//
// See also: `instrument.rs` for `DefaultInstrument`, `playback.rs` for the
// scheduler and `Player`.

use crate::error::SongError;
use serde::{Deserialize, Serialize};

/// Lead-in and loudness of playback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Silence before the first note, and extra hold after the last, in
    /// seconds.
    pub transition_seconds: f64,
    /// Amplitude of a note at 100% song volume with every volume ratio 1.
    pub full_note_volume: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            transition_seconds: 0.1,
            full_note_volume: 0.2,
        }
    }
}

/// Envelope of the built-in instrument, all times in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub attack: f64,
    pub decay: f64,
    pub release: f64,
    /// Sustain level as a fraction of peak amplitude.
    pub sustain_ratio: f64,
    /// Shortest sustain segment a note may have.
    pub min_sustain: f64,
    /// How far each note's release runs into the next note.
    pub overlap: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack: 0.05,
            decay: 0.2,
            release: 0.1,
            sustain_ratio: 0.6,
            min_sustain: 0.01,
            overlap: 0.1,
        }
    }
}

impl EnvelopeConfig {
    /// Shortest duration a note can be scheduled with.
    pub fn min_duration(&self) -> f64 {
        self.attack + self.decay + self.min_sustain + self.release - self.overlap
    }
}

/// Top-level playback configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JustlyConfig {
    pub playback: PlaybackConfig,
    pub envelope: EnvelopeConfig,
}

impl JustlyConfig {
    pub fn from_json(json: &str) -> Result<Self, SongError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SongError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_min_duration() {
        let envelope = EnvelopeConfig::default();
        assert!((envelope.min_duration() - 0.26).abs() < 1e-12);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = JustlyConfig::from_json(r#"{"envelope": {"attack": 0.1}}"#).unwrap();
        assert_eq!(config.envelope.attack, 0.1);
        assert_eq!(config.envelope.release, 0.1);
        assert_eq!(config.playback, PlaybackConfig::default());

        let empty = JustlyConfig::from_json("{}").unwrap();
        assert_eq!(empty, JustlyConfig::default());
    }

    #[test]
    fn default_config_serializes() {
        let config = JustlyConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(JustlyConfig::from_json(&json).unwrap(), config);
    }
}
