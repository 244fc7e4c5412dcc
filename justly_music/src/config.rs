// Render configuration.
//
// One JSON document carries both the playback settings from `justly_song`
// (flattened, so `playback` and `envelope` stay top-level keys) and the MIDI
// layout under `midi`. Every key is optional; a missing file or `{}` gives
// the defaults.
//
// See also: `justly_song::config` for the playback half, `midi.rs` for
// `MidiConfig`.

use crate::midi::MidiConfig;
use justly_song::{JustlyConfig, SongError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    #[serde(flatten)]
    pub song: JustlyConfig,
    pub midi: MidiConfig,
}

impl RenderConfig {
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
    fn empty_json_gives_defaults() {
        assert_eq!(RenderConfig::from_json("{}").unwrap(), RenderConfig::default());
    }

    #[test]
    fn playback_keys_stay_top_level() {
        let config = RenderConfig::from_json(
            r#"{"playback": {"transition_seconds": 0.5}, "midi": {"tempo_bpm": 60}}"#,
        )
        .unwrap();
        assert_eq!(config.song.playback.transition_seconds, 0.5);
        assert_eq!(config.song.playback.full_note_volume, 0.2);
        assert_eq!(config.midi.tempo_bpm, 60);

        let json = config.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("playback").is_some());
        assert!(value.get("song").is_none());
        assert_eq!(RenderConfig::from_json(&json).unwrap(), config);
    }
}
