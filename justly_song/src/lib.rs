// justly_song: ratio-based song model with undoable editing and playback scheduling.
//
// A Justly song is a tree of just-intonation intervals three levels deep:
// the root, groups (chords) under it, and leaves (notes) under each group.
// Every node stores its pitch, volume and tempo *relative* to what came
// before, and absolute values appear only when the playback scheduler folds
// those ratios together. This crate has no audio, GUI or file-system
// dependencies; it can be tested and benchmarked headless.
//
// Module overview:
// - `types.rs`:      NodeId, Level, TreePath / Locator / Selection, Field, Role,
//                    CellValue, GlobalParameter.
// - `item.rs`:       Interval data and the Group / Leaf tagged item, with per-field rules.
// - `tree.rs`:       SongTree arena (structural ops, deep copy, field access)
//                    and detached Subtrees.
// - `record.rs`:     Persisted JSON layout (SongRecord / NodeRecord) and validation on load.
// - `event.rs`:      ChangeSink trait, SongEvent, and the recording EventLog.
// - `song.rs`:       Song document: the single mutation boundary, emitting change notifications.
// - `command.rs`:    SongCommand (apply / revert) and the linear UndoHistory.
// - `editor.rs`:     Editor session: history + clipboard + event log, menu-style operations.
// - `config.rs`:     JustlyConfig: playback timing, loudness and envelope constants.
// - `instrument.rs`: SoundProducer trait, DefaultInstrument, InstrumentRegistry.
// - `playback.rs`:   The scheduler, PlaybackSchedule / Trigger, Player, AudioTransport.
// - `error.rs`:      SongError.
//
// The companion crate `justly_music` renders schedules to MIDI and provides
// the `render` command-line tool.
//
// **Critical constraint: tree shape.** The root holds only groups, groups
// hold only leaves, leaves hold nothing. Every mutation validates this before
// changing anything, so a failed call never leaves a half-edited tree.

pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod event;
pub mod instrument;
pub mod item;
pub mod playback;
pub mod record;
pub mod song;
pub mod tree;
pub mod types;

// Re-export key types at crate root for convenience.
pub use command::{SongCommand, UndoHistory};
pub use config::JustlyConfig;
pub use editor::Editor;
pub use error::SongError;
pub use event::{ChangeSink, EventLog, SongEvent};
pub use playback::{AudioTransport, PlaybackSchedule, Player, Trigger};
pub use song::Song;
pub use types::{CellValue, Field, GlobalParameter, Level, Locator, Role, Selection, TreePath};

/// The demo song embedded at compile time.
pub const DEMO_SONG_JSON: &str = include_str!("../data/demo_song.json");

/// Parse the embedded demo song.
pub fn demo_song() -> Result<Song, SongError> {
    Song::from_json(DEMO_SONG_JSON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_song_loads() {
        let song = demo_song().unwrap();
        assert_eq!(song.row_count(&TreePath::root()).unwrap(), 4);
        assert_eq!(song.row_count(&TreePath::group(3)).unwrap(), 4);
        assert_eq!(
            song.cell_read(&Locator::new(TreePath::leaf(2, 2), Field::Instrument), Role::Display)
                .unwrap(),
            Some(CellValue::from("flute"))
        );
    }
}
