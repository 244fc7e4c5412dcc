// Justly MIDI Renderer
//
// Turns the playback schedules produced by `justly_song` into Standard MIDI
// Files, so a song can be auditioned in any sequencer without an audio
// device. Just-intonation pitches are kept by pairing each equal-tempered
// key with a per-channel pitch bend.
//
// Architecture:
// - midi.rs: Schedule-to-SMF conversion and `MidiFileTransport`, an
//   `AudioTransport` that writes a file instead of sounding notes
// - config.rs: RenderConfig, the playback and MIDI settings read from one
//   JSON file
//
// The `render` binary (main.rs) loads a song, schedules a selection and
// writes it out through `MidiFileTransport`.

pub mod config;
pub mod midi;
