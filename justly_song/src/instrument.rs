// Instruments and the registry that names them.
//
// A `SoundProducer` decides how long a requested note will really sound.
// The scheduler asks it once per note and uses the answer both for the
// trigger it emits and for the song's total time. Producers never touch
// audio themselves; the batch of triggers goes to an `AudioTransport`
// afterwards (see `playback.rs`).
//
// `DefaultInstrument` is an ADSR voice that cannot sound shorter than its
// envelope allows, so it stretches short notes up to
// `EnvelopeConfig::min_duration()`.
//
// `InstrumentRegistry` maps leaf instrument names to producers. It always
// knows `"default"`; `resolve()` falls back to that default for names it
// doesn't know and reports the fallback so the caller can warn and record
// the missing name.

use crate::config::EnvelopeConfig;
use crate::item::DEFAULT_INSTRUMENT;
use std::collections::BTreeMap;

/// Something that can play a note.
pub trait SoundProducer {
    /// Accept a note request and return the duration it will actually sound.
    fn schedule(&self, start: f64, frequency: f64, amplitude: f64, duration: f64) -> f64;
}

/// Built-in envelope voice.
#[derive(Clone, Debug, Default)]
pub struct DefaultInstrument {
    pub envelope: EnvelopeConfig,
}

impl DefaultInstrument {
    pub fn new(envelope: EnvelopeConfig) -> Self {
        Self { envelope }
    }
}

impl SoundProducer for DefaultInstrument {
    fn schedule(&self, _start: f64, _frequency: f64, _amplitude: f64, duration: f64) -> f64 {
        duration.max(self.envelope.min_duration())
    }
}

/// Result of looking up an instrument name.
pub struct Resolved<'a> {
    pub producer: &'a dyn SoundProducer,
    /// True when the name was unknown and the default stands in for it.
    pub fallback: bool,
}

/// Named instruments plus the default used for unknown names.
pub struct InstrumentRegistry {
    default: Box<dyn SoundProducer>,
    named: BTreeMap<String, Box<dyn SoundProducer>>,
}

impl InstrumentRegistry {
    /// A registry holding only the default instrument.
    pub fn new(envelope: EnvelopeConfig) -> Self {
        InstrumentRegistry {
            default: Box::new(DefaultInstrument::new(envelope)),
            named: BTreeMap::new(),
        }
    }

    /// Add or replace a named instrument. Registering `"default"` replaces
    /// the fallback too.
    pub fn register(&mut self, name: &str, producer: Box<dyn SoundProducer>) {
        if name == DEFAULT_INSTRUMENT {
            self.default = producer;
        } else {
            self.named.insert(name.to_string(), producer);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        name == DEFAULT_INSTRUMENT || self.named.contains_key(name)
    }

    /// Every known name, `"default"` first.
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(DEFAULT_INSTRUMENT)
            .chain(self.named.keys().map(String::as_str))
            .collect()
    }

    pub fn resolve(&self, name: &str) -> Resolved<'_> {
        if name == DEFAULT_INSTRUMENT {
            return Resolved {
                producer: self.default.as_ref(),
                fallback: false,
            };
        }
        match self.named.get(name) {
            Some(producer) => Resolved {
                producer: producer.as_ref(),
                fallback: false,
            },
            None => Resolved {
                producer: self.default.as_ref(),
                fallback: true,
            },
        }
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new(EnvelopeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exact;

    impl SoundProducer for Exact {
        fn schedule(&self, _start: f64, _frequency: f64, _amplitude: f64, duration: f64) -> f64 {
            duration
        }
    }

    #[test]
    fn default_instrument_stretches_short_notes() {
        let instrument = DefaultInstrument::default();
        let min = instrument.envelope.min_duration();
        assert_eq!(instrument.schedule(0.0, 220.0, 0.1, 0.0), min);
        assert_eq!(instrument.schedule(0.0, 220.0, 0.1, 1.5), 1.5);
    }

    #[test]
    fn unknown_names_fall_back() {
        let mut registry = InstrumentRegistry::default();
        registry.register("exact", Box::new(Exact));
        assert!(registry.contains("default"));
        assert!(registry.contains("exact"));
        assert!(!registry.contains("theremin"));
        assert_eq!(registry.names(), vec!["default", "exact"]);

        let exact = registry.resolve("exact");
        assert!(!exact.fallback);
        assert_eq!(exact.producer.schedule(0.0, 1.0, 1.0, 0.0), 0.0);

        let missing = registry.resolve("theremin");
        assert!(missing.fallback);
        assert!(missing.producer.schedule(0.0, 1.0, 1.0, 0.0) > 0.0);
    }

    #[test]
    fn registering_default_replaces_fallback() {
        let mut registry = InstrumentRegistry::default();
        registry.register("default", Box::new(Exact));
        assert_eq!(registry.resolve("nope").producer.schedule(0.0, 1.0, 1.0, 0.0), 0.0);
        assert_eq!(registry.names(), vec!["default"]);
    }
}
