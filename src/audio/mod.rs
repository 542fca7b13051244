//! Speech playback: decoding, output sink, and the playback coordinator.
//!
//! [`player::SpeechPlayer`] enforces at-most-one synthesized-speech
//! playback process-wide and broadcasts state to any number of
//! observers; [`sink::CpalSink`] drives the actual output device.

pub mod decode;
pub mod player;
pub mod sink;

pub use player::{PlaybackState, PlaybackStatus, SpeechPlayer};
pub use sink::{AudioSink, CpalSink};
