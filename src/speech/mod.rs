//! Speech-synthesis boundary (ElevenLabs).

pub mod elevenlabs;

pub use elevenlabs::SpeechClient;
