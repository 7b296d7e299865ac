pub mod transcode;

/// Sample rate the provider expects for conference playback audio.
pub const PROVIDER_SAMPLE_RATE: u32 = 8000;

/// Media type of stored (already transcoded) message audio.
pub const PROVIDER_AUDIO_MIME: &str = "audio/wav";
