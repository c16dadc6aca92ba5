//! Typed configuration for the endpoint channel subsystem.
//!
//! Values can be loaded from a TOML file via [`ChannelConfig::load`] or
//! constructed directly; every field has a sensible default so an
//! embedder only needs to override what it cares about.

use std::path::Path;
use std::time::Duration;

use ext_config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};

/// 5 MiB: the spec gives no declared upper bound, so this is a
/// conservative default chosen to keep a single frame from exhausting
/// memory on a constrained device.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 5 * 1024 * 1024;

/// The wall-clock deadline the handshake runner honours by default.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// [`crate::stream::Pipe`]'s default chunk size.
pub const DEFAULT_PIPE_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Upper bound on a single frame's payload length.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,

    /// Deadline for the UKEY2-style handshake, in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Chunk size used by the in-memory [`crate::stream::Pipe`].
    #[serde(default = "default_pipe_chunk_bytes")]
    pub pipe_chunk_bytes: usize,
}

impl ChannelConfig {
    /// Loads configuration from a TOML file, falling back to
    /// [`Default::default`] for any field the file omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path.as_ref()))
            .build()?;
        settings.try_deserialize()
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            pipe_chunk_bytes: default_pipe_chunk_bytes(),
        }
    }
}

fn default_max_frame_bytes() -> u32 {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}

fn default_pipe_chunk_bytes() -> usize {
    DEFAULT_PIPE_CHUNK_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ChannelConfig::default();
        assert_eq!(config.max_frame_bytes, 5 * 1024 * 1024);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.pipe_chunk_bytes, 64 * 1024);
    }

    #[test]
    fn toml_round_trip_with_partial_overrides() {
        let toml_str = r#"
            max_frame_bytes = 1048576
        "#;
        let config: ChannelConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_frame_bytes, 1_048_576);
        assert_eq!(config.handshake_timeout_ms, DEFAULT_HANDSHAKE_TIMEOUT_MS);
        assert_eq!(config.pipe_chunk_bytes, DEFAULT_PIPE_CHUNK_BYTES);
    }
}
