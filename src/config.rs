//! Application configuration
//!
//! Loaded from `player.toml` in the platform config directory when present,
//! defaults otherwise. A server address supplied on the command line
//! overrides the configured one.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::constants::*;
use crate::error::Error;

/// Network section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Stream server address
    pub server: IpAddr,
    /// Stream server port
    pub port: u16,
    /// Connection attempts before giving up
    pub connect_attempts: u32,
    /// Delay between attempts in milliseconds
    pub connect_retry_delay_ms: u64,
    /// Kernel receive buffer size in bytes
    pub recv_buffer_size: usize,
    /// Bytes per blocking receive
    pub chunk_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server: IpAddr::from([127, 0, 0, 1]),
            port: STREAM_PORT,
            connect_attempts: CONNECT_MAX_ATTEMPTS,
            connect_retry_delay_ms: CONNECT_RETRY_DELAY_MS,
            recv_buffer_size: SOCKET_RECV_BUFFER,
            chunk_size: RECV_CHUNK_SIZE,
        }
    }
}

/// Buffer section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Ring buffer capacity in bytes
    pub capacity: usize,
    /// Pre-roll threshold in bytes
    pub low_water: usize,
    /// Ingestion throttle threshold in bytes
    pub high_water: usize,
    /// Throttle sleep in milliseconds
    pub throttle_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: RING_CAPACITY,
            low_water: LOW_WATER_MARK,
            high_water: HIGH_WATER_MARK,
            throttle_ms: THROTTLE_SLEEP_MS,
        }
    }
}

/// Audio section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub buffer: BufferConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Path of the optional config file
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lan-pcm-player")
            .map(|dirs| dirs.config_dir().join("player.toml"))
    }

    /// Load from the config file if it exists, defaults otherwise
    pub fn load() -> Result<Self, Error> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject watermark/capacity orderings the data plane cannot honor
    pub fn validate(&self) -> Result<(), Error> {
        if self.buffer.low_water > self.buffer.capacity {
            return Err(Error::Config(
                "buffer.low_water exceeds buffer.capacity".into(),
            ));
        }
        if self.buffer.high_water > self.buffer.capacity {
            return Err(Error::Config(
                "buffer.high_water exceeds buffer.capacity".into(),
            ));
        }
        if self.buffer.low_water >= self.buffer.high_water {
            return Err(Error::Config(
                "buffer.low_water must be below buffer.high_water".into(),
            ));
        }
        if self.audio.bits_per_sample != 16 {
            return Err(Error::Config(
                "only 16-bit PCM is supported on the wire".into(),
            ));
        }
        Ok(())
    }

    /// Stream server socket address
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.network.server, self.network.port)
    }
}
