//! # LAN PCM Player
//!
//! Low-latency playback client for raw PCM streamed over a persistent TCP
//! connection.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          STREAM SERVER                           │
//! │        raw interleaved 16-bit stereo PCM, 44100 Hz, TCP          │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ persistent TCP (port 5001)
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         PLAYER PROCESS                           │
//! │  ┌────────────────────┐                                          │
//! │  │ Connection Manager │  fresh socket per attempt, small recv    │
//! │  │ (network::connect) │  buffer, Nagle off, 15 x 1s retry        │
//! │  └─────────┬──────────┘                                          │
//! │            ▼                                                     │
//! │  ┌────────────────────┐   throttle on high water,                │
//! │  │  Ingestion Thread  │   blocking recv, byte-order fix          │
//! │  │ (network::ingest)  │   BEFORE the lock                        │
//! │  └─────────┬──────────┘                                          │
//! │            ▼ write (clamped on overflow)                         │
//! │  ┌────────────────────┐                                          │
//! │  │    Ring Buffer     │   one mutex, two cursors, byte counter   │
//! │  │  (audio::buffer)   │                                          │
//! │  └─────────┬──────────┘                                          │
//! │            ▼ read (all-or-nothing)                               │
//! │  ┌────────────────────┐                                          │
//! │  │   Render Callback  │   pre-roll / playing / underrun,         │
//! │  │ (audio::playback)  │   silence on shortfall, never blocks     │
//! │  └─────────┬──────────┘                                          │
//! └────────────┼─────────────────────────────────────────────────────┘
//!              ▼
//!       default output device (cpal)
//! ```
//!
//! The two data-plane threads share exactly one thing: the ring buffer.
//! Everything CPU-heavy (byte swapping) happens on the ingestion thread so
//! the render callback is a bounded copy.

pub mod audio;
pub mod config;
pub mod error;
pub mod network;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Target sample rate in Hz
    pub const SAMPLE_RATE: u32 = 44_100;

    /// Channel count (stereo)
    pub const CHANNELS: u16 = 2;

    /// Bits per sample
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Well-known TCP port of the PCM stream server
    pub const STREAM_PORT: u16 = 5001;

    /// Ring buffer capacity in bytes (512 KiB, ~3 s of stereo 16-bit audio)
    pub const RING_CAPACITY: usize = 524_288;

    /// Pre-roll threshold: playback starts once this many bytes are buffered
    pub const LOW_WATER_MARK: usize = 131_072;

    /// Backpressure threshold: ingestion throttles above this fill level
    pub const HIGH_WATER_MARK: usize = 458_752;

    /// Size of a single blocking receive from the socket
    pub const RECV_CHUNK_SIZE: usize = 8_192;

    /// Kernel receive buffer size; kept small so TCP flow control paces the
    /// sender to the playback drain rate
    pub const SOCKET_RECV_BUFFER: usize = 16_384;

    /// Maximum connection attempts before giving up
    pub const CONNECT_MAX_ATTEMPTS: u32 = 15;

    /// Delay between connection attempts in milliseconds
    pub const CONNECT_RETRY_DELAY_MS: u64 = 1_000;

    /// Ingestion throttle sleep while the buffer is above high water, in
    /// milliseconds
    pub const THROTTLE_SLEEP_MS: u64 = 10;
}
