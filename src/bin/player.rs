//! PCM Streaming Player
//!
//! Connects to the stream server, buffers enough audio for a clean start,
//! then plays until the stream ends. Usage: `player [server-address]`.

use anyhow::{bail, Context, Result};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_pcm_player::{
    audio::{
        buffer::RingBuffer,
        format::{ByteOrder, StreamFormat},
        playback::{PcmPlayback, PlaybackState},
    },
    config::AppConfig,
    network::{
        connect::{connect_with_retry, RetryPolicy},
        ingest::{IngestConfig, NetworkIngest},
    },
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN PCM Player");

    let mut config = AppConfig::load()?;

    // Optional server address argument overrides the configured one
    if let Some(arg) = std::env::args().nth(1) {
        let server: IpAddr = arg
            .parse()
            .with_context(|| format!("invalid server address '{}'", arg))?;
        config.network.server = server;
    }
    config.validate()?;

    let addr = config.server_addr();
    let format = StreamFormat {
        sample_rate: config.audio.sample_rate,
        channels: config.audio.channels,
        bits_per_sample: config.audio.bits_per_sample,
        // The server pipes s16le
        wire_order: ByteOrder::LittleEndian,
    };

    tracing::info!(
        "Stream: {} Hz, {} ch, {}-bit from {}",
        format.sample_rate,
        format.channels,
        format.bits_per_sample,
        addr
    );

    // Connect before anything else; exhausting the retry schedule is fatal
    let policy = RetryPolicy {
        max_attempts: config.network.connect_attempts,
        delay: Duration::from_millis(config.network.connect_retry_delay_ms),
        recv_buffer_size: config.network.recv_buffer_size,
    };
    let stream = connect_with_retry(addr, &policy).context("could not reach stream server")?;

    // Data plane: one ring buffer shared by exactly two threads
    let ring = Arc::new(RingBuffer::new(config.buffer.capacity));
    let state = Arc::new(PlaybackState::new());

    let mut ingest_config = IngestConfig::new(config.buffer.high_water);
    ingest_config.chunk_size = config.network.chunk_size;
    ingest_config.throttle = Duration::from_millis(config.buffer.throttle_ms);
    let ingest = NetworkIngest::spawn(stream, ring.clone(), format, ingest_config)
        .context("could not start ingestion thread")?;

    // Pre-roll: wait for the initial cushion before touching the hardware
    tracing::info!(
        "Buffering {} bytes before starting playback...",
        config.buffer.low_water
    );
    while ring.available() < config.buffer.low_water {
        if !ingest.is_running() {
            bail!("stream ended during initial buffering");
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    tracing::info!("Buffered {} bytes, starting playback", ring.available());

    // Hardware configuration + render callback registration; failures here
    // are fatal startup errors
    let mut playback = PcmPlayback::new(
        format,
        config.buffer.low_water,
        ring.clone(),
        state.clone(),
    )?;
    playback.start()?;

    tracing::info!("Playing");

    // Supervisory loop: one-time setup is done, idle and report
    let mut stream_ended_logged = false;
    loop {
        std::thread::sleep(Duration::from_secs(5));

        if let Some(err) = playback.check_errors() {
            tracing::error!("Playback stream error: {}", err);
        }

        if !ingest.is_running() && !stream_ended_logged {
            // Degradation path by design: no reconnect, playback drains
            // into steady-state silence
            tracing::warn!("Stream ended; playback will drain into silence");
            stream_ended_logged = true;
        }

        tracing::info!(
            "Stats: buffer {:.0}% | {} frames rendered | {} underruns | {} overflows | {} bytes received",
            ring.fill_level() * 100.0,
            state.frames_rendered(),
            state.underruns(),
            ring.overflow_count(),
            ingest.bytes_received()
        );
    }
}
