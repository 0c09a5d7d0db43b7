//! PCM playback through the default output device
//!
//! The render callback runs on cpal's real-time thread and must always
//! return a valid (possibly silent) buffer within its time budget. All it
//! does is run the pre-roll/playing/underrun state machine and copy
//! already-corrected bytes out of the ring; byte swapping happened on the
//! ingestion thread.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::RingBuffer;
use crate::audio::device::get_default_output_device;
use crate::audio::format::StreamFormat;
use crate::error::AudioError;

/// Playback diagnostics, mutated only by the render callback
#[derive(Default)]
pub struct PlaybackState {
    /// False during pre-roll, true once the pre-buffer threshold was reached
    is_playing: AtomicBool,
    /// Cumulative frames delivered to the device
    frames_rendered: AtomicU64,
    /// Callbacks that had to substitute silence while playing
    underruns: AtomicUsize,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// Fill one render quantum from the ring buffer
///
/// Returns `true` when `out` now holds real audio, `false` when the caller
/// must emit silence instead. Infallible by contract: every shortfall
/// degrades to silence, never to an error. The ring lock is only held inside
/// `read_into`; silence is always written with no lock held.
///
/// State machine:
/// - Pre-roll: below `low_water` and not yet playing, silence without
///   counting an underrun.
/// - The first observation at or above `low_water` flips to Playing, once.
/// - Playing with less than a full quantum available is an underrun: silence,
///   counter bumped, but stays Playing so a transient gap does not force a
///   full re-buffer.
pub fn render_frames(
    ring: &RingBuffer,
    state: &PlaybackState,
    format: &StreamFormat,
    low_water: usize,
    out: &mut [u8],
) -> bool {
    if !state.is_playing.load(Ordering::Relaxed) {
        if ring.available() < low_water {
            return false;
        }
        state.is_playing.store(true, Ordering::Relaxed);
    }

    if ring.read_into(out) {
        let frames = out.len() / format.frame_size();
        state
            .frames_rendered
            .fetch_add(frames as u64, Ordering::Relaxed);
        true
    } else {
        state.underruns.fetch_add(1, Ordering::Relaxed);
        false
    }
}

/// Bound on how long stream construction may take before startup is
/// declared failed
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Floor for the render scratch when the device does not advertise a
/// maximum buffer size
const FALLBACK_SCRATCH_FRAMES: usize = 16_384;

/// Scratch size for the render callback, derived from the device's
/// advertised maximum quantum
fn scratch_capacity(format: &StreamFormat, supported: &cpal::SupportedBufferSize) -> usize {
    let frames = match *supported {
        cpal::SupportedBufferSize::Range { max, .. } => {
            (max as usize).max(FALLBACK_SCRATCH_FRAMES)
        }
        cpal::SupportedBufferSize::Unknown => FALLBACK_SCRATCH_FRAMES,
    };
    format.bytes_for_frames(frames)
}

/// Block until the stream thread acknowledges startup
///
/// A build or play failure, and a thread that never answers at all, are
/// both fatal startup conditions.
fn wait_for_startup(
    ready_rx: &Receiver<Result<(), AudioError>>,
    timeout: Duration,
) -> Result<(), AudioError> {
    match ready_rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(AudioError::StreamError(
            "output stream did not report startup in time".to_string(),
        )),
    }
}

/// Output stream bound to the default device, draining a shared ring buffer
pub struct PcmPlayback {
    format: StreamFormat,
    low_water: usize,
    ring: Arc<RingBuffer>,
    state: Arc<PlaybackState>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
}

impl PcmPlayback {
    /// Configure the hardware: resolve the default output device and check
    /// it against the requested format
    ///
    /// No device at all is fatal; a device that does not advertise the
    /// requested rate is a warning and playback proceeds with the requested
    /// format regardless (wrong pitch beats refusing to play).
    pub fn new(
        format: StreamFormat,
        low_water: usize,
        ring: Arc<RingBuffer>,
        state: Arc<PlaybackState>,
    ) -> Result<Self, AudioError> {
        if format.bits_per_sample != 16 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{}-bit PCM",
                format.bits_per_sample
            )));
        }

        let device = get_default_output_device()?;
        tracing::info!("Output device: {}", device.name);

        if !device.supports(&format) {
            tracing::warn!(
                "Device does not advertise {} Hz / {} ch / i16; requesting it anyway",
                format.sample_rate,
                format.channels
            );
        }

        Ok(Self {
            format,
            low_water,
            ring,
            state,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
        })
    }

    /// Build the output stream and start rendering
    ///
    /// Stream construction happens on a dedicated thread that then parks on
    /// the running flag; dropping the stream at thread exit is what
    /// unregisters the callback. The thread acknowledges startup over a
    /// channel once `play()` succeeded, so configuration failures are
    /// fatal here rather than a log line later; errors after startup are
    /// surfaced by `check_errors`.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let config = StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let ring = self.ring.clone();
        let state = self.state.clone();
        let format = self.format;
        let low_water = self.low_water;
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let device = match get_default_output_device() {
                    Ok(d) => d,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Scratch for the locked copy out of the ring; sized from
                // the device's advertised maximum quantum so the callback
                // never allocates on the hot path
                let supported = device
                    .default_output_config()
                    .map(|cfg| *cfg.buffer_size())
                    .unwrap_or(cpal::SupportedBufferSize::Unknown);
                let mut scratch = vec![0u8; scratch_capacity(&format, &supported)];

                let stream = device.inner().build_output_stream(
                    &config,
                    move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let bytes_needed = out.len() * 2;
                        if bytes_needed > scratch.len() {
                            // Larger quantum than the device ever
                            // advertised; silence beats allocating here
                            out.fill(0);
                            return;
                        }
                        let chunk = &mut scratch[..bytes_needed];

                        if render_frames(&ring, &state, &format, low_water, chunk) {
                            for (slot, pair) in out.iter_mut().zip(chunk.chunks_exact(2)) {
                                *slot = i16::from_ne_bytes([pair[0], pair[1]]);
                            }
                        } else {
                            out.fill(0);
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                            return;
                        }
                        let _ = ready_tx.send(Ok(()));

                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }

                        // Stream drops here, unregistering the callback
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        if let Err(e) = wait_for_startup(&ready_rx, STARTUP_TIMEOUT) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(handle) = self.thread_handle.take() {
                let _ = handle.join();
            }
            return Err(e);
        }

        Ok(())
    }

    /// Stop rendering and drop the stream
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Check for asynchronous stream errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for PcmPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::ByteOrder;

    fn test_format() -> StreamFormat {
        StreamFormat {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            wire_order: ByteOrder::LittleEndian,
        }
    }

    #[test]
    fn preroll_silence_is_not_an_underrun() {
        let ring = RingBuffer::new(64);
        let state = PlaybackState::new();
        let mut out = [0xffu8; 16];

        let rendered = render_frames(&ring, &state, &test_format(), 32, &mut out);

        assert!(!rendered);
        assert!(!state.is_playing());
        assert_eq!(state.underruns(), 0);
        assert_eq!(state.frames_rendered(), 0);
    }

    #[test]
    fn reaching_low_water_starts_playback_once() {
        let ring = RingBuffer::new(64);
        let state = PlaybackState::new();
        ring.write(&[1u8; 32]);

        let mut out = [0u8; 16];
        assert!(render_frames(&ring, &state, &test_format(), 32, &mut out));
        assert!(state.is_playing());
        assert_eq!(state.frames_rendered(), 4);

        // Draining back below low water must not revert to pre-roll
        let mut out = [0u8; 16];
        assert!(render_frames(&ring, &state, &test_format(), 32, &mut out));
        assert!(state.is_playing());
        assert_eq!(state.frames_rendered(), 8);
    }

    #[test]
    fn underrun_while_playing_counts_and_stays_playing() {
        let ring = RingBuffer::new(64);
        let state = PlaybackState::new();
        ring.write(&[1u8; 32]);

        let mut out = [0u8; 32];
        assert!(render_frames(&ring, &state, &test_format(), 32, &mut out));

        // Buffer is now empty; this quantum is an underrun
        let mut out = [0u8; 16];
        assert!(!render_frames(&ring, &state, &test_format(), 32, &mut out));
        assert!(state.is_playing());
        assert_eq!(state.underruns(), 1);
        assert_eq!(state.frames_rendered(), 8);

        // Insufficient reads consume nothing
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn startup_error_from_stream_thread_is_fatal() {
        let (tx, rx) = bounded::<Result<(), AudioError>>(1);
        tx.send(Err(AudioError::StreamError("build failed".into())))
            .unwrap();

        let result = wait_for_startup(&rx, Duration::from_millis(100));
        assert!(matches!(result, Err(AudioError::StreamError(_))));
    }

    #[test]
    fn startup_ack_succeeds() {
        let (tx, rx) = bounded::<Result<(), AudioError>>(1);
        tx.send(Ok(())).unwrap();
        assert!(wait_for_startup(&rx, Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn silent_stream_thread_is_a_fatal_timeout() {
        let (_tx, rx) = bounded::<Result<(), AudioError>>(1);
        let result = wait_for_startup(&rx, Duration::from_millis(50));
        assert!(matches!(result, Err(AudioError::StreamError(_))));
    }

    #[test]
    fn scratch_covers_the_advertised_maximum_quantum() {
        let fmt = test_format();

        let ranged = cpal::SupportedBufferSize::Range {
            min: 64,
            max: 32_768,
        };
        assert!(scratch_capacity(&fmt, &ranged) >= fmt.bytes_for_frames(32_768));

        // Unknown still gets a generous floor
        let unknown = cpal::SupportedBufferSize::Unknown;
        assert!(scratch_capacity(&fmt, &unknown) >= fmt.bytes_for_frames(FALLBACK_SCRATCH_FRAMES));
    }

    #[test]
    fn rendered_bytes_match_ingested_bytes() {
        let ring = RingBuffer::new(64);
        let state = PlaybackState::new();
        let data: Vec<u8> = (0..32).collect();
        ring.write(&data);

        let mut out = vec![0u8; 32];
        assert!(render_frames(&ring, &state, &test_format(), 16, &mut out));
        assert_eq!(out, data);
    }
}
