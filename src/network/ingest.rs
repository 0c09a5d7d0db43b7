//! Network ingestion thread
//!
//! Pulls PCM off the socket and deposits it into the ring buffer. The loop
//! does one blocking receive per iteration, byte-order-corrects the chunk
//! before the ring lock is ever taken, and throttles instead of reading when
//! the buffer is already above the high-water mark. The swap runs here
//! because this thread has no deadline; the render callback does.

use std::io::Read;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::RingBuffer;
use crate::audio::format::StreamFormat;
use crate::constants::{RECV_CHUNK_SIZE, THROTTLE_SLEEP_MS};
use crate::error::NetworkError;

/// Ingestion tuning knobs
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Throttle threshold: skip the receive while `available` is at or
    /// above this many bytes
    pub high_water: usize,
    /// Upper bound on a single receive
    pub chunk_size: usize,
    /// Sleep while throttled
    pub throttle: Duration,
}

impl IngestConfig {
    pub fn new(high_water: usize) -> Self {
        Self {
            high_water,
            chunk_size: RECV_CHUNK_SIZE,
            throttle: Duration::from_millis(THROTTLE_SLEEP_MS),
        }
    }
}

/// Owns the thread that feeds the ring buffer from the socket
pub struct NetworkIngest {
    running: Arc<AtomicBool>,
    bytes_received: Arc<AtomicU64>,
    /// Second handle to the same socket; `stop` shuts it down so a read
    /// parked on an idle connection returns instead of blocking the join
    shutdown_handle: TcpStream,
    thread_handle: Option<JoinHandle<()>>,
}

impl NetworkIngest {
    /// Spawn the ingestion thread over a connected stream
    ///
    /// The thread exits on its own when the connection closes or errors;
    /// there is no reconnect. `stop` (or drop) also ends it via the running
    /// flag, checked once per iteration.
    pub fn spawn(
        stream: TcpStream,
        ring: Arc<RingBuffer>,
        format: StreamFormat,
        config: IngestConfig,
    ) -> Result<Self, NetworkError> {
        let shutdown_handle = stream
            .try_clone()
            .map_err(|e| NetworkError::SocketCreation(e.to_string()))?;
        let running = Arc::new(AtomicBool::new(true));
        let bytes_received = Arc::new(AtomicU64::new(0));

        let running_for_loop = running.clone();
        let running_for_exit = running.clone();
        let bytes_counter = bytes_received.clone();

        let handle = thread::Builder::new()
            .name("net-ingest".to_string())
            .spawn(move || {
                ingest_loop(
                    stream,
                    ring,
                    format,
                    config,
                    running_for_loop,
                    bytes_counter,
                );
                // Mark the thread dead so the supervisor can observe the
                // degradation without joining
                running_for_exit.store(false, Ordering::SeqCst);
            })
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        Ok(Self {
            running,
            bytes_received,
            shutdown_handle,
            thread_handle: Some(handle),
        })
    }

    /// Whether the ingestion loop is still alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total bytes deposited since spawn
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Signal the loop to exit and join it
    ///
    /// The worker may be parked in a blocking receive on an idle
    /// connection; shutting the socket down makes that receive return so
    /// the flag gets re-checked and the join cannot hang.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NetworkIngest {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ingest_loop(
    mut stream: TcpStream,
    ring: Arc<RingBuffer>,
    format: StreamFormat,
    config: IngestConfig,
    running: Arc<AtomicBool>,
    bytes_received: Arc<AtomicU64>,
) {
    tracing::debug!("Ingestion thread started");
    let mut chunk = vec![0u8; config.chunk_size];
    // A receive can end mid-sample; the dangling byte is carried into the
    // next iteration so the 16-bit swap never loses alignment
    let mut carry = 0usize;

    while running.load(Ordering::SeqCst) {
        // Backpressure: above high water, let playback drain instead of
        // pulling more off the wire
        if ring.available() >= config.high_water {
            thread::sleep(config.throttle);
            continue;
        }

        let n = match stream.read(&mut chunk[carry..]) {
            Ok(0) => {
                tracing::info!("Stream closed by server");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Receive failed: {}", e);
                break;
            }
        };
        bytes_received.fetch_add(n as u64, Ordering::Relaxed);

        let total = carry + n;
        let aligned = total & !1;

        // Correct byte order before taking the ring lock; per-sample work
        // stays off the real-time path and outside the critical section
        format.correct_wire_order(&mut chunk[..aligned]);

        let written = ring.write(&chunk[..aligned]);
        if written < aligned {
            tracing::trace!("Ring overflow: dropped {} bytes", aligned - written);
        }

        if total != aligned {
            chunk[0] = chunk[aligned];
            carry = 1;
        } else {
            carry = 0;
        }
    }

    tracing::debug!("Ingestion thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::ByteOrder;
    use std::io::Write;
    use std::net::TcpListener;

    fn native_format() -> StreamFormat {
        StreamFormat {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            wire_order: ByteOrder::native(),
        }
    }

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn deposits_received_bytes_into_ring() {
        let (client, mut server) = connected_pair();
        let ring = Arc::new(RingBuffer::new(4096));

        let mut ingest = NetworkIngest::spawn(
            client,
            ring.clone(),
            native_format(),
            IngestConfig::new(2048),
        )
        .unwrap();

        let payload: Vec<u8> = (0u8..=255).cycle().take(512).collect();
        server.write_all(&payload).unwrap();
        server.flush().unwrap();

        // Wait for the loop to pick everything up
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ring.available() < payload.len() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let mut out = vec![0u8; payload.len()];
        assert!(ring.read_into(&mut out));
        assert_eq!(out, payload);
        assert_eq!(ingest.bytes_received(), payload.len() as u64);

        ingest.stop();
    }

    #[test]
    fn loop_exits_when_server_closes() {
        let (client, server) = connected_pair();
        let ring = Arc::new(RingBuffer::new(4096));

        let ingest = NetworkIngest::spawn(
            client,
            ring,
            native_format(),
            IngestConfig::new(2048),
        )
        .unwrap();

        drop(server);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ingest.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!ingest.is_running());
    }

    #[test]
    fn stop_returns_while_connection_is_idle() {
        let (client, server) = connected_pair();
        let ring = Arc::new(RingBuffer::new(4096));

        let mut ingest = NetworkIngest::spawn(
            client,
            ring,
            native_format(),
            IngestConfig::new(2048),
        )
        .unwrap();

        // Let the loop park in the blocking receive; the peer stays
        // connected and silent
        thread::sleep(Duration::from_millis(50));

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        thread::spawn(move || {
            ingest.stop();
            let _ = done_tx.send(());
        });

        assert!(
            done_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
            "stop() blocked on an idle connection"
        );
        drop(server);
    }

    #[test]
    fn swapped_wire_order_is_corrected_before_the_ring() {
        let wire = match ByteOrder::native() {
            ByteOrder::LittleEndian => ByteOrder::BigEndian,
            ByteOrder::BigEndian => ByteOrder::LittleEndian,
        };
        let format = StreamFormat {
            wire_order: wire,
            ..native_format()
        };

        let (client, mut server) = connected_pair();
        let ring = Arc::new(RingBuffer::new(4096));

        let mut ingest =
            NetworkIngest::spawn(client, ring.clone(), format, IngestConfig::new(2048)).unwrap();

        server.write_all(&[0x12, 0x34, 0xab, 0xcd]).unwrap();
        server.flush().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ring.available() < 4 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let mut out = [0u8; 4];
        assert!(ring.read_into(&mut out));
        assert_eq!(out, [0x34, 0x12, 0xcd, 0xab]);

        ingest.stop();
    }
}
