//! TCP connection establishment with bounded retry
//!
//! The stream server may still be warming up when the client launches, so
//! connect attempts are retried on a fixed schedule. Each attempt uses a
//! fresh socket; a socket that failed to connect is discarded. The receive
//! buffer is deliberately small: with a shallow kernel buffer, TCP flow
//! control paces the sender to the ring buffer's drain rate instead of
//! letting it burst ahead.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::constants::{CONNECT_MAX_ATTEMPTS, CONNECT_RETRY_DELAY_MS, SOCKET_RECV_BUFFER};
use crate::error::NetworkError;

/// Connection retry schedule
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Kernel receive buffer size applied to every attempt's socket
    pub recv_buffer_size: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: CONNECT_MAX_ATTEMPTS,
            delay: Duration::from_millis(CONNECT_RETRY_DELAY_MS),
            recv_buffer_size: SOCKET_RECV_BUFFER,
        }
    }
}

/// Open a fresh socket with the stream options applied
fn fresh_socket(addr: &SocketAddr, policy: &RetryPolicy) -> Result<Socket, NetworkError> {
    let domain = Domain::for_address(*addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| NetworkError::SocketCreation(e.to_string()))?;

    // Flow control: small kernel buffer, and no send coalescing on the
    // server's acks either
    if let Err(e) = socket.set_recv_buffer_size(policy.recv_buffer_size) {
        tracing::warn!("Failed to shrink receive buffer: {}", e);
    }
    if let Err(e) = socket.set_nodelay(true) {
        tracing::warn!("Failed to disable Nagle: {}", e);
    }

    Ok(socket)
}

/// Connect to the stream server, retrying on a fixed schedule
///
/// Exhausting the attempt ceiling is a fatal startup condition; there is no
/// partial-success mode. The returned stream is blocking, matching the
/// ingestion thread's one-blocking-receive-per-iteration loop.
pub fn connect_with_retry(
    addr: SocketAddr,
    policy: &RetryPolicy,
) -> Result<TcpStream, NetworkError> {
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        let socket = fresh_socket(&addr, policy)?;

        match socket.connect(&addr.into()) {
            Ok(()) => {
                tracing::info!("Connected to {} on attempt {}", addr, attempt);
                return Ok(socket.into());
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::info!(
                    "Connect to {} failed (attempt {}/{}): {}; retrying in {:?}",
                    addr,
                    attempt,
                    policy.max_attempts,
                    last_error,
                    policy.delay
                );
                // Failed socket is dropped, never reused
                if attempt < policy.max_attempts {
                    std::thread::sleep(policy.delay);
                }
            }
        }
    }

    Err(NetworkError::ConnectionFailed {
        attempts: policy.max_attempts,
        reason: last_error,
    })
}
