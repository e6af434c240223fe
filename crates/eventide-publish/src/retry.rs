//! Bounded connection retry shared by the publishers.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use eventide_core::error::DomainError;

/// Pause between connection attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(3);
/// Connection attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Calls `connect` up to `max_attempts` times, sleeping `backoff` between
/// attempts, and returns the first successful connection.
///
/// # Errors
///
/// Returns `DomainError::ConnectionExhausted` once every attempt has failed.
pub async fn connect_with_retry<T, E, F, Fut>(
    uri: &str,
    max_attempts: u32,
    backoff: Duration,
    mut connect: F,
) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts = 0;
    while attempts < max_attempts {
        if attempts > 0 {
            tracing::debug!(uri, ?backoff, "waiting before reconnecting");
            tokio::time::sleep(backoff).await;
        }
        attempts += 1;
        match connect().await {
            Ok(connection) => {
                tracing::debug!(uri, attempts, "connected");
                return Ok(connection);
            }
            Err(err) => {
                tracing::warn!(uri, attempt = attempts, max_attempts, error = %err, "connection attempt failed");
            }
        }
    }
    tracing::error!(uri, attempts, "giving up on connection");
    Err(DomainError::ConnectionExhausted {
        uri: uri.to_owned(),
        attempts,
    })
}
