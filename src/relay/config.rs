//! Configuration resolution for the SSH relay.
//!
//! This module handles configuration values with a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RELAY_PORT` | 5000 | HTTP/WebSocket listen port |
//! | `SSH_CONNECT_TIMEOUT_MS` | 20000ms | Connect timeout when the client omits one |
//! | `SSH_COMPRESSION` | true | Enable zlib compression |
//! | `SESSION_IDLE_TIMEOUT_SECS` | 1800s | Idle time before a session is reaped |
//! | `SESSION_CHECK_INTERVAL_SECS` | 300s | How often the reaper scans |
//! | `SHUTDOWN_GRACE_SECS` | 10s | Graceful HTTP shutdown window |

use std::env;
use std::time::Duration;

/// Default HTTP/WebSocket listen port
pub const DEFAULT_LISTEN_PORT: u16 = 5000;

/// Default SSH connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Default idle threshold before a session is reaped (30 minutes)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default interval between reaper scans (5 minutes)
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 5 * 60;

/// Default graceful shutdown window in seconds
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Environment variable name for the listen port
pub(crate) const LISTEN_PORT_ENV_VAR: &str = "RELAY_PORT";

/// Environment variable name for the SSH connect timeout
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT_MS";

/// Environment variable name for SSH compression
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";

/// Environment variable name for the reaper idle threshold
pub(crate) const IDLE_TIMEOUT_ENV_VAR: &str = "SESSION_IDLE_TIMEOUT_SECS";

/// Environment variable name for the reaper check interval
pub(crate) const CHECK_INTERVAL_ENV_VAR: &str = "SESSION_CHECK_INTERVAL_SECS";

/// Environment variable name for the shutdown grace period
pub(crate) const SHUTDOWN_GRACE_ENV_VAR: &str = "SHUTDOWN_GRACE_SECS";

/// Parse an environment variable, ignoring unset or malformed values.
fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse::<T>().ok())
}

/// Resolve the listen port with priority: parameter -> env var -> default
pub fn resolve_listen_port(port_param: Option<u16>) -> u16 {
    port_param
        .or_else(|| env_value(LISTEN_PORT_ENV_VAR))
        .unwrap_or(DEFAULT_LISTEN_PORT)
}

/// Resolve the connect timeout with priority: parameter -> env var -> default
pub fn resolve_connect_timeout(timeout_ms_param: Option<u64>) -> Duration {
    // Priority 1: Use parameter if provided
    if let Some(timeout_ms) = timeout_ms_param {
        return Duration::from_millis(timeout_ms);
    }

    // Priority 2: Use environment variable if set
    if let Some(timeout_ms) = env_value::<u64>(CONNECT_TIMEOUT_ENV_VAR) {
        return Duration::from_millis(timeout_ms);
    }

    // Priority 3: Default value
    Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS)
}

/// Resolve the compression setting with priority: parameter -> env var -> default (true)
pub fn resolve_compression(compress_param: Option<bool>) -> bool {
    if let Some(compress) = compress_param {
        return compress;
    }

    if let Ok(env_compress) = env::var(COMPRESSION_ENV_VAR) {
        return env_compress.eq_ignore_ascii_case("true") || env_compress == "1";
    }

    true
}

/// Resolve the reaper idle threshold with priority: parameter -> env var -> default
pub fn resolve_idle_timeout(secs_param: Option<u64>) -> Duration {
    Duration::from_secs(
        secs_param
            .or_else(|| env_value(IDLE_TIMEOUT_ENV_VAR))
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
    )
}

/// Resolve the reaper check interval with priority: parameter -> env var -> default
///
/// A zero interval would spin the reaper, so it falls back to the default.
pub fn resolve_check_interval(secs_param: Option<u64>) -> Duration {
    let secs = secs_param
        .or_else(|| env_value(CHECK_INTERVAL_ENV_VAR))
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Resolve the graceful shutdown window with priority: parameter -> env var -> default
pub fn resolve_shutdown_grace(secs_param: Option<u64>) -> Duration {
    Duration::from_secs(
        secs_param
            .or_else(|| env_value(SHUTDOWN_GRACE_ENV_VAR))
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
    )
}
