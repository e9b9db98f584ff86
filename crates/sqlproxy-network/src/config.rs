//! Socket tuning knobs.
//!
//! Loaded by the embedding proxy from its configuration file (TOML or JSON);
//! every field has a default so an empty table is a valid configuration.

use serde::{Deserialize, Serialize};
use sqlproxy_error::{ProxyError, Result};

/// Default `listen(2)` backlog.
pub const DEFAULT_BACKLOG: u32 = 128;
/// Default cap on chunks handed to one `writev(2)` call.
pub const DEFAULT_MAX_IOVECS: usize = 64;
/// Default cap on bytes pulled by one `read()`.
pub const DEFAULT_MAX_READ_CHUNK: usize = 1024 * 1024;

/// Per-socket transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Pending-connection queue length for listening sockets.
    pub backlog: u32,
    /// Disable Nagle's algorithm on connected TCP sockets.
    pub tcp_nodelay: bool,
    /// Maximum number of queued chunks written by one vectored write.
    pub max_iovecs: usize,
    /// Maximum number of bytes one `read()` pulls, even if more are pending.
    pub max_read_chunk: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            tcp_nodelay: true,
            max_iovecs: DEFAULT_MAX_IOVECS,
            max_read_chunk: DEFAULT_MAX_READ_CHUNK,
        }
    }
}

impl NetworkConfig {
    /// Reject values that would make a socket unusable.
    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 {
            return Err(ProxyError::Config("backlog must be at least 1".to_owned()));
        }
        if self.max_iovecs == 0 {
            return Err(ProxyError::Config("max_iovecs must be at least 1".to_owned()));
        }
        if self.max_read_chunk == 0 {
            return Err(ProxyError::Config(
                "max_read_chunk must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Backlog clamped to what `listen(2)` accepts.
    pub(crate) fn listen_backlog(&self) -> i32 {
        i32::try_from(self.backlog).unwrap_or(i32::MAX)
    }
}
