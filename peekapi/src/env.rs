//! Environment-driven construction.
//!
//! Reading `PEEKAPI_API_KEY`/`PEEKAPI_ENDPOINT` and deciding *when* to
//! auto-wire a client into a specific web framework is the framework
//! glue's job and stays out of scope here. This module only provides the
//! two environment variables' names and the construction call itself, so
//! that glue is a one-line call plus a held guard.

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Error;

pub const API_KEY_ENV_VAR: &str = "PEEKAPI_API_KEY";
pub const ENDPOINT_ENV_VAR: &str = "PEEKAPI_ENDPOINT";

/// Holds a [`Client`] alive and calls [`Client::shutdown_sync`] on drop,
/// so a host's `main` can register process-exit shutdown just by keeping
/// this alive for the process lifetime, without this crate needing an
/// `unsafe` global destructor of its own.
pub struct ShutdownGuard(Client);

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.0.shutdown_sync();
    }
}

impl std::ops::Deref for ShutdownGuard {
    type Target = Client;
    fn deref(&self) -> &Client {
        &self.0
    }
}

/// Returns `None` if either `PEEKAPI_API_KEY` or `PEEKAPI_ENDPOINT` is
/// unset or empty. Otherwise constructs a client from the environment and
/// a guard that shuts it down on drop.
pub fn from_env() -> Option<Result<ShutdownGuard, Error>> {
    let api_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|v| !v.is_empty())?;
    let endpoint = std::env::var(ENDPOINT_ENV_VAR).ok().filter(|v| !v.is_empty())?;

    let config = ClientConfig::builder()
        .api_key(api_key)
        .endpoint(endpoint)
        .build()
        .expect("all required builder fields were supplied");

    Some(Client::new(config).map(ShutdownGuard))
}
