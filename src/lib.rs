//! GitMind - repository engine for a git history browser
//!
//! Watches a working folder, keeps a debounced and deduplicated view of
//! its status, turns commit patches into before/after files for external
//! diff tools, and caches the repository model on disk.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{GitMindError, Result};

/// Initialize tracing; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gitmind=debug,gitmind_lib=debug,git2=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
