//! # splitd
//!
//! Feature-flag side-car daemon. SDK clients on the same host connect over a
//! Unix socket, ask for treatments and report events; impressions and events
//! are queued per client and uploaded in the background.
//!
//! This crate wires the workspace together:
//!
//! - [`config`]: YAML configuration with defaults and validation.
//! - [`flusher`]: single-flight periodic upload workers.
//! - [`recorder`]: HTTP bulk uploader and a log-only fallback.
//! - [`daemon`]: startup, serving and orderly shutdown.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod daemon;
pub mod error;
pub mod flusher;
pub mod recorder;
pub mod shutdown;

pub use config::{CONF_FILE_ENV, Config, load_config};
pub use daemon::{Daemon, DaemonReport};
pub use error::{Error, Result};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};

pub use splitd_core;
pub use splitd_link;
pub use splitd_storage;
