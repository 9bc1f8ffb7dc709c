//! beams-cli library: the embedding environment of the core.
//!
//! Configuration, the HTTP remote, the on-disk checkout and its watcher. The
//! `xray-beams` binary is a thin layer over these.

pub mod client;
pub mod config;
pub mod native_fs;
pub mod watcher;

pub use client::JiraClient;
pub use config::{Config, ConfigError};
pub use native_fs::{Checkout, CheckoutError};
pub use watcher::{FileEvent, FileEventKind, FileWatcher};
