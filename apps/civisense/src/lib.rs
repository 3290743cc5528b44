//! # civisense
//!
//! The async side of the CiviSense field app: everything that waits on a
//! clock or a socket. The offline engine lives in `civisense-core`.
//!
//! - `geolocation` - single-shot location fixes with a bounded wait
//! - `sync` - the sync coordinator and its HTTP transport
//! - `api` - a reference remote authority server (axum)
//! - `config` - layered TOML/environment configuration
//! - `cli` - the `civisense` command-line interface

pub mod api;
pub mod cli;
pub mod config;
pub mod geolocation;
pub mod sync;
