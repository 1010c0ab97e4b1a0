//! vocal-split library crate.
//!
//! Splits audio from a remote URL or an upload into vocals and instrumental
//! tracks by running external tools through a fallback chain, caches results
//! by source, and streams per-job progress logs over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod separation;
pub mod utils;

pub use error::{Error, Result};
