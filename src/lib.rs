//! Chatdeck filters, routes and buffers game chat.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the pipeline: filter rules and the engine that applies
//!   them, the tab router, the formatter and suggestor registries, the
//!   per-tab HUD history and the configuration that persists all of it.
//! - [`ui`] defines the styled text value passed between pipeline stages.
//! - [`utils`] collects colour parsing, id generation and logging setup.
//!
//! Hosts construct a [`core::context::ChatContext`] from a loaded
//! [`core::config::Config`] and feed it raw lines. The binary crate
//! (`src/main.rs`) routes through [`crate::cli::main`], which does exactly
//! that for lines read from stdin.

pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
