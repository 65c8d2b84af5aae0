//! # Rust Telemetry Core Library
//!
//! This crate keeps a bounded, time-indexed view over the most recent span of a
//! live telemetry stream (power, voltage, temperature readings) and lets
//! analytics code read it by index, by timestamp or by slice while new samples
//! keep arriving.
//!
//! ## Crate Structure
//!
//! - **`timeseries`**: The data plane. [`timeseries::OrderedRingBuffer`] maps
//!   timestamps onto a fixed grid of slots, [`timeseries::Resampler`] turns
//!   irregular input into one value per period, and [`timeseries::MovingWindow`]
//!   ties both to an inbound channel and background tasks.
//! - **`config`**: Strongly-typed configuration loaded with `figment` from TOML
//!   and environment variables. See `config::TelemetryConfig`.
//! - **`error`**: The `WindowError` enum shared by every fallible operation.
//! - **`supervisor`**: Helpers that await background tasks and log how they ended.
//! - **`source`**: A mock power source for demos and tests.
//! - **`tracing_setup`**: `tracing-subscriber` initialisation.

pub mod config;
pub mod error;
pub mod source;
pub mod supervisor;
pub mod timeseries;
pub mod tracing_setup;

pub use error::{WindowError, WindowResult};
