//! Pipeline entry points.
//!
//! - `run_cycle`: fetch, store, parse and classify bulletins for a set of ports
//! - `analyze_latest`: re-assess the last stored bulletin for a port

pub mod cycle;

pub use cycle::{analyze_content, analyze_latest, run_cycle};
