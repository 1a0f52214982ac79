//! The `utils` module provides shared definitions used across the
//! `mqtt-bench` harness: the error taxonomy and logging setup.

pub mod error;
pub mod logging;
