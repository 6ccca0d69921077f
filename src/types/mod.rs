//! Core types shared across the scheduler.
//!
//! - [`id`]: identifier and timestamp types (`TimerId`, `Time`)

pub mod id;

pub use id::{Time, TimerId};
