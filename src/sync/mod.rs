//! Synchronization primitives used by the dispatcher.

pub mod gate;

pub use gate::Gate;
