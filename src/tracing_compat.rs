//! Optional `tracing` integration.
//!
//! With the `tracing-integration` feature enabled these are the `tracing`
//! macros. Without it they expand to nothing, so call sites carry no cost and
//! the crate builds without the `tracing` dependency.

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __tickless_trace_noop {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::__tickless_trace_noop as debug;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__tickless_trace_noop as error;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__tickless_trace_noop as info;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__tickless_trace_noop as trace;
#[cfg(not(feature = "tracing-integration"))]
pub use crate::__tickless_trace_noop as warn;
