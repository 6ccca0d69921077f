//! Scheduler internals.
//!
//! - [`timer`]: the deadline-ordered task queue
//! - [`dispatcher`]: the thread that waits for deadlines and fires tasks
//! - [`executor`]: where fired actions run (inline or a bounded pool)
//! - [`completion`]: result handles for pool submissions

pub mod completion;
pub mod dispatcher;
pub mod executor;
pub mod timer;

pub use completion::CompletionHandle;
pub use dispatcher::DispatcherState;
pub use executor::{Executor, Inline, Job, ThreadPool};
pub use timer::{Task, TimerQueue};
