//! Coordination primitives shared by long-running tasks

pub mod shutdown;

pub use shutdown::{install_signal_handlers, ShutdownHandle, ShutdownSignal};
