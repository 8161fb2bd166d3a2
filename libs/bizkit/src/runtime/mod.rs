mod host_runtime;
mod runner;
mod shutdown;

pub use host_runtime::{HostRuntime, ServerOptions};
pub use runner::{run, RunOptions, ShutdownOptions};
pub use shutdown::wait_for_shutdown;
