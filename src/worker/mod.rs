mod queue;
mod runner;
mod sink;

pub use queue::TaskQueue;
pub use runner::{RunHandle, submit};
pub use sink::RunSink;
