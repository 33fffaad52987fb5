//! Entry points a presentation layer calls to start work.
//!
//! - [`start_batch`]: Validate a request, build its queue and start the worker
//! - [`prepare_batch`]: The same without starting, for dry runs
//! - [`default_output_path`]: Output naming used when none is given

mod batch;

pub use batch::*;
