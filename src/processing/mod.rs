//! Work primitives: external processes, resize planning, codecs and the
//! concrete task variants built on top of them.

pub mod codec;
pub mod resize;
pub mod template;
pub mod upscaler;
mod animation;
mod compress;
mod process;
mod upscale;

pub use animation::{FrameMeta, MergeFramesTask, SplitAnimatedImageTask, merge_frames, split_frames};
pub use compress::{CustomCompressTask, LossyCompressTask};
pub use process::{ProcessOutcome, ProcessRunner};
pub use resize::ResizePlan;
pub use template::CommandTemplate;
pub use upscale::UpscaleTask;
pub use upscaler::UpscalerFamily;
