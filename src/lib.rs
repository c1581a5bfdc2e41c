// Vulkan frame loop core
//
// Device and surface setup, swapchain lifecycle with generation-tracked
// recreation, pipeline compilation from a descriptor, pre-recorded
// per-image command buffers and a single-frame-in-flight render loop.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame_loop;
pub mod renderer;

pub use backend::{PipelineDescriptor, ShaderBundle, ShaderStage, WindowMetrics};
pub use config::Config;
pub use error::{RenderError, Result};
pub use frame_loop::{FrameLoop, FrameState, FrameStatus, GenerationCounts};
pub use renderer::{Renderer, RendererOptions};
