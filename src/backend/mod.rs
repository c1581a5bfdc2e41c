// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash. Every wrapper that owns device-level
// handles holds an Arc<GraphicsContext>, so the device cannot be destroyed
// while anything created from it is still alive.

pub mod device;
pub mod instance;
pub mod pipeline;
pub mod recorder;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::{GraphicsContext, QueueFamilies};
pub use instance::Instance;
pub use pipeline::{Pipeline, PipelineDescriptor, ShaderStage, ViewportMode};
pub use recorder::{CommandPool, FrameRecorder, Framebuffers, RecordedCommands};
pub use shader::{ShaderBundle, ShaderSet};
pub use surface::{Surface, SurfaceCapabilities, WindowMetrics};
pub use swapchain::{Acquired, PresentStatus, RetiredSwapchain, Swapchain};
pub use sync::FrameSync;
