// Error taxonomy for the rendering core
//
// Environment errors abort construction, resource errors bubble out of
// setup_swapchain(), device loss is fatal to the current context.
// Out-of-date / suboptimal surfaces are NOT errors: see Acquired and
// PresentStatus in backend::swapchain.

use ash::vk;
use thiserror::Error;

use crate::backend::pipeline::ShaderStage;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("No discrete GPU found among {candidates} physical device(s)")]
    NoEligibleDevice { candidates: usize },

    #[error("Selected GPU has no queue family with {0} support")]
    MissingQueueFamily(&'static str),

    #[error("Window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("Surface creation failed: {0}")]
    SurfaceCreation(vk::Result),

    #[error("Surface reports no supported {0}")]
    UnsupportedSurface(&'static str),

    #[error("Surface currently allows only a zero-sized swapchain (window minimized)")]
    ZeroExtent,

    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(vk::Result),

    #[error("Pipeline descriptor has no vertex shader")]
    MissingVertexStage,

    #[error("Pipeline descriptor does not fit its render pass: {0}")]
    IncompatibleDescriptor(&'static str),

    #[error("Failed to create {what}: {result}")]
    ResourceCreation { what: &'static str, result: vk::Result },

    #[error("Invalid SPIR-V bytecode for {stage:?} stage: {source}")]
    ShaderBytecode {
        stage: ShaderStage,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read shader {path:?}: {source}")]
    ShaderFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Presentation engine returned image {index} but only {count} exist")]
    ImageIndex { index: u32, count: usize },

    #[error("GPU device lost")]
    DeviceLost,

    #[error("{call} failed: {result}")]
    Vulkan { call: &'static str, result: vk::Result },
}

impl RenderError {
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RenderError::DeviceLost)
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Wraps raw `vk::Result` failures into `RenderError` at the call site.
pub(crate) trait VkResultExt<T> {
    /// A failed API call that is not a resource creation.
    fn vk_call(self, call: &'static str) -> Result<T>;
    /// A failed resource creation (framebuffer, render pass, ...).
    fn vk_create(self, what: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn vk_call(self, call: &'static str) -> Result<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
            result => RenderError::Vulkan { call, result },
        })
    }

    fn vk_create(self, what: &'static str) -> Result<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
            result => RenderError::ResourceCreation { what, result },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_lost_is_mapped_uniformly() {
        let call: std::result::Result<(), _> = Err(vk::Result::ERROR_DEVICE_LOST);
        assert!(call.vk_call("vkQueueSubmit").unwrap_err().is_device_lost());

        let create: std::result::Result<(), _> = Err(vk::Result::ERROR_DEVICE_LOST);
        assert!(create.vk_create("framebuffer").unwrap_err().is_device_lost());
    }

    #[test]
    fn other_results_keep_their_call_site() {
        let failed: std::result::Result<(), _> = Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        match failed.vk_create("render pass") {
            Err(RenderError::ResourceCreation { what, result }) => {
                assert_eq!(what, "render pass");
                assert_eq!(result, vk::Result::ERROR_OUT_OF_HOST_MEMORY);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
