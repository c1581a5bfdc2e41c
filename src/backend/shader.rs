// Shader module loading and management
//
// Vulkan consumes SPIR-V words. A ShaderBundle holds validated bytecode
// per stage on the CPU side; a ShaderSet turns it into device modules and
// plugs them into a PipelineDescriptor.

use ash::vk;
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::Arc;

use super::pipeline::{PipelineDescriptor, ShaderStage};
use super::GraphicsContext;
use crate::error::{RenderError, Result, VkResultExt};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode raw bytes into SPIR-V words.
///
/// Handles either byte order and rejects anything that is not a whole
/// number of words or does not start with the SPIR-V magic number.
pub fn decode_spirv(bytes: &[u8]) -> io::Result<Vec<u32>> {
    // read_spv copies into an aligned buffer, so unaligned input is fine.
    let words = ash::util::read_spv(&mut Cursor::new(bytes))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad SPIR-V magic number {other:#010x}"),
        )),
        None => Err(io::Error::new(io::ErrorKind::InvalidData, "empty SPIR-V module")),
    }
}

/// Validated SPIR-V per stage, not yet on the device.
#[derive(Clone, Debug, Default)]
pub struct ShaderBundle {
    stages: BTreeMap<ShaderStage, Vec<u32>>,
}

impl ShaderBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: ShaderStage, bytes: &[u8]) -> Result<()> {
        let words = decode_spirv(bytes).map_err(|source| RenderError::ShaderBytecode { stage, source })?;
        self.stages.insert(stage, words);
        Ok(())
    }

    pub fn load(&mut self, stage: ShaderStage, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RenderError::ShaderFile {
            path: path.to_path_buf(),
            source,
        })?;
        self.insert(stage, &bytes)?;
        log::debug!("Loaded {:?} shader from {:?} ({} bytes)", stage, path, bytes.len());
        Ok(())
    }

    pub fn contains(&self, stage: ShaderStage) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Stages in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (ShaderStage, &[u32])> {
        self.stages.iter().map(|(&stage, words)| (stage, words.as_slice()))
    }
}

/// Device shader modules, destroyed on drop.
pub struct ShaderSet {
    modules: Vec<(ShaderStage, vk::ShaderModule)>,
    context: Arc<GraphicsContext>,
}

impl ShaderSet {
    pub fn new(context: &Arc<GraphicsContext>, bundle: &ShaderBundle) -> Result<Self> {
        let mut set = Self {
            modules: Vec::new(),
            context: Arc::clone(context),
        };

        for (stage, code) in bundle.iter() {
            let create_info = vk::ShaderModuleCreateInfo::default().code(code);
            let module = unsafe { context.device.create_shader_module(&create_info, None) }
                .vk_create("shader module")?;
            set.modules.push((stage, module));
        }

        Ok(set)
    }

    pub fn module(&self, stage: ShaderStage) -> Option<vk::ShaderModule> {
        self.modules
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|&(_, module)| module)
    }

    /// Fill every shader slot of `desc` from this set; absent stages are cleared.
    pub fn apply(&self, desc: &mut PipelineDescriptor) {
        for stage in ShaderStage::ALL {
            desc.set_shader(stage, self.module(stage));
        }
    }
}

impl Drop for ShaderSet {
    fn drop(&mut self) {
        unsafe {
            for (_, module) in self.modules.drain(..) {
                self.context.device.destroy_shader_module(module, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_little_endian_module() {
        let bytes = spirv_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]);
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn accepts_byte_swapped_module() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect();
        assert_eq!(decode_spirv(&bytes).unwrap()[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_truncated_and_foreign_bytecode() {
        let mut truncated = spirv_bytes(&[SPIRV_MAGIC, 1]);
        truncated.pop();
        assert!(decode_spirv(&truncated).is_err());
        assert!(decode_spirv(&[]).is_err());
        assert!(decode_spirv(&spirv_bytes(&[0xDEAD_BEEF])).is_err());
    }

    #[test]
    fn bundle_reports_failing_stage() {
        let mut bundle = ShaderBundle::new();
        bundle
            .insert(ShaderStage::Vertex, &spirv_bytes(&[SPIRV_MAGIC, 0]))
            .unwrap();

        match bundle.insert(ShaderStage::Fragment, b"void main() {}") {
            Err(RenderError::ShaderBytecode { stage, .. }) => assert_eq!(stage, ShaderStage::Fragment),
            other => panic!("unexpected {other:?}"),
        }
        assert!(bundle.contains(ShaderStage::Vertex));
        assert!(!bundle.contains(ShaderStage::Fragment));
    }

    #[test]
    fn bundle_iterates_in_pipeline_order() {
        let code = spirv_bytes(&[SPIRV_MAGIC]);
        let mut bundle = ShaderBundle::new();
        bundle.insert(ShaderStage::Fragment, &code).unwrap();
        bundle.insert(ShaderStage::Geometry, &code).unwrap();
        bundle.insert(ShaderStage::Vertex, &code).unwrap();

        let stages: Vec<_> = bundle.iter().map(|(stage, _)| stage).collect();
        assert_eq!(
            stages,
            vec![ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Fragment]
        );
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let mut bundle = ShaderBundle::new();
        match bundle.load(ShaderStage::Vertex, "does/not/exist.spv") {
            Err(RenderError::ShaderFile { path, .. }) => {
                assert!(path.ends_with("exist.spv"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
