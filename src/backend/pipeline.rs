// Graphics pipeline creation
//
// A PipelineDescriptor is plain, mutable configuration. Compiling it goes
// through small builder functions that translate each field group into a
// fully-populated fixed-function block, then produces a fresh Pipeline
// (pipeline + render pass + layout). Nothing is patched in place: every
// compile yields new GPU objects.

use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::GraphicsContext;
use crate::error::{RenderError, Result, VkResultExt};

const ENTRY_POINT: &CStr = c"main";

/// Programmable stages, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn is_tessellation(self) -> bool {
        matches!(self, ShaderStage::TessellationControl | ShaderStage::TessellationEvaluation)
    }
}

/// How viewport and scissor rectangles reach the pipeline.
#[derive(Clone, Debug)]
pub enum ViewportMode {
    /// Baked into the pipeline.
    Static {
        viewports: Vec<vk::Viewport>,
        scissors: Vec<vk::Rect2D>,
    },
    /// Only counts are baked; values are set while recording.
    Dynamic { viewport_count: u32, scissor_count: u32 },
}

impl ViewportMode {
    /// One static viewport and scissor covering the whole target.
    pub fn covering(extent: vk::Extent2D) -> Self {
        ViewportMode::Static {
            viewports: vec![full_viewport(extent)],
            scissors: vec![full_scissor(extent)],
        }
    }

    pub fn implied_dynamic_states(&self) -> &'static [vk::DynamicState] {
        match self {
            ViewportMode::Static { .. } => &[],
            ViewportMode::Dynamic { .. } => &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Clone, Debug)]
pub struct RasterizerState {
    pub depth_clamp: bool,
    pub rasterizer_discard: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias: Option<DepthBias>,
    pub line_width: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            depth_clamp: false,
            rasterizer_discard: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias: None,
            line_width: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MultisampleState {
    pub samples: vk::SampleCountFlags,
    /// Minimum sample shading fraction; `None` disables sample shading.
    pub sample_shading: Option<f32>,
    pub sample_masks: Vec<vk::SampleMask>,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: None,
            sample_masks: Vec::new(),
            alpha_to_coverage: false,
            alpha_to_one: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColorBlendState {
    pub logic_op: Option<vk::LogicOp>,
    /// One entry per color attachment of the target subpass.
    pub attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub blend_constants: [f32; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op: None,
            attachments: vec![opaque_attachment()],
            blend_constants: [0.0; 4],
        }
    }
}

/// Writes every channel, no blending.
pub fn opaque_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .src_color_blend_factor(vk::BlendFactor::ONE)
        .dst_color_blend_factor(vk::BlendFactor::ZERO)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Everything a graphics pipeline is compiled from.
///
/// Shader slots hold raw module handles; the modules must outlive every
/// compile that uses them.
#[derive(Clone, Debug)]
pub struct PipelineDescriptor {
    pub vertex_shader: Option<vk::ShaderModule>,
    pub tessellation_control_shader: Option<vk::ShaderModule>,
    pub tessellation_evaluation_shader: Option<vk::ShaderModule>,
    pub geometry_shader: Option<vk::ShaderModule>,
    pub fragment_shader: Option<vk::ShaderModule>,

    pub push_constants: Vec<vk::PushConstantRange>,

    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    /// Only used when a tessellation stage is present.
    pub patch_control_points: u32,

    pub rasterizer: RasterizerState,
    pub multisample: MultisampleState,
    pub color_blend: ColorBlendState,

    pub dynamic_states: Vec<vk::DynamicState>,
    pub viewport: ViewportMode,

    /// Format of the single color attachment of the render pass.
    pub color_format: vk::Format,
    pub subpass: u32,
}

impl Default for PipelineDescriptor {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            tessellation_control_shader: None,
            tessellation_evaluation_shader: None,
            geometry_shader: None,
            fragment_shader: None,
            push_constants: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            patch_control_points: 3,
            rasterizer: RasterizerState::default(),
            multisample: MultisampleState::default(),
            color_blend: ColorBlendState::default(),
            dynamic_states: Vec::new(),
            viewport: ViewportMode::Dynamic {
                viewport_count: 1,
                scissor_count: 1,
            },
            color_format: vk::Format::B8G8R8A8_SRGB,
            subpass: 0,
        }
    }
}

impl PipelineDescriptor {
    pub fn shader(&self, stage: ShaderStage) -> Option<vk::ShaderModule> {
        match stage {
            ShaderStage::Vertex => self.vertex_shader,
            ShaderStage::TessellationControl => self.tessellation_control_shader,
            ShaderStage::TessellationEvaluation => self.tessellation_evaluation_shader,
            ShaderStage::Geometry => self.geometry_shader,
            ShaderStage::Fragment => self.fragment_shader,
        }
    }

    pub fn set_shader(&mut self, stage: ShaderStage, module: Option<vk::ShaderModule>) {
        let slot = match stage {
            ShaderStage::Vertex => &mut self.vertex_shader,
            ShaderStage::TessellationControl => &mut self.tessellation_control_shader,
            ShaderStage::TessellationEvaluation => &mut self.tessellation_evaluation_shader,
            ShaderStage::Geometry => &mut self.geometry_shader,
            ShaderStage::Fragment => &mut self.fragment_shader,
        };
        *slot = module;
    }

    /// Present stages only, in pipeline order.
    pub fn shader_stages(&self) -> Vec<(ShaderStage, vk::ShaderModule)> {
        ShaderStage::ALL
            .into_iter()
            .filter_map(|stage| self.shader(stage).map(|module| (stage, module)))
            .collect()
    }

    /// Requested dynamic states plus those the viewport mode implies,
    /// first occurrence wins.
    pub fn resolved_dynamic_states(&self) -> Vec<vk::DynamicState> {
        let mut states: Vec<vk::DynamicState> = Vec::new();
        for &state in self
            .dynamic_states
            .iter()
            .chain(self.viewport.implied_dynamic_states())
        {
            if !states.contains(&state) {
                states.push(state);
            }
        }
        states
    }

    /// Checks what the driver would otherwise reject as invalid usage.
    ///
    /// The render pass built by `compile` has one single-sampled color
    /// attachment in a single subpass, so the descriptor must target exactly
    /// that.
    pub fn validate(&self) -> Result<()> {
        if self.vertex_shader.is_none() {
            return Err(RenderError::MissingVertexStage);
        }
        if self.multisample.samples != vk::SampleCountFlags::TYPE_1 {
            return Err(RenderError::IncompatibleDescriptor(
                "rasterization samples must match the single-sampled color attachment",
            ));
        }
        if self.color_blend.attachments.len() != 1 {
            return Err(RenderError::IncompatibleDescriptor(
                "exactly one color blend attachment is required",
            ));
        }
        if self.subpass != 0 {
            return Err(RenderError::IncompatibleDescriptor("the render pass has only subpass 0"));
        }

        let (viewports, scissors) = match &self.viewport {
            ViewportMode::Static { viewports, scissors } => (viewports.len(), scissors.len()),
            ViewportMode::Dynamic {
                viewport_count,
                scissor_count,
            } => (*viewport_count as usize, *scissor_count as usize),
        };
        if viewports == 0 || viewports != scissors {
            return Err(RenderError::IncompatibleDescriptor(
                "viewport and scissor counts must be equal and non-zero",
            ));
        }

        let control = self.tessellation_control_shader.is_some();
        let evaluation = self.tessellation_evaluation_shader.is_some();
        if control != evaluation {
            return Err(RenderError::IncompatibleDescriptor(
                "tessellation needs both control and evaluation stages",
            ));
        }
        if control && self.patch_control_points == 0 {
            return Err(RenderError::IncompatibleDescriptor("patch control points must be non-zero"));
        }

        Ok(())
    }
}

pub fn shader_stage_infos(desc: &PipelineDescriptor) -> Vec<vk::PipelineShaderStageCreateInfo<'static>> {
    desc.shader_stages()
        .into_iter()
        .map(|(stage, module)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage.flags())
                .module(module)
                .name(ENTRY_POINT)
        })
        .collect()
}

pub fn vertex_input_state(desc: &PipelineDescriptor) -> vk::PipelineVertexInputStateCreateInfo<'_> {
    vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&desc.vertex_bindings)
        .vertex_attribute_descriptions(&desc.vertex_attributes)
}

pub fn input_assembly_state(desc: &PipelineDescriptor) -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
    vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(desc.topology)
        .primitive_restart_enable(desc.primitive_restart)
}

pub fn viewport_state(desc: &PipelineDescriptor) -> vk::PipelineViewportStateCreateInfo<'_> {
    match &desc.viewport {
        ViewportMode::Static { viewports, scissors } => vk::PipelineViewportStateCreateInfo::default()
            .viewports(viewports)
            .scissors(scissors),
        ViewportMode::Dynamic {
            viewport_count,
            scissor_count,
        } => vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(*viewport_count)
            .scissor_count(*scissor_count),
    }
}

pub fn rasterization_state(desc: &PipelineDescriptor) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    let raster = &desc.rasterizer;
    let bias = raster.depth_bias.unwrap_or_default();

    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(raster.depth_clamp)
        .rasterizer_discard_enable(raster.rasterizer_discard)
        .polygon_mode(raster.polygon_mode)
        .cull_mode(raster.cull_mode)
        .front_face(raster.front_face)
        .depth_bias_enable(raster.depth_bias.is_some())
        .depth_bias_constant_factor(bias.constant_factor)
        .depth_bias_clamp(bias.clamp)
        .depth_bias_slope_factor(bias.slope_factor)
        .line_width(raster.line_width)
}

pub fn multisample_state(desc: &PipelineDescriptor) -> vk::PipelineMultisampleStateCreateInfo<'_> {
    let multisample = &desc.multisample;

    let info = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(multisample.samples)
        .sample_shading_enable(multisample.sample_shading.is_some())
        .min_sample_shading(multisample.sample_shading.unwrap_or(1.0))
        .alpha_to_coverage_enable(multisample.alpha_to_coverage)
        .alpha_to_one_enable(multisample.alpha_to_one);

    if multisample.sample_masks.is_empty() {
        info
    } else {
        info.sample_mask(&multisample.sample_masks)
    }
}

pub fn color_blend_state(desc: &PipelineDescriptor) -> vk::PipelineColorBlendStateCreateInfo<'_> {
    let blend = &desc.color_blend;

    vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(blend.logic_op.is_some())
        .logic_op(blend.logic_op.unwrap_or(vk::LogicOp::COPY))
        .attachments(&blend.attachments)
        .blend_constants(blend.blend_constants)
}

/// Single color attachment, cleared on load, handed to presentation.
pub fn create_render_pass(context: &GraphicsContext, format: vk::Format) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_attachment_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachment_refs)];

    // The acquire semaphore is waited on at this stage, so the layout
    // transition must not start before it.
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let attachments = [color_attachment];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { context.device.create_render_pass(&render_pass_info, None) }.vk_create("render pass")
}

/// Compiled pipeline with the render pass and layout it was built against.
/// All three live and die together.
pub struct Pipeline {
    pub handle: vk::Pipeline,
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    dynamic_states: Vec<vk::DynamicState>,
    context: Arc<GraphicsContext>,
}

impl Pipeline {
    pub fn compile(context: &Arc<GraphicsContext>, desc: &PipelineDescriptor) -> Result<Self> {
        desc.validate()?;

        // Null handles are skipped by Drop, so an early return cleans up
        // exactly what was created.
        let mut pipeline = Self {
            handle: vk::Pipeline::null(),
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            dynamic_states: desc.resolved_dynamic_states(),
            context: Arc::clone(context),
        };

        let layout_info = vk::PipelineLayoutCreateInfo::default().push_constant_ranges(&desc.push_constants);
        pipeline.layout = unsafe { context.device.create_pipeline_layout(&layout_info, None) }
            .vk_create("pipeline layout")?;

        pipeline.render_pass = create_render_pass(context, desc.color_format)?;

        let stages = shader_stage_infos(desc);
        let vertex_input = vertex_input_state(desc);
        let input_assembly = input_assembly_state(desc);
        let viewport = viewport_state(desc);
        let rasterization = rasterization_state(desc);
        let multisample = multisample_state(desc);
        let color_blend = color_blend_state(desc);
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&pipeline.dynamic_states);
        let tessellation =
            vk::PipelineTessellationStateCreateInfo::default().patch_control_points(desc.patch_control_points);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .layout(pipeline.layout)
            .render_pass(pipeline.render_pass)
            .subpass(desc.subpass)
            .base_pipeline_index(-1);
        if !pipeline.dynamic_states.is_empty() {
            pipeline_info = pipeline_info.dynamic_state(&dynamic_state);
        }
        if desc.shader_stages().iter().any(|(stage, _)| stage.is_tessellation()) {
            pipeline_info = pipeline_info.tessellation_state(&tessellation);
        }

        let created = unsafe {
            context
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| match result {
            vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
            result => RenderError::PipelineCreation(result),
        })?;

        pipeline.handle = created
            .into_iter()
            .next()
            .ok_or(RenderError::PipelineCreation(vk::Result::ERROR_UNKNOWN))?;

        log::debug!(
            "Compiled pipeline: {} stage(s), {:?}, dynamic {:?}",
            stages.len(),
            desc.topology,
            pipeline.dynamic_states
        );

        Ok(pipeline)
    }

    pub fn dynamic_states(&self) -> &[vk::DynamicState] {
        &self.dynamic_states
    }

    pub fn has_dynamic_state(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe {
            if self.handle != vk::Pipeline::null() {
                device.destroy_pipeline(self.handle, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
            }
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn module(raw: u64) -> Option<vk::ShaderModule> {
        Some(vk::ShaderModule::from_raw(raw))
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn stages_keep_pipeline_order_and_skip_missing_slots() {
        let mut desc = PipelineDescriptor::default();
        desc.fragment_shader = module(5);
        desc.geometry_shader = module(4);
        desc.vertex_shader = module(1);

        let stages: Vec<_> = desc.shader_stages().into_iter().map(|(stage, _)| stage).collect();
        assert_eq!(
            stages,
            vec![ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Fragment]
        );

        let infos = shader_stage_infos(&desc);
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(infos[0].module.as_raw(), 1);
        assert_eq!(infos[2].stage, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn set_shader_round_trips_every_slot() {
        let mut desc = PipelineDescriptor::default();
        for (raw, stage) in ShaderStage::ALL.into_iter().enumerate() {
            desc.set_shader(stage, module(raw as u64 + 1));
        }
        assert_eq!(desc.shader_stages().len(), 5);
        desc.set_shader(ShaderStage::Geometry, None);
        assert!(desc.shader(ShaderStage::Geometry).is_none());
        assert_eq!(desc.shader_stages().len(), 4);
    }

    #[test]
    fn dynamic_viewport_adds_exactly_viewport_and_scissor() {
        let desc = PipelineDescriptor {
            viewport: ViewportMode::Dynamic {
                viewport_count: 1,
                scissor_count: 1,
            },
            ..Default::default()
        };
        assert_eq!(
            desc.resolved_dynamic_states(),
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn dynamic_states_are_a_union_without_duplicates() {
        let desc = PipelineDescriptor {
            dynamic_states: vec![
                vk::DynamicState::SCISSOR,
                vk::DynamicState::LINE_WIDTH,
                vk::DynamicState::LINE_WIDTH,
            ],
            viewport: ViewportMode::Dynamic {
                viewport_count: 1,
                scissor_count: 1,
            },
            ..Default::default()
        };
        assert_eq!(
            desc.resolved_dynamic_states(),
            vec![
                vk::DynamicState::SCISSOR,
                vk::DynamicState::LINE_WIDTH,
                vk::DynamicState::VIEWPORT,
            ]
        );
    }

    #[test]
    fn static_viewport_leaves_dynamic_states_alone() {
        let desc = PipelineDescriptor {
            dynamic_states: vec![vk::DynamicState::BLEND_CONSTANTS],
            viewport: ViewportMode::covering(extent(640, 480)),
            ..Default::default()
        };
        assert_eq!(desc.resolved_dynamic_states(), vec![vk::DynamicState::BLEND_CONSTANTS]);

        let state = viewport_state(&desc);
        assert_eq!(state.viewport_count, 1);
        assert_eq!(state.scissor_count, 1);
        assert!(!state.p_viewports.is_null());
    }

    #[test]
    fn dynamic_viewport_state_carries_counts_only() {
        let desc = PipelineDescriptor {
            viewport: ViewportMode::Dynamic {
                viewport_count: 2,
                scissor_count: 2,
            },
            ..Default::default()
        };
        let state = viewport_state(&desc);
        assert_eq!(state.viewport_count, 2);
        assert_eq!(state.scissor_count, 2);
        assert!(state.p_viewports.is_null());
        assert!(state.p_scissors.is_null());
    }

    #[test]
    fn covering_viewport_spans_the_extent() {
        let viewport = full_viewport(extent(800, 600));
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(full_scissor(extent(800, 600)).extent, extent(800, 600));
    }

    #[test]
    fn omitted_fields_get_defined_defaults() {
        let desc = PipelineDescriptor::default();

        let raster = rasterization_state(&desc);
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(raster.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(raster.line_width, 1.0);
        assert_eq!(raster.depth_bias_enable, vk::FALSE);

        let assembly = input_assembly_state(&desc);
        assert_eq!(assembly.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(assembly.primitive_restart_enable, vk::FALSE);

        let multisample = multisample_state(&desc);
        assert_eq!(multisample.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(multisample.sample_shading_enable, vk::FALSE);
        assert_eq!(multisample.min_sample_shading, 1.0);
        assert!(multisample.p_sample_mask.is_null());

        let blend = color_blend_state(&desc);
        assert_eq!(blend.logic_op_enable, vk::FALSE);
        assert_eq!(blend.attachment_count, 1);

        let input = vertex_input_state(&desc);
        assert_eq!(input.vertex_binding_description_count, 0);
        assert_eq!(input.vertex_attribute_description_count, 0);
    }

    #[test]
    fn descriptor_fields_flow_into_state_blocks() {
        let mut desc = PipelineDescriptor::default();
        desc.topology = vk::PrimitiveTopology::LINE_STRIP;
        desc.primitive_restart = true;
        desc.rasterizer.cull_mode = vk::CullModeFlags::BACK;
        desc.rasterizer.depth_bias = Some(DepthBias {
            constant_factor: 1.25,
            clamp: 0.0,
            slope_factor: 1.75,
        });
        desc.multisample.samples = vk::SampleCountFlags::TYPE_4;
        desc.multisample.sample_shading = Some(0.5);
        desc.multisample.sample_masks = vec![0xF];
        desc.color_blend.logic_op = Some(vk::LogicOp::XOR);
        desc.color_blend.blend_constants = [0.1, 0.2, 0.3, 0.4];

        let assembly = input_assembly_state(&desc);
        assert_eq!(assembly.topology, vk::PrimitiveTopology::LINE_STRIP);
        assert_eq!(assembly.primitive_restart_enable, vk::TRUE);

        let raster = rasterization_state(&desc);
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.depth_bias_enable, vk::TRUE);
        assert_eq!(raster.depth_bias_slope_factor, 1.75);

        let multisample = multisample_state(&desc);
        assert_eq!(multisample.rasterization_samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(multisample.sample_shading_enable, vk::TRUE);
        assert_eq!(multisample.min_sample_shading, 0.5);
        assert!(!multisample.p_sample_mask.is_null());

        let blend = color_blend_state(&desc);
        assert_eq!(blend.logic_op_enable, vk::TRUE);
        assert_eq!(blend.logic_op, vk::LogicOp::XOR);
        assert_eq!(blend.blend_constants, [0.1, 0.2, 0.3, 0.4]);
    }

    fn drawable() -> PipelineDescriptor {
        PipelineDescriptor {
            vertex_shader: module(1),
            fragment_shader: module(2),
            ..Default::default()
        }
    }

    fn rejected(desc: &PipelineDescriptor) -> bool {
        matches!(desc.validate(), Err(RenderError::IncompatibleDescriptor(_)))
    }

    #[test]
    fn default_drawable_descriptor_is_valid() {
        drawable().validate().unwrap();

        let mut desc = drawable();
        desc.viewport = ViewportMode::covering(extent(800, 600));
        desc.validate().unwrap();
    }

    #[test]
    fn missing_vertex_stage_is_rejected_first() {
        let desc = PipelineDescriptor {
            subpass: 3,
            ..Default::default()
        };
        assert!(matches!(desc.validate(), Err(RenderError::MissingVertexStage)));
    }

    #[test]
    fn multisampling_a_single_sampled_target_is_rejected() {
        let mut desc = drawable();
        desc.multisample.samples = vk::SampleCountFlags::TYPE_4;
        assert!(rejected(&desc));
    }

    #[test]
    fn blend_attachments_must_match_the_color_attachment() {
        let mut desc = drawable();
        desc.color_blend.attachments.clear();
        assert!(rejected(&desc));

        desc.color_blend.attachments = vec![opaque_attachment(), opaque_attachment()];
        assert!(rejected(&desc));
    }

    #[test]
    fn only_subpass_zero_exists() {
        let mut desc = drawable();
        desc.subpass = 1;
        assert!(rejected(&desc));
    }

    #[test]
    fn viewport_counts_must_agree() {
        let mut desc = drawable();
        desc.viewport = ViewportMode::Dynamic {
            viewport_count: 0,
            scissor_count: 0,
        };
        assert!(rejected(&desc));

        desc.viewport = ViewportMode::Static {
            viewports: vec![full_viewport(extent(8, 8))],
            scissors: Vec::new(),
        };
        assert!(rejected(&desc));
    }

    #[test]
    fn tessellation_needs_both_stages_and_patch_points() {
        let mut desc = drawable();
        desc.tessellation_control_shader = module(3);
        assert!(rejected(&desc));

        desc.tessellation_evaluation_shader = module(4);
        desc.validate().unwrap();

        desc.patch_control_points = 0;
        assert!(rejected(&desc));
    }

    #[test]
    fn tessellation_stages_are_flagged() {
        assert!(ShaderStage::TessellationControl.is_tessellation());
        assert!(ShaderStage::TessellationEvaluation.is_tessellation());
        assert!(!ShaderStage::Geometry.is_tessellation());
    }
}
