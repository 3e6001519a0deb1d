use anyhow::Context;
use ash::{vk::*, Device};
use std::sync::{Arc, Weak};

use crate::framework::shared::traits::Disposable;

/// グラフィックスパイプラインの固定機能の設定。<br />
/// Fixed-function settings of a graphics pipeline.
#[derive(Copy, Clone, Debug)]
pub struct PipelineOptions {
    pub cull_mode: CullModeFlags,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend_enable: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            cull_mode: CullModeFlags::BACK,
            front_face: FrontFace::COUNTER_CLOCKWISE,
            polygon_mode: PolygonMode::FILL,
            depth_test: true,
            depth_write: true,
            blend_enable: false,
        }
    }
}

/// パイプラインとそのレイアウト。<br />
/// A graphics pipeline and its layout.
pub struct Pipeline {
    pub pipeline: ash::vk::Pipeline,
    pub pipeline_layout: PipelineLayout,
    logical_device: Weak<Device>,
    is_disposed: bool,
}

impl Pipeline {
    /// 基底レンダラーのレンダーパスを作る。<br />
    /// カラーは消去して保存、深度も消去して保存、ステンシルは消去して破棄。<br />
    /// Creates the render pass of the renderer base.<br />
    /// Color is cleared and stored, depth is cleared and stored, stencil is cleared and discarded.
    pub fn create_render_pass(
        device: &Device,
        color_format: Format,
        depth_format: Format,
    ) -> anyhow::Result<RenderPass> {
        let attachment_descriptions = [
            AttachmentDescription::builder()
                .format(color_format)
                .samples(SampleCountFlags::TYPE_1)
                .load_op(AttachmentLoadOp::CLEAR)
                .store_op(AttachmentStoreOp::STORE)
                .stencil_load_op(AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(AttachmentStoreOp::DONT_CARE)
                .initial_layout(ImageLayout::UNDEFINED)
                .final_layout(ImageLayout::PRESENT_SRC_KHR)
                .build(),
            AttachmentDescription::builder()
                .format(depth_format)
                .samples(SampleCountFlags::TYPE_1)
                .load_op(AttachmentLoadOp::CLEAR)
                .store_op(AttachmentStoreOp::STORE)
                .stencil_load_op(AttachmentLoadOp::CLEAR)
                .stencil_store_op(AttachmentStoreOp::DONT_CARE)
                .initial_layout(ImageLayout::UNDEFINED)
                .final_layout(ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        ];

        let color_reference = [AttachmentReference::builder()
            .attachment(0)
            .layout(ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];
        let depth_reference = AttachmentReference::builder()
            .attachment(1)
            .layout(ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpass_description = [SubpassDescription::builder()
            .pipeline_bind_point(PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_reference)
            .depth_stencil_attachment(&depth_reference)
            .build()];

        let subpass_dependencies = Self::subpass_dependencies();

        let renderpass_info = RenderPassCreateInfo::builder()
            .attachments(&attachment_descriptions)
            .subpasses(&subpass_description)
            .dependencies(&subpass_dependencies);
        let render_pass = unsafe {
            device
                .create_render_pass(&renderpass_info, None)
                .with_context(|| "Failed to create renderpass.")?
        };
        log::info!("Render pass successfully created.");
        Ok(render_pass)
    }

    /// 外部アクセスを単一のサブパスの前後で区切る依存関係。<br />
    /// Dependencies bracketing external access before and after the single subpass.
    pub fn subpass_dependencies() -> [SubpassDependency; 2] {
        [
            SubpassDependency::builder()
                .src_subpass(SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(PipelineStageFlags::BOTTOM_OF_PIPE)
                .dst_stage_mask(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(AccessFlags::MEMORY_READ)
                .dst_access_mask(
                    AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .dependency_flags(DependencyFlags::BY_REGION)
                .build(),
            SubpassDependency::builder()
                .src_subpass(0)
                .dst_subpass(SUBPASS_EXTERNAL)
                .src_stage_mask(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_stage_mask(PipelineStageFlags::BOTTOM_OF_PIPE)
                .src_access_mask(
                    AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .dst_access_mask(AccessFlags::MEMORY_READ)
                .dependency_flags(DependencyFlags::BY_REGION)
                .build(),
        ]
    }

    pub fn create_pipeline_layout(
        device: &Device,
        set_layouts: &[DescriptorSetLayout],
        push_constant_ranges: &[PushConstantRange],
    ) -> anyhow::Result<PipelineLayout> {
        let layout_info = PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .with_context(|| "Failed to create pipeline layout.")
        }
    }

    /// ビューポートとシザーを動的状態にしたグラフィックスパイプラインを作る。<br />
    /// Creates a graphics pipeline with dynamic viewport and scissor.
    pub fn new_graphics(
        device: &Arc<Device>,
        render_pass: RenderPass,
        pipeline_cache: PipelineCache,
        pipeline_layout: PipelineLayout,
        shader_stages: &[PipelineShaderStageCreateInfo],
        vertex_input_info: &PipelineVertexInputStateCreateInfo,
        options: PipelineOptions,
    ) -> anyhow::Result<Self> {
        let ia_info = PipelineInputAssemblyStateCreateInfo::builder()
            .primitive_restart_enable(false)
            .topology(PrimitiveTopology::TRIANGLE_LIST);
        let rs_info = PipelineRasterizationStateCreateInfo::builder()
            .cull_mode(options.cull_mode)
            .depth_bias_enable(false)
            .depth_clamp_enable(false)
            .front_face(options.front_face)
            .line_width(1.0)
            .polygon_mode(options.polygon_mode)
            .rasterizer_discard_enable(false);
        let vp_info = PipelineViewportStateCreateInfo::builder()
            .scissor_count(1)
            .viewport_count(1);

        let color_attachment = [PipelineColorBlendAttachmentState::builder()
            .color_write_mask(ColorComponentFlags::RGBA)
            .blend_enable(options.blend_enable)
            .src_color_blend_factor(BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(BlendOp::ADD)
            .src_alpha_blend_factor(BlendFactor::ONE_MINUS_SRC_ALPHA)
            .dst_alpha_blend_factor(BlendFactor::ZERO)
            .alpha_blend_op(BlendOp::ADD)
            .build()];
        let color_blend_info = PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(LogicOp::COPY)
            .attachments(&color_attachment);
        let depth_info = PipelineDepthStencilStateCreateInfo::builder()
            .depth_bounds_test_enable(false)
            .depth_compare_op(CompareOp::LESS_OR_EQUAL)
            .depth_test_enable(options.depth_test)
            .depth_write_enable(options.depth_write)
            .stencil_test_enable(false);
        let dynamic_states = [DynamicState::SCISSOR, DynamicState::VIEWPORT];
        let dynamic_info = PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);
        let msaa_info = PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let pipeline_info = [GraphicsPipelineCreateInfo::builder()
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(0)
            .stages(shader_stages)
            .vertex_input_state(vertex_input_info)
            .input_assembly_state(&ia_info)
            .rasterization_state(&rs_info)
            .viewport_state(&vp_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&depth_info)
            .dynamic_state(&dynamic_info)
            .multisample_state(&msaa_info)
            .build()];

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(pipeline_cache, &pipeline_info, None)
                .map_err(|(_, e)| e)
                .with_context(|| "Failed to create graphics pipeline.")?
        };
        let pipeline = pipelines
            .into_iter()
            .next()
            .with_context(|| "No graphics pipeline was returned.")?;
        log::info!("Graphics pipeline successfully created.");
        Ok(Pipeline {
            pipeline,
            pipeline_layout,
            logical_device: Arc::downgrade(device),
            is_disposed: false,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.is_disposed {
            self.dispose();
        }
    }
}

impl Disposable for Pipeline {
    fn dispose(&mut self) {
        if let Some(device) = self.logical_device.upgrade() {
            unsafe {
                device.destroy_pipeline(self.pipeline, None);
                device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
        }
        self.is_disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.is_disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_bracket_the_single_subpass() {
        let [before, after] = Pipeline::subpass_dependencies();
        assert_eq!(before.src_subpass, SUBPASS_EXTERNAL);
        assert_eq!(before.dst_subpass, 0);
        assert_eq!(after.src_subpass, 0);
        assert_eq!(after.dst_subpass, SUBPASS_EXTERNAL);
        assert_eq!(before.src_stage_mask, after.dst_stage_mask);
        assert_eq!(before.dst_access_mask, after.src_access_mask);
    }
}
