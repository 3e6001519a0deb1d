use anyhow::Context;
use ash::vk::{
    BufferUsageFlags, CommandBufferBeginInfo, DescriptorSet, DescriptorType, DeviceSize,
    MemoryPropertyFlags, PipelineBindPoint, Rect2D, RenderPassBeginInfo, ShaderStageFlags,
    SubpassContents,
};
use bytemuck::{Pod, Zeroable};
use env_logger::Builder;
use glam::{Mat4, Vec3, Vec4};
use log::LevelFilter;
use std::path::PathBuf;
use vk_gltf_framework::framework::graphics::vk::{
    Buffer, DescriptorBuilder, Graphics, Pipeline, PipelineOptions,
};
use vk_gltf_framework::framework::scene::{
    FileLoadingFlags, Model, RenderFlags, VertexInputState,
};
use vk_gltf_framework::framework::shared::enums::VertexComponent;
use vk_gltf_framework::framework::shared::structs::Settings;
use vk_gltf_framework::framework::shared::traits::Renderer;
use vk_gltf_framework::framework::Application;
use winit::event_loop::EventLoop;

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const TITLE: &str = "Vulkan Example";

#[repr(C)]
#[derive(Copy, Clone, Debug)]
struct SceneUniform {
    projection: Mat4,
    view: Mat4,
    light_pos: Vec4,
}

unsafe impl Zeroable for SceneUniform {}
unsafe impl Pod for SceneUniform {}

/// スキンとアニメーションを持つglTFモデルを描画する。<br />
/// Renders a skinned, animated glTF model.
struct SkinnedModelRenderer {
    model_path: PathBuf,
    shader_dir: PathBuf,
    model: Option<Model>,
    pipeline: Option<Pipeline>,
    scene_buffer: Option<Buffer>,
    scene_set: DescriptorSet,
    animation_time: f32,
    light_pos: Vec4,
}

impl SkinnedModelRenderer {
    fn new(model_path: PathBuf, shader_dir: PathBuf) -> Self {
        SkinnedModelRenderer {
            model_path,
            shader_dir,
            model: None,
            pipeline: None,
            scene_buffer: None,
            scene_set: DescriptorSet::null(),
            animation_time: 0.0,
            light_pos: Vec4::new(5.0, 5.0, 5.0, 1.0),
        }
    }

    fn update_scene_uniform(&mut self, graphics: &Graphics) -> anyhow::Result<()> {
        let uniform = SceneUniform {
            projection: graphics.camera.matrices.perspective,
            view: graphics.camera.matrices.view,
            light_pos: self.light_pos,
        };
        match self.scene_buffer.as_mut() {
            Some(buffer) => buffer.write(std::slice::from_ref(&uniform), 0),
            None => Ok(()),
        }
    }

    fn loading_flags(&self) -> anyhow::Result<FileLoadingFlags> {
        let gltf = gltf::Gltf::open(&self.model_path)
            .with_context(|| format!("Failed to open {}.", self.model_path.display()))?;
        Ok(if gltf.skins().count() > 0 {
            FileLoadingFlags::NONE
        } else {
            FileLoadingFlags::FLIP_Y
        })
    }
}

impl Renderer for SkinnedModelRenderer {
    fn prepare(&mut self, graphics: &mut Graphics) -> anyhow::Result<()> {
        let aspect = graphics.width as f32 / graphics.height.max(1) as f32;
        graphics.camera.flip_y = true;
        graphics.camera.set_perspective(60.0, aspect, 0.1, 256.0);
        graphics.camera.set_rotation(Vec3::new(0.0, 45.0, 0.0));
        graphics.camera.set_position(Vec3::new(0.0, -1.0, -4.0));

        let flags = self.loading_flags()?;
        let model = Model::load_from_file(&self.model_path, graphics, flags, 1.0)?;
        let dimensions = model.scene_dimensions();
        log::info!(
            "Scene size {:?}, center {:?}, radius {:.2}.",
            dimensions.size,
            dimensions.center,
            dimensions.radius
        );

        let scene_buffer = Buffer::new(
            graphics.device_handle(),
            std::mem::size_of::<SceneUniform>() as DeviceSize,
            BufferUsageFlags::UNIFORM_BUFFER,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            graphics.allocator_handle(),
        )?;
        let buffer_info = [scene_buffer.descriptor()];
        let (scene_set, scene_layout) = DescriptorBuilder::builder(
            &mut graphics.layout_cache,
            &mut graphics.descriptor_allocator,
        )
        .bind_buffer(
            0,
            &buffer_info,
            DescriptorType::UNIFORM_BUFFER,
            ShaderStageFlags::VERTEX,
        )
        .build()?;

        let pipeline_layout = Pipeline::create_pipeline_layout(
            &graphics.logical_device,
            &[scene_layout, model.image_layout, model.ubo_layout],
            &[],
        )?;
        let shader_stages = [
            graphics.load_shader(
                self.shader_dir.join("skinnedmodel.vert.spv"),
                ShaderStageFlags::VERTEX,
            )?,
            graphics.load_shader(
                self.shader_dir.join("skinnedmodel.frag.spv"),
                ShaderStageFlags::FRAGMENT,
            )?,
        ];
        let vertex_input = VertexInputState::new(&[
            VertexComponent::Position,
            VertexComponent::Normal,
            VertexComponent::UV,
            VertexComponent::Color,
            VertexComponent::Joint0,
            VertexComponent::Weight0,
        ]);
        let pipeline = Pipeline::new_graphics(
            &graphics.logical_device,
            graphics.render_pass,
            graphics.pipeline_cache,
            pipeline_layout,
            &shader_stages,
            &vertex_input.create_info(),
            PipelineOptions::default(),
        )?;

        self.model = Some(model);
        self.pipeline = Some(pipeline);
        self.scene_buffer = Some(scene_buffer);
        self.scene_set = scene_set;
        self.update_scene_uniform(graphics)?;
        self.build_command_buffers(graphics)
    }

    fn render(&mut self, graphics: &mut Graphics) -> anyhow::Result<()> {
        if let Some(model) = self.model.as_mut() {
            if let Some(animation) = model.scene.animations.first() {
                if !graphics.paused {
                    self.animation_time = animation.wrap_time(self.animation_time + graphics.frame_timer);
                }
                model.update_animation(0, self.animation_time)?;
            }
        }
        graphics.render_frame()?;
        Ok(())
    }

    fn view_changed(&mut self, graphics: &mut Graphics) -> anyhow::Result<()> {
        self.update_scene_uniform(graphics)
    }

    fn build_command_buffers(&mut self, graphics: &mut Graphics) -> anyhow::Result<()> {
        let (model, pipeline) = match (self.model.as_ref(), self.pipeline.as_ref()) {
            (Some(model), Some(pipeline)) => (model, pipeline),
            _ => return Ok(()),
        };
        let device = graphics.logical_device.clone();
        let clear_values = graphics.clear_values();
        let viewport = graphics.viewport();
        let scissor = graphics.scissor();
        let render_area = Rect2D {
            offset: Default::default(),
            extent: graphics.swapchain()?.extent,
        };

        for (command_buffer, framebuffer) in graphics
            .draw_cmd_buffers
            .iter()
            .zip(graphics.frame_buffers.iter())
        {
            let begin_info = CommandBufferBeginInfo::builder();
            let render_pass_info = RenderPassBeginInfo::builder()
                .render_pass(graphics.render_pass)
                .framebuffer(*framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);
            unsafe {
                device
                    .begin_command_buffer(*command_buffer, &begin_info)
                    .with_context(|| "Failed to begin command buffer.")?;
                device.cmd_begin_render_pass(
                    *command_buffer,
                    &render_pass_info,
                    SubpassContents::INLINE,
                );
                device.cmd_set_viewport(*command_buffer, 0, &[viewport]);
                device.cmd_set_scissor(*command_buffer, 0, &[scissor]);
                device.cmd_bind_pipeline(
                    *command_buffer,
                    PipelineBindPoint::GRAPHICS,
                    pipeline.pipeline,
                );
                device.cmd_bind_descriptor_sets(
                    *command_buffer,
                    PipelineBindPoint::GRAPHICS,
                    pipeline.pipeline_layout,
                    0,
                    &[self.scene_set],
                    &[],
                );
            }
            model.draw(
                *command_buffer,
                RenderFlags::BIND_IMAGES,
                Some(pipeline.pipeline_layout),
                1,
            )?;
            graphics.draw_ui(*command_buffer);
            unsafe {
                device.cmd_end_render_pass(*command_buffer);
                device
                    .end_command_buffer(*command_buffer)
                    .with_context(|| "Failed to end command buffer.")?;
            }
        }
        Ok(())
    }
}

fn read_dimension(key: &str, default: u32) -> u32 {
    dotenv::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let log_level = dotenv::var("LOG").unwrap_or_default();
    Builder::new()
        .filter(
            None,
            match log_level.as_str() {
                "trace" => LevelFilter::Trace,
                "info" => LevelFilter::Info,
                "warn" => LevelFilter::Warn,
                "debug" => LevelFilter::Debug,
                "error" => LevelFilter::Error,
                _ => LevelFilter::Off,
            },
        )
        .default_format()
        .init();

    let settings = Settings::from_env();
    let width = read_dimension("WIDTH", DEFAULT_WIDTH);
    let height = read_dimension("HEIGHT", DEFAULT_HEIGHT);
    let model_path = PathBuf::from(
        dotenv::var("MODEL").unwrap_or_else(|_| "assets/models/CesiumMan/CesiumMan.gltf".to_string()),
    );
    let shader_dir = PathBuf::from(dotenv::var("SHADER_DIR").unwrap_or_else(|_| "shaders".to_string()));
    log::info!("Settings: {:?}", settings);

    let event_loop = EventLoop::new();
    let renderer = SkinnedModelRenderer::new(model_path, shader_dir);
    let mut application = Application::new(&event_loop, TITLE, width, height, settings, renderer)?;
    application.prepare()?;
    log::info!("Renderer prepared.");
    application.run(event_loop)
}
