use anyhow::Context;
use ash::vk::{
    BufferUsageFlags, CommandBuffer, DescriptorSet, DescriptorSetLayout, DescriptorType,
    DeviceSize, IndexType, MemoryPropertyFlags, PipelineBindPoint, PipelineLayout,
    ShaderStageFlags,
};
use ash::Device;
use std::path::Path;
use std::sync::{Arc, Weak};

use crate::framework::graphics::vk::{Buffer, DescriptorBuilder, Graphics};
use crate::framework::scene::{
    Dimensions, FileLoadingFlags, NodeId, RenderFlags, SceneGraph, Texture, UniformBlock,
};
use crate::framework::shared::util::{end_one_time_command_buffer, get_single_time_command_buffer};

/// ノードのユニフォームバッファを結び付けるセット番号。<br />
/// Set number the node uniform buffers are bound to.
pub const NODE_DESCRIPTOR_SET: u32 = 2;

/// GPUに転送済みのglTFモデル。<br />
/// A glTF model uploaded to the GPU.
pub struct Model {
    pub scene: SceneGraph,
    pub textures: Vec<Texture>,
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub ubo_layout: DescriptorSetLayout,
    pub image_layout: DescriptorSetLayout,
    buffers_bound: bool,
    logical_device: Weak<Device>,
}

impl Model {
    pub fn load_from_file<P: AsRef<Path>>(
        file_name: P,
        graphics: &mut Graphics,
        flags: FileLoadingFlags,
        scale: f32,
    ) -> anyhow::Result<Self> {
        let scene = SceneGraph::load_from_file(file_name, flags, scale)?;
        Self::new(scene, graphics)
    }

    /// シーングラフの頂点、インデックス、テクスチャ、ユニフォームバッファをGPUに転送する。<br />
    /// Uploads the scene graph's vertices, indices, textures and uniform buffers to the GPU.
    pub fn new(mut scene: SceneGraph, graphics: &mut Graphics) -> anyhow::Result<Self> {
        let textures = {
            let context = graphics.upload_context();
            scene
                .images
                .iter()
                .map(|image| Texture::new(image, &context))
                .collect::<anyhow::Result<Vec<_>>>()?
        };

        let (vertex_buffer, index_buffer) = Self::upload_geometry(&scene, graphics)?;

        for node in scene.nodes.iter_mut() {
            if let Some(mesh) = node.mesh.as_mut() {
                mesh.uniform_buffer = Some(Buffer::new(
                    graphics.device_handle(),
                    std::mem::size_of::<UniformBlock>() as DeviceSize,
                    BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
                    graphics.allocator_handle(),
                )?);
                mesh.write_uniform_block()?;
            }
        }

        let (ubo_layout, image_layout) = Self::setup_descriptors(&mut scene, &textures, graphics)?;
        log::info!(
            "Model uploaded: {} textures, {} vertices, {} indices.",
            textures.len(),
            scene.vertices.len(),
            scene.indices.len()
        );

        Ok(Model {
            scene,
            textures,
            vertex_buffer,
            index_buffer,
            ubo_layout,
            image_layout,
            buffers_bound: false,
            logical_device: graphics.device_handle(),
        })
    }

    pub fn scene_dimensions(&self) -> Dimensions {
        self.scene.dimensions
    }

    pub fn update_animation(&mut self, index: usize, time: f32) -> anyhow::Result<()> {
        self.scene.update_animation(index, time)
    }

    /// 頂点バッファとインデックスバッファを結び付ける。以後の`draw`では結び付けを省く。<br />
    /// Binds the vertex and index buffers. Subsequent `draw` calls skip binding.
    pub fn bind_buffers(&mut self, command_buffer: CommandBuffer) -> anyhow::Result<()> {
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        self.bind_buffers_with(&device, command_buffer);
        self.buffers_bound = true;
        Ok(())
    }

    pub fn draw(
        &self,
        command_buffer: CommandBuffer,
        render_flags: RenderFlags,
        pipeline_layout: Option<PipelineLayout>,
        bind_image_set: u32,
    ) -> anyhow::Result<()> {
        let device = self
            .logical_device
            .upgrade()
            .with_context(|| "Failed to upgrade device handle.")?;
        if !self.buffers_bound {
            self.bind_buffers_with(&device, command_buffer);
        }
        for root in self.scene.roots.iter() {
            self.draw_node(
                &device,
                *root,
                command_buffer,
                render_flags,
                pipeline_layout,
                bind_image_set,
            );
        }
        Ok(())
    }

    fn draw_node(
        &self,
        device: &Device,
        id: NodeId,
        command_buffer: CommandBuffer,
        render_flags: RenderFlags,
        pipeline_layout: Option<PipelineLayout>,
        bind_image_set: u32,
    ) {
        let node = self.scene.node(id);
        if let Some(mesh) = node.mesh.as_ref() {
            unsafe {
                if let Some(layout) = pipeline_layout {
                    device.cmd_bind_descriptor_sets(
                        command_buffer,
                        PipelineBindPoint::GRAPHICS,
                        layout,
                        NODE_DESCRIPTOR_SET,
                        &[mesh.descriptor_set],
                        &[],
                    );
                }
                for primitive in mesh.primitives.iter() {
                    if let (true, Some(layout), Some(material)) = (
                        render_flags.contains(RenderFlags::BIND_IMAGES),
                        pipeline_layout,
                        self.scene.materials.get(primitive.material),
                    ) {
                        if material.descriptor_set != DescriptorSet::null() {
                            device.cmd_bind_descriptor_sets(
                                command_buffer,
                                PipelineBindPoint::GRAPHICS,
                                layout,
                                bind_image_set,
                                &[material.descriptor_set],
                                &[],
                            );
                        }
                    }
                    device.cmd_draw_indexed(
                        command_buffer,
                        primitive.index_count,
                        1,
                        primitive.first_index,
                        0,
                        0,
                    );
                }
            }
        }
        for child in node.children.iter() {
            self.draw_node(
                device,
                *child,
                command_buffer,
                render_flags,
                pipeline_layout,
                bind_image_set,
            );
        }
    }

    fn bind_buffers_with(&self, device: &Device, command_buffer: CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(
                command_buffer,
                self.index_buffer.buffer,
                0,
                IndexType::UINT32,
            );
        }
    }

    /// ステージングバッファを経由してデバイスローカルのバッファにコピーする。<br />
    /// Copies the geometry into device-local buffers through staging buffers.
    fn upload_geometry(scene: &SceneGraph, graphics: &Graphics) -> anyhow::Result<(Buffer, Buffer)> {
        let vertex_size = std::mem::size_of_val(scene.vertices.as_slice()) as DeviceSize;
        let index_size = std::mem::size_of_val(scene.indices.as_slice()) as DeviceSize;
        if vertex_size == 0 || index_size == 0 {
            return Err(anyhow::anyhow!(
                "Cannot upload empty geometry (vertex size {}, index size {}).",
                vertex_size,
                index_size
            ));
        }

        let vertex_staging = Buffer::with_data(
            graphics.device_handle(),
            BufferUsageFlags::TRANSFER_SRC,
            scene.vertices.as_slice(),
            graphics.allocator_handle(),
        )?;
        let index_staging = Buffer::with_data(
            graphics.device_handle(),
            BufferUsageFlags::TRANSFER_SRC,
            scene.indices.as_slice(),
            graphics.allocator_handle(),
        )?;
        let vertex_buffer = Buffer::new(
            graphics.device_handle(),
            vertex_size,
            BufferUsageFlags::VERTEX_BUFFER | BufferUsageFlags::TRANSFER_DST,
            MemoryPropertyFlags::DEVICE_LOCAL,
            graphics.allocator_handle(),
        )?;
        let index_buffer = Buffer::new(
            graphics.device_handle(),
            index_size,
            BufferUsageFlags::INDEX_BUFFER | BufferUsageFlags::TRANSFER_DST,
            MemoryPropertyFlags::DEVICE_LOCAL,
            graphics.allocator_handle(),
        )?;

        let pool = graphics.command_pool;
        let queue = graphics.graphics_queue;
        let device: &Arc<Device> = &graphics.logical_device;
        let cmd_buffer = get_single_time_command_buffer(device, pool)?;
        vertex_buffer.copy_buffer(&vertex_staging, vertex_size, pool, queue, Some(cmd_buffer))?;
        index_buffer.copy_buffer(&index_staging, index_size, pool, queue, Some(cmd_buffer))?;
        end_one_time_command_buffer(cmd_buffer, device, pool, queue)?;
        drop(vertex_staging);
        drop(index_staging);
        Ok((vertex_buffer, index_buffer))
    }

    /// メッシュごとのUBOセットと、ベースカラーテクスチャを持つマテリアルごとの画像セットを作る。<br />
    /// Creates one UBO set per mesh and one image set per material with a base-color texture.
    fn setup_descriptors(
        scene: &mut SceneGraph,
        textures: &[Texture],
        graphics: &mut Graphics,
    ) -> anyhow::Result<(DescriptorSetLayout, DescriptorSetLayout)> {
        let ubo_layout = DescriptorBuilder::builder(
            &mut graphics.layout_cache,
            &mut graphics.descriptor_allocator,
        )
        .bind_buffer(0, &[], DescriptorType::UNIFORM_BUFFER, ShaderStageFlags::VERTEX)
        .layout()?;
        let image_layout = DescriptorBuilder::builder(
            &mut graphics.layout_cache,
            &mut graphics.descriptor_allocator,
        )
        .bind_image(
            0,
            &[],
            DescriptorType::COMBINED_IMAGE_SAMPLER,
            ShaderStageFlags::FRAGMENT,
        )
        .layout()?;

        for node in scene.nodes.iter_mut() {
            let mesh = match node.mesh.as_mut() {
                Some(mesh) => mesh,
                None => continue,
            };
            let buffer_info = match mesh.uniform_buffer.as_ref() {
                Some(buffer) => [buffer.descriptor()],
                None => continue,
            };
            let (set, _) = DescriptorBuilder::builder(
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
            mesh.descriptor_set = set;
        }

        for material in scene.materials.iter_mut() {
            let texture = match material.base_color_texture.and_then(|i| textures.get(i)) {
                Some(texture) => texture,
                None => continue,
            };
            let image_info = [texture.descriptor()];
            let (set, _) = DescriptorBuilder::builder(
                &mut graphics.layout_cache,
                &mut graphics.descriptor_allocator,
            )
            .bind_image(
                0,
                &image_info,
                DescriptorType::COMBINED_IMAGE_SAMPLER,
                ShaderStageFlags::FRAGMENT,
            )
            .build()?;
            material.descriptor_set = set;
        }

        Ok((ubo_layout, image_layout))
    }
}
