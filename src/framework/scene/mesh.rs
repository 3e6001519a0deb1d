use ash::vk::DescriptorSet;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::framework::graphics::vk::Buffer;

/// メッシュ一つあたりの関節の最大数。<br />
/// Maximum number of joints per mesh.
pub const MAX_NUM_JOINTS: usize = 64;

/// メッシュごとのユニフォームバッファの内容。<br />
/// Contents of the per-mesh uniform buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct UniformBlock {
    pub matrix: Mat4,
    pub joint_matrix: [Mat4; MAX_NUM_JOINTS],
    pub joint_count: f32,
    _padding: [f32; 3],
}

unsafe impl Zeroable for UniformBlock {}
unsafe impl Pod for UniformBlock {}

impl Default for UniformBlock {
    fn default() -> Self {
        UniformBlock {
            matrix: Mat4::IDENTITY,
            joint_matrix: [Mat4::IDENTITY; MAX_NUM_JOINTS],
            joint_count: 0.0,
            _padding: [0.0; 3],
        }
    }
}

/// 境界ボックスの要約。<br />
/// Bounding-box summary.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Dimensions {
    pub min: Vec3,
    pub max: Vec3,
    pub size: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Dimensions {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(-f32::MAX),
            size: Vec3::ZERO,
            center: Vec3::ZERO,
            radius: 0.0,
        }
    }
}

impl Dimensions {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Dimensions {
            min,
            max,
            size: max - min,
            center: (min + max) / 2.0,
            radius: min.distance(max) / 2.0,
        }
    }
}

/// 共有の頂点・インデックスバッファの一区間と、そのマテリアル。<br />
/// A range of the shared vertex and index buffers together with its material.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub material: usize,
    pub dimensions: Dimensions,
}

pub struct Mesh {
    pub name: String,
    pub primitives: Vec<Primitive>,
    pub uniform_block: UniformBlock,
    /// 常にマップされているユニフォームバッファ。GPUなしで読み込んだ場合は`None`。<br />
    /// Persistently mapped uniform buffer. `None` when loaded without a GPU.
    pub uniform_buffer: Option<Buffer>,
    pub descriptor_set: DescriptorSet,
}

impl Mesh {
    pub fn new(name: String, matrix: Mat4) -> Self {
        Mesh {
            name,
            primitives: vec![],
            uniform_block: UniformBlock {
                matrix,
                ..Default::default()
            },
            uniform_buffer: None,
            descriptor_set: DescriptorSet::null(),
        }
    }

    /// ユニフォームブロック全体をマップ済みメモリーにコピーする。<br />
    /// Copies the whole uniform block into mapped memory.
    pub fn write_uniform_block(&mut self) -> anyhow::Result<()> {
        let block = self.uniform_block;
        match self.uniform_buffer.as_mut() {
            Some(buffer) => buffer.write(std::slice::from_ref(&block), 0),
            None => Ok(()),
        }
    }

    /// ワールド行列だけをコピーする。<br />
    /// Copies only the world matrix.
    pub fn write_matrix(&mut self) -> anyhow::Result<()> {
        let matrix = self.uniform_block.matrix;
        match self.uniform_buffer.as_mut() {
            Some(buffer) => buffer.write(std::slice::from_ref(&matrix), 0),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<UniformBlock>(), 64 + 64 * 64 + 16);
        assert_eq!(memoffset::offset_of!(UniformBlock, joint_count), 64 + 64 * 64);
    }

    #[test]
    fn dimensions_from_corners() {
        let d = Dimensions::new(Vec3::new(-1.0, -2.0, -2.0), Vec3::new(1.0, 2.0, 2.0));
        assert_eq!(d.size, Vec3::new(2.0, 4.0, 4.0));
        assert_eq!(d.center, Vec3::ZERO);
        assert!((d.radius - 3.0).abs() < 1e-6);
    }
}
