use ash::vk::DescriptorSet;
use glam::Vec4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlphaMode {
    Opaque,
    Mask,
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(mode: gltf::material::AlphaMode) -> Self {
        match mode {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        }
    }
}

/// PBRのマテリアル。テクスチャはシーンのテクスチャ配列への添字。<br />
/// A PBR material. Textures are indices into the scene's texture list.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub base_color_factor: Vec4,
    pub base_color_texture: Option<usize>,
    pub metallic_roughness_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub occlusion_texture: Option<usize>,
    pub emissive_texture: Option<usize>,
    pub descriptor_set: DescriptorSet,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 1.0,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            base_color_factor: Vec4::ONE,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            descriptor_set: DescriptorSet::null(),
        }
    }
}

impl Material {
    pub fn from_gltf(material: &gltf::Material) -> Self {
        let pbr = material.pbr_metallic_roughness();
        let texture_source = |info: Option<gltf::texture::Info>| {
            info.map(|i| i.texture().source().index())
        };
        Material {
            alpha_mode: AlphaMode::from(material.alpha_mode()),
            alpha_cutoff: material.alpha_cutoff().unwrap_or(1.0),
            metallic_factor: pbr.metallic_factor(),
            roughness_factor: pbr.roughness_factor(),
            base_color_factor: Vec4::from(pbr.base_color_factor()),
            base_color_texture: texture_source(pbr.base_color_texture()),
            metallic_roughness_texture: texture_source(pbr.metallic_roughness_texture()),
            normal_texture: material
                .normal_texture()
                .map(|t| t.texture().source().index()),
            occlusion_texture: material
                .occlusion_texture()
                .map(|t| t.texture().source().index()),
            emissive_texture: texture_source(material.emissive_texture()),
            descriptor_set: DescriptorSet::null(),
        }
    }
}
