use ash::vk::{
    Format, PipelineVertexInputStateCreateInfo, VertexInputAttributeDescription,
    VertexInputBindingDescription, VertexInputRate,
};
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::framework::shared::enums::VertexComponent;

/// シーン全体で共有する頂点バッファの要素。<br />
/// Element of the vertex buffer shared by the whole scene.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vertex {
    pub pos: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub color: Vec4,
    pub joint0: Vec4,
    pub weight0: Vec4,
    pub tangent: Vec4,
}

unsafe impl Zeroable for Vertex {}
unsafe impl Pod for Vertex {}

impl Vertex {
    pub fn input_binding_description(binding: u32) -> VertexInputBindingDescription {
        VertexInputBindingDescription::builder()
            .binding(binding)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(VertexInputRate::VERTEX)
            .build()
    }

    pub fn input_attribute_description(
        binding: u32,
        location: u32,
        component: VertexComponent,
    ) -> VertexInputAttributeDescription {
        let (format, offset) = match component {
            VertexComponent::Position => (Format::R32G32B32_SFLOAT, memoffset::offset_of!(Vertex, pos)),
            VertexComponent::Normal => (Format::R32G32B32_SFLOAT, memoffset::offset_of!(Vertex, normal)),
            VertexComponent::UV => (Format::R32G32_SFLOAT, memoffset::offset_of!(Vertex, uv)),
            VertexComponent::Color => (Format::R32G32B32A32_SFLOAT, memoffset::offset_of!(Vertex, color)),
            VertexComponent::Tangent => (Format::R32G32B32A32_SFLOAT, memoffset::offset_of!(Vertex, tangent)),
            VertexComponent::Joint0 => (Format::R32G32B32A32_SFLOAT, memoffset::offset_of!(Vertex, joint0)),
            VertexComponent::Weight0 => (Format::R32G32B32A32_SFLOAT, memoffset::offset_of!(Vertex, weight0)),
        };
        VertexInputAttributeDescription::builder()
            .binding(binding)
            .location(location)
            .format(format)
            .offset(offset as u32)
            .build()
    }

    /// 要素の順に連番のロケーションを割り当てる。<br />
    /// Assigns consecutive locations in component order.
    pub fn input_attribute_descriptions(
        binding: u32,
        components: &[VertexComponent],
    ) -> Vec<VertexInputAttributeDescription> {
        components
            .iter()
            .enumerate()
            .map(|(location, component)| {
                Self::input_attribute_description(binding, location as u32, *component)
            })
            .collect()
    }
}

/// `PipelineVertexInputStateCreateInfo`が指す配列を所有する。<br />
/// Owns the arrays a `PipelineVertexInputStateCreateInfo` points to.
pub struct VertexInputState {
    pub binding_descriptions: [VertexInputBindingDescription; 1],
    pub attribute_descriptions: Vec<VertexInputAttributeDescription>,
}

impl VertexInputState {
    pub fn new(components: &[VertexComponent]) -> Self {
        VertexInputState {
            binding_descriptions: [Vertex::input_binding_description(0)],
            attribute_descriptions: Vertex::input_attribute_descriptions(0, components),
        }
    }

    /// 返される構造体は`self`より長く生きてはいけない。<br />
    /// The returned struct must not outlive `self`.
    pub fn create_info(&self) -> PipelineVertexInputStateCreateInfo {
        PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.binding_descriptions)
            .vertex_attribute_descriptions(self.attribute_descriptions.as_slice())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 96);
        let color = Vertex::input_attribute_description(0, 3, VertexComponent::Color);
        assert_eq!(color.offset, 32);
        assert_eq!(color.format, Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn locations_follow_component_order() {
        let components = [
            VertexComponent::Position,
            VertexComponent::Normal,
            VertexComponent::UV,
            VertexComponent::Joint0,
            VertexComponent::Weight0,
        ];
        let descriptions = Vertex::input_attribute_descriptions(1, &components);
        let locations = descriptions.iter().map(|d| d.location).collect::<Vec<_>>();
        assert_eq!(locations, vec![0, 1, 2, 3, 4]);
        assert!(descriptions.iter().all(|d| d.binding == 1));
        assert_eq!(descriptions[3].offset, 48);
    }

    #[test]
    fn input_state_points_at_owned_arrays() {
        let state = VertexInputState::new(&[VertexComponent::Position, VertexComponent::UV]);
        let info = state.create_info();
        assert_eq!(info.vertex_binding_description_count, 1);
        assert_eq!(info.vertex_attribute_description_count, 2);
        assert_eq!(state.binding_descriptions[0].stride, 96);
    }
}
