use glam::{Mat4, Quat, Vec3};

use super::Mesh;

/// ノードの配列上の位置。親子関係はこのハンドルで表す。<br />
/// Position of a node in the node arena. Parent and child links are expressed with this handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// シーングラフのノード。<br />
/// A node of the scene graph.
pub struct Node {
    /// glTFドキュメント内のインデックス。<br />
    /// Index within the glTF document.
    pub index: usize,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub matrix: Mat4,
    pub mesh: Option<Mesh>,
    /// ドキュメントが指定したスキンのインデックス。<br />
    /// Skin index declared by the document.
    pub skin_index: Option<usize>,
    /// 読み込み後に結び付けられたスキン。<br />
    /// Skin bound after loading.
    pub skin: Option<usize>,
}

impl Node {
    pub fn new(index: usize, name: String, parent: Option<NodeId>) -> Self {
        Node {
            index,
            name,
            parent,
            children: vec![],
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            matrix: Mat4::IDENTITY,
            mesh: None,
            skin_index: None,
            skin: None,
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scale)
            * self.matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_matrix_applies_scale_rotation_then_translation() {
        let mut node = Node::new(0, String::new(), None);
        node.translation = Vec3::new(1.0, 0.0, 0.0);
        node.rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        node.scale = Vec3::splat(2.0);
        let p = node.local_matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn raw_matrix_is_applied_last() {
        let mut node = Node::new(0, String::new(), None);
        node.matrix = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
        node.scale = Vec3::splat(3.0);
        let p = node.local_matrix().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 15.0, 0.0), 1e-5));
    }
}
