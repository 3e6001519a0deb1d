use glam::Mat4;

use super::NodeId;

/// 関節ノードと逆バインド行列の組。<br />
/// Joint nodes paired with their inverse-bind matrices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skin {
    pub name: String,
    pub skeleton_root: Option<NodeId>,
    pub joints: Vec<NodeId>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

impl Skin {
    /// 逆バインド行列がない関節には単位行列を使う。<br />
    /// Joints without an inverse-bind matrix use the identity.
    pub fn inverse_bind_matrix(&self, joint: usize) -> Mat4 {
        self.inverse_bind_matrices
            .get(joint)
            .copied()
            .unwrap_or(Mat4::IDENTITY)
    }
}
