use glam::{Mat4, Vec3, Vec4};

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct FrustumSide(usize);

impl FrustumSide {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const TOP: Self = Self(2);
    pub const BOTTOM: Self = Self(3);
    pub const BACK: Self = Self(4);
    pub const FRONT: Self = Self(5);
}

/// 視錐台。ビュー・プロジェクション行列から六つの平面を抽出する。<br />
/// View frustum. Extracts six planes from a view-projection matrix.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Default for Frustum {
    fn default() -> Self {
        Frustum {
            planes: [Vec4::ZERO; 6],
        }
    }
}

impl Frustum {
    pub fn from_matrix(matrix: Mat4) -> Self {
        let mut frustum = Frustum::default();
        frustum.update(matrix);
        frustum
    }

    pub fn update(&mut self, matrix: Mat4) {
        let columns = matrix.to_cols_array_2d();
        let row = |r: usize| {
            Vec4::new(columns[0][r], columns[1][r], columns[2][r], columns[3][r])
        };
        let (x, y, z, w) = (row(0), row(1), row(2), row(3));
        self.planes[FrustumSide::LEFT.0] = w + x;
        self.planes[FrustumSide::RIGHT.0] = w - x;
        self.planes[FrustumSide::TOP.0] = w - y;
        self.planes[FrustumSide::BOTTOM.0] = w + y;
        self.planes[FrustumSide::BACK.0] = w + z;
        self.planes[FrustumSide::FRONT.0] = w - z;
        for plane in self.planes.iter_mut() {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }
    }

    pub fn check_sphere(&self, position: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(position) + plane.w >= -radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_frustum_is_the_unit_clip_cube() {
        let frustum = Frustum::from_matrix(Mat4::IDENTITY);
        assert!(frustum.check_sphere(Vec3::ZERO, 0.5));
        assert!(frustum.check_sphere(Vec3::new(1.3, 0.0, 0.0), 0.5));
        assert!(!frustum.check_sphere(Vec3::new(3.0, 0.0, 0.0), 0.5));
        assert!(!frustum.check_sphere(Vec3::new(0.0, -2.0, 0.0), 0.25));
    }

    #[test]
    fn planes_are_normalized() {
        let projection = Mat4::perspective_rh(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        let frustum = Frustum::from_matrix(projection);
        for plane in frustum.planes.iter() {
            assert!((plane.truncate().length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn spheres_behind_the_camera_are_culled() {
        let projection = Mat4::perspective_rh(60.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let frustum = Frustum::from_matrix(projection);
        assert!(frustum.check_sphere(Vec3::new(0.0, 0.0, -5.0), 0.5));
        assert!(!frustum.check_sphere(Vec3::new(0.0, 0.0, 5.0), 0.5));
    }
}
