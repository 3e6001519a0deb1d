use glam::{Mat4, Vec3, Vec4};

use crate::framework::shared::enums::CameraType;

/// カメラの移動キーの状態。<br />
/// Movement key state of the camera.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CameraKeys {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

#[derive(Copy, Clone, Debug)]
pub struct CameraMatrices {
    pub perspective: Mat4,
    pub view: Mat4,
}

/// ビュー行列とプロジェクション行列を管理するカメラ。<br />
/// 回転は度数で保持する。<br />
/// Camera managing the view and projection matrices.<br />
/// Rotation is kept in degrees.
#[derive(Clone, Debug)]
pub struct Camera {
    pub camera_type: CameraType,
    pub rotation: Vec3,
    pub position: Vec3,
    pub view_pos: Vec4,
    pub rotation_speed: f32,
    pub movement_speed: f32,
    pub updated: bool,
    pub flip_y: bool,
    pub matrices: CameraMatrices,
    pub keys: CameraKeys,
    fov: f32,
    znear: f32,
    zfar: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            camera_type: CameraType::LookAt,
            rotation: Vec3::ZERO,
            position: Vec3::ZERO,
            view_pos: Vec4::ZERO,
            rotation_speed: 1.0,
            movement_speed: 1.0,
            updated: false,
            flip_y: false,
            matrices: CameraMatrices {
                perspective: Mat4::IDENTITY,
                view: Mat4::IDENTITY,
            },
            keys: CameraKeys::default(),
            fov: 60.0,
            znear: 0.1,
            zfar: 256.0,
        }
    }
}

impl Camera {
    pub fn new(camera_type: CameraType) -> Self {
        Camera {
            camera_type,
            ..Default::default()
        }
    }

    pub fn moving(&self) -> bool {
        self.keys.left || self.keys.right || self.keys.up || self.keys.down
    }

    pub fn near_clip(&self) -> f32 {
        self.znear
    }

    pub fn far_clip(&self) -> f32 {
        self.zfar
    }

    /// 垂直画角は度数で指定する。<br />
    /// The vertical field of view is given in degrees.
    pub fn set_perspective(&mut self, fov: f32, aspect: f32, znear: f32, zfar: f32) {
        self.fov = fov;
        self.znear = znear;
        self.zfar = zfar;
        self.update_aspect_ratio(aspect);
    }

    pub fn update_aspect_ratio(&mut self, aspect: f32) {
        self.matrices.perspective =
            Mat4::perspective_rh(self.fov.to_radians(), aspect, self.znear, self.zfar);
        if self.flip_y {
            self.matrices.perspective.y_axis.y *= -1.0;
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view_matrix();
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.update_view_matrix();
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.position = translation;
        self.update_view_matrix();
    }

    pub fn rotate(&mut self, delta: Vec3) {
        self.rotation += delta;
        self.update_view_matrix();
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.update_view_matrix();
    }

    /// 一人称カメラをキーの状態に応じて移動させる。<br />
    /// Moves a first-person camera according to the key state.
    pub fn update(&mut self, delta_time: f32) {
        self.updated = false;
        if self.camera_type != CameraType::FirstPerson || !self.moving() {
            return;
        }
        let front = self.front();
        let right = front.cross(Vec3::Y).normalize();
        let move_speed = delta_time * self.movement_speed;
        if self.keys.up {
            self.position += front * move_speed;
        }
        if self.keys.down {
            self.position -= front * move_speed;
        }
        if self.keys.left {
            self.position -= right * move_speed;
        }
        if self.keys.right {
            self.position += right * move_speed;
        }
        self.update_view_matrix();
    }

    fn front(&self) -> Vec3 {
        let pitch = self.rotation.x.to_radians();
        let yaw = self.rotation.y.to_radians();
        Vec3::new(-pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos()).normalize()
    }

    fn update_view_matrix(&mut self) {
        let pitch = self.rotation.x * if self.flip_y { -1.0 } else { 1.0 };
        let rotation = Mat4::from_rotation_x(pitch.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_z(self.rotation.z.to_radians());
        let mut translation = self.position;
        if self.flip_y {
            translation.y *= -1.0;
        }
        let translation = Mat4::from_translation(translation);
        self.matrices.view = match self.camera_type {
            CameraType::FirstPerson => rotation * translation,
            CameraType::LookAt => translation * rotation,
        };
        self.view_pos = self.position.extend(0.0) * Vec4::new(-1.0, 1.0, -1.0, 1.0);
        self.updated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_view_applies_translation_after_rotation() {
        let mut camera = Camera::new(CameraType::LookAt);
        camera.set_rotation(Vec3::new(0.0, 90.0, 0.0));
        camera.set_position(Vec3::new(0.0, 0.0, -2.5));
        assert!(camera.updated);
        let origin = camera.matrices.view.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -2.5), 1e-5));
        assert!(camera
            .view_pos
            .abs_diff_eq(Vec4::new(0.0, 0.0, 2.5, 0.0), 1e-6));
    }

    #[test]
    fn first_person_moves_along_front_vector() {
        let mut camera = Camera::new(CameraType::FirstPerson);
        camera.movement_speed = 2.0;
        camera.keys.up = true;
        assert!(camera.moving());
        camera.update(0.5);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-5));
        assert!(camera.updated);

        camera.keys.up = false;
        camera.update(0.5);
        assert!(!camera.updated);
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-5));
    }

    #[test]
    fn look_at_camera_ignores_movement_keys() {
        let mut camera = Camera::new(CameraType::LookAt);
        camera.keys.left = true;
        camera.update(1.0);
        assert_eq!(camera.position, Vec3::ZERO);
    }

    #[test]
    fn flip_y_negates_projection_y() {
        let mut camera = Camera::default();
        camera.set_perspective(60.0, 1.0, 0.1, 256.0);
        let regular = camera.matrices.perspective.y_axis.y;
        camera.flip_y = true;
        camera.update_aspect_ratio(1.0);
        assert_eq!(camera.matrices.perspective.y_axis.y, -regular);
        assert!(regular > 0.0);
    }

    #[test]
    fn rotate_and_translate_accumulate() {
        let mut camera = Camera::default();
        camera.rotate(Vec3::new(10.0, 0.0, 0.0));
        camera.rotate(Vec3::new(5.0, -3.0, 0.0));
        camera.translate(Vec3::new(0.0, 0.0, 1.0));
        camera.translate(Vec3::new(0.0, 0.0, 0.5));
        assert!(camera.rotation.abs_diff_eq(Vec3::new(15.0, -3.0, 0.0), 1e-6));
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.5), 1e-6));
    }
}
