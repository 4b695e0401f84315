//! Perspective camera with pitch/yaw orientation.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub fov_dgr: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_dgr: 75.0,
            z_near: 0.1,
            z_far: 100.0,
        }
    }
}

/// Camera state owned by the application. `angles.x` is pitch, `angles.y` is
/// yaw, both in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub angles: Vec2,
    pub settings: CameraSettings,
    projection: Mat4,
}

impl Camera {
    pub fn new(position: Vec3, angles: Vec2, settings: CameraSettings) -> Self {
        let mut camera = Self {
            position,
            angles,
            settings,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection(1, 1);
        camera
    }

    /// Recompute the projection for a new viewport size.
    pub fn update_projection(&mut self, width: u32, height: u32) {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        self.projection = Mat4::perspective_rh(
            self.settings.fov_dgr.to_radians(),
            aspect,
            self.settings.z_near,
            self.settings.z_far,
        );
    }

    fn rotation(&self) -> Mat4 {
        Mat4::from_rotation_x(self.angles.x) * Mat4::from_rotation_y(self.angles.y)
    }

    /// Rotation first, then the inverse translation.
    pub fn view_matrix(&self) -> Mat4 {
        self.rotation() * Mat4::from_translation(-self.position)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Snapshot of everything the passes need for one frame.
    pub fn frame(&self) -> FrameCamera {
        let view = self.view_matrix();
        FrameCamera {
            position: self.position,
            view,
            projection: self.projection,
            view_projection: self.projection * view,
            settings: self.settings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCamera {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub settings: CameraSettings,
}

impl FrameCamera {
    pub fn mvp(&self, model: Mat4) -> Mat4 {
        self.view_projection * model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_moves_scene_opposite_to_camera() {
        let camera = Camera::new(Vec3::new(0.0, 2.5, 5.0), Vec2::ZERO, CameraSettings::default());
        let p = camera.view_matrix().transform_point3(Vec3::new(0.0, 2.5, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn test_projection_tracks_aspect() {
        let mut camera = Camera::new(Vec3::ZERO, Vec2::ZERO, CameraSettings::default());
        camera.update_projection(1920, 1080);
        let wide = camera.projection_matrix();
        camera.update_projection(1080, 1080);
        assert_ne!(wide, camera.projection_matrix());
        let frame = camera.frame();
        assert_eq!(frame.mvp(Mat4::IDENTITY), frame.view_projection);
    }
}
