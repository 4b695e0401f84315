//! Small math helpers shared by passes and configuration.

use glam::{Mat4, Vec3};

/// Unit direction for spherical angles in degrees. `phi` rotates around +Y
/// (horizontal), `theta` is measured from +Y (vertical).
pub fn spherical_to_cartesian(phi_dgr: f32, theta_dgr: f32) -> Vec3 {
    let phi = phi_dgr.to_radians();
    let theta = theta_dgr.to_radians();
    Vec3::new(phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin())
}

/// `0xRRGGBB` to linear `[0, 1]` components.
pub const fn hex_to_rgb(hex: u32) -> [f32; 3] {
    rgb8([
        ((hex >> 16) & 0xff) as u8,
        ((hex >> 8) & 0xff) as u8,
        (hex & 0xff) as u8,
    ])
}

pub const fn rgb8(rgb: [u8; 3]) -> [f32; 3] {
    [
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    ]
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Orthographic box for directional light shadows.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrthoBox {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrthoBox {
    fn default() -> Self {
        Self {
            left: -10.0,
            right: 10.0,
            bottom: -10.0,
            top: 10.0,
            near: 0.1,
            far: 20.0,
        }
    }
}

impl OrthoBox {
    pub fn matrix(&self) -> Mat4 {
        Mat4::orthographic_rh(self.left, self.right, self.bottom, self.top, self.near, self.far)
    }
}

/// View-projection of a directional light at `position` looking at `target`.
pub fn light_view_projection(position: Vec3, target: Vec3, projection: &OrthoBox) -> Mat4 {
    projection.matrix() * Mat4::look_at_rh(position, target, Vec3::Y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spherical_to_cartesian() {
        let p = spherical_to_cartesian(140.0, 45.0) * 5.0;
        let (phi, theta) = (140f32.to_radians(), 45f32.to_radians());
        let expected = Vec3::new(
            phi.cos() * theta.sin() * 5.0,
            theta.cos() * 5.0,
            phi.sin() * theta.sin() * 5.0,
        );
        assert!(p.abs_diff_eq(expected, 1e-5));
        assert!((p.length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb(0x404040), [64.0 / 255.0; 3]);
        let [r, g, b] = hex_to_rgb(0xde875d);
        assert_eq!((r * 255.0).round(), 222.0);
        assert_eq!((g * 255.0).round(), 135.0);
        assert_eq!((b * 255.0).round(), 93.0);
    }

    #[test]
    fn test_light_view_projection_maps_target_inside_box() {
        let position = spherical_to_cartesian(140.0, 45.0) * 10.0;
        let vp = light_view_projection(position, Vec3::ZERO, &OrthoBox::default());
        let clip = vp.project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
        assert!(clip.z > 0.0 && clip.z < 1.0);
    }
}
