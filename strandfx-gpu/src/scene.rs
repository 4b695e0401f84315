//! Scene components stored in the [`World`](strandfx_data::World).
//!
//! Components that own GPU resources must be released with their `destroy`
//! method before the device goes away; nothing is freed on drop.

use glam::{Mat4, Quat, Vec2, Vec3};
use strandfx_data::{PreparedHair, Shape, StrandLayout};
use tracing::debug;

use crate::backend::{BackendError, GpuBackend};
use crate::device::{Device, TextureError};
use crate::resource::{
    AttributeFormat, BufferKind, ResourceError, Texture, TextureDesc, TextureFormat,
    TextureOptions, VertexArray, VertexArrayBuildError, VertexArrayBuilder,
};

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("Mesh '{label}' has {positions} positions but {other} {attribute}")]
    AttributeCount {
        label: String,
        attribute: &'static str,
        positions: usize,
        other: usize,
    },

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error(transparent)]
    VertexArray(#[from] VertexArrayBuildError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

/// Indexed triangle mesh with positions, normals and texture coordinates.
#[derive(Debug)]
pub struct Mesh {
    vertex_array: VertexArray,
}

impl Mesh {
    pub const POSITION_LOCATION: u32 = 0;
    pub const NORMAL_LOCATION: u32 = 1;
    pub const UV_LOCATION: u32 = 2;

    pub fn upload<B: GpuBackend>(
        device: &mut Device<B>,
        label: &str,
        positions: &[Vec3],
        normals: &[Vec3],
        uvs: &[Vec2],
        indices: &[u32],
    ) -> Result<Self, SceneError> {
        let check = |attribute: &'static str, other: usize| {
            if other == positions.len() {
                Ok(())
            } else {
                Err(SceneError::AttributeCount {
                    label: label.to_string(),
                    attribute,
                    positions: positions.len(),
                    other,
                })
            }
        };
        check("normals", normals.len())?;
        check("uvs", uvs.len())?;

        let positions: Vec<[f32; 3]> = positions.iter().map(|p| p.to_array()).collect();
        let normals: Vec<[f32; 3]> = normals.iter().map(|n| n.to_array()).collect();
        let uvs: Vec<[f32; 2]> = uvs.iter().map(|uv| uv.to_array()).collect();

        let position_buffer = device.create_buffer_from(BufferKind::Vertex, &positions)?;
        let normal_buffer = device.create_buffer_from(BufferKind::Vertex, &normals)?;
        let uv_buffer = device.create_buffer_from(BufferKind::Vertex, &uvs)?;
        let index_buffer = device.create_buffer_from(BufferKind::Index, indices)?;

        let vertex_array = device.create_vertex_array(
            VertexArrayBuilder::new(label)
                .attribute(Self::POSITION_LOCATION, position_buffer, AttributeFormat::Vec3)
                .attribute(Self::NORMAL_LOCATION, normal_buffer, AttributeFormat::Vec3)
                .attribute(Self::UV_LOCATION, uv_buffer, AttributeFormat::Vec2)
                .indices(index_buffer, indices.len() as u32),
        )?;
        debug!(mesh = label, vertices = positions.len(), indices = indices.len(), "Mesh uploaded");
        Ok(Self { vertex_array })
    }

    /// Upload a shape centered at the origin. Normals point away from the
    /// center and texture coordinates are spherical.
    pub fn from_shape<B: GpuBackend>(
        device: &mut Device<B>,
        label: &str,
        shape: &Shape,
    ) -> Result<Self, SceneError> {
        let normals: Vec<Vec3> = shape.vertices.iter().map(|v| v.normalize_or_zero()).collect();
        let uvs: Vec<Vec2> = normals
            .iter()
            .map(|n| {
                Vec2::new(
                    0.5 + n.z.atan2(n.x) / std::f32::consts::TAU,
                    0.5 - n.y.asin() / std::f32::consts::PI,
                )
            })
            .collect();
        Self::upload(device, label, &shape.vertices, &normals, &uvs, &shape.indices)
    }

    pub fn vertex_array(&self) -> &VertexArray {
        &self.vertex_array
    }

    pub fn destroy<B: GpuBackend>(&mut self, device: &mut Device<B>) -> Result<(), ResourceError> {
        device.destroy_vertex_array(&mut self.vertex_array)
    }
}

/// Surface appearance of a mesh. Skin shading parameters are global and live in
/// the configuration.
#[derive(Debug)]
pub struct Material {
    pub albedo: Texture,
}

impl Material {
    /// A material whose albedo is a single texel of `rgb`.
    pub fn solid_color<B: GpuBackend>(
        device: &mut Device<B>,
        label: &str,
        rgb: [f32; 3],
    ) -> Result<Self, SceneError> {
        let texel = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let albedo = device.create_texture_with_data(
            TextureDesc::new_2d(label, 1, 1, TextureFormat::Rgba8),
            &[texel[0], texel[1], texel[2], 255],
        )?;
        Ok(Self { albedo })
    }

    pub fn destroy<B: GpuBackend>(&mut self, device: &mut Device<B>) -> Result<(), ResourceError> {
        device.destroy_texture(&mut self.albedo)
    }
}

/// Hair strands uploaded for vertex-texture fetch.
///
/// Control-vertex positions and tangents are one RGBA32F texel each. The
/// vertex array holds only the ribbon indices; ribbon vertex `v` belongs to
/// control vertex `v / 2` and side `v % 2`.
#[derive(Debug)]
pub struct HairStrands {
    pub layout: StrandLayout,
    pub positions: Texture,
    pub tangents: Texture,
    pub indices: VertexArray,
}

impl HairStrands {
    pub fn upload<B: GpuBackend>(
        device: &mut Device<B>,
        label: &str,
        hair: &PreparedHair,
    ) -> Result<Self, SceneError> {
        let desc = |suffix: &str| {
            TextureDesc::new_2d(
                format!("{label}.{suffix}"),
                hair.extent.width,
                hair.extent.height,
                TextureFormat::Rgba32F,
            )
            .with_options(TextureOptions::nearest())
        };

        let mut positions = device.create_texture(desc("positions"))?;
        let mut tangents = match device.create_texture(desc("tangents")) {
            Ok(texture) => texture,
            Err(err) => {
                device.destroy_texture(&mut positions)?;
                return Err(err.into());
            }
        };
        let uploaded = device
            .write_texels(&positions, 0, &hair.position_texels)
            .and_then(|()| device.write_texels(&tangents, 0, &hair.tangent_texels));
        if let Err(err) = uploaded {
            device.destroy_texture(&mut positions)?;
            device.destroy_texture(&mut tangents)?;
            return Err(err.into());
        }

        let index_buffer = device.create_buffer_from(BufferKind::Index, &hair.indices)?;
        let indices = device.create_vertex_array(
            VertexArrayBuilder::new(format!("{label}.indices"))
                .indices(index_buffer, hair.indices.len() as u32),
        )?;

        debug!(
            hair = label,
            strands = hair.layout.num_strands,
            vertices_per_strand = hair.layout.vertices_per_strand,
            width = hair.extent.width,
            height = hair.extent.height,
            "Hair uploaded"
        );
        Ok(Self {
            layout: hair.layout,
            positions,
            tangents,
            indices,
        })
    }

    pub fn destroy<B: GpuBackend>(&mut self, device: &mut Device<B>) -> Result<(), ResourceError> {
        device.destroy_texture(&mut self.positions)?;
        device.destroy_texture(&mut self.tangents)?;
        device.destroy_vertex_array(&mut self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resource::GpuResource;
    use strandfx_data::{StrandSet, generate_sphere};

    #[test]
    fn test_model_matrix_applies_scale_then_translation() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).with_scale(2.0);
        let p = transform.model_matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn test_mesh_rejects_mismatched_attributes() {
        let mut device = Device::new(RecordingBackend::new());
        let err = Mesh::upload(
            &mut device,
            "bad",
            &[Vec3::ZERO; 3],
            &[Vec3::Y; 2],
            &[Vec2::ZERO; 3],
            &[0, 1, 2],
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::AttributeCount { attribute: "normals", .. }));
    }

    #[test]
    fn test_sphere_mesh_round_trip() {
        let mut device = Device::new(RecordingBackend::new());
        let shape = generate_sphere(1.0, 12, 6);
        let mut mesh = Mesh::from_shape(&mut device, "sphere", &shape).unwrap();
        assert_eq!(mesh.vertex_array().index_count(), Some(shape.indices.len() as u32));
        assert_eq!(mesh.vertex_array().vertex_count(), shape.vertices.len() as u32);
        mesh.destroy(&mut device).unwrap();
        assert!(!mesh.vertex_array().is_valid());
    }

    #[test]
    fn test_hair_upload_uses_index_only_array() {
        let mut device = Device::new(RecordingBackend::new());
        let layout = StrandLayout {
            num_strands: 3,
            vertices_per_strand: 4,
        };
        let points: Vec<Vec3> = (0..12).map(|i| Vec3::new(0.0, -(i % 4) as f32, (i / 4) as f32)).collect();
        let strands = StrandSet::from_points(layout, &points).unwrap();
        let prepared = PreparedHair::prepare(&strands, 8).unwrap();

        let mut hair = HairStrands::upload(&mut device, "hair", &prepared).unwrap();
        assert_eq!(hair.indices.index_count(), Some(54));
        assert!(hair.indices.desc().attributes.is_empty());
        assert_eq!(hair.positions.dimensions(), (8, 2));
        assert_eq!(device.backend().live_textures(), 2);

        hair.destroy(&mut device).unwrap();
        assert_eq!(device.backend().live_textures(), 0);
    }
}
