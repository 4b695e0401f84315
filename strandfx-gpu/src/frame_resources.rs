//! Render targets, programs and persistent textures shared by the passes.
//!
//! Resources are keyed by role. Shadow maps, the SSAO noise texture, the
//! programs and the debug mesh live from [`FrameResources::initialize`] to
//! [`FrameResources::destroy`]. Everything sized from the drawable is dropped
//! and reallocated together by [`FrameResources::on_resize`].

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec4;
use strandfx_data::generate_sphere;
use tracing::{debug, info};

use crate::backend::{BackendError, GpuBackend};
use crate::config::Config;
use crate::device::{Device, TextureError};
use crate::passes::ssao::{SSAO_KERNEL_SIZE, SSAO_NOISE_SIZE, generate_kernel, generate_noise};
use crate::resource::{
    Framebuffer, FramebufferError, ResourceError, ShaderError, ShaderProgram, Texture,
    TextureDesc, TextureFormat, VertexArray,
};
use crate::scene::{Mesh, SceneError};
use crate::shaders::{ProgramRole, ShaderLibrary, ShaderSourceError};

/// Integer scale applied to sized targets when supersampling.
pub const SUPERSAMPLE_FACTOR: u32 = 2;

const SSAO_SEED: u64 = 0x5eed_a0a0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureRole {
    ShadowDepth,
    SssDepth,
    SsaoNoise,
    ForwardDepthStencil,
    ForwardColor,
    ForwardNormals,
    LinearDepth,
    Ssao,
    SsaoBlur,
    Tonemapped,
    SssBlurPingPong,
}

impl TextureRole {
    pub const PERSISTENT: [TextureRole; 3] = [
        TextureRole::ShadowDepth,
        TextureRole::SssDepth,
        TextureRole::SsaoNoise,
    ];

    pub const SIZED: [TextureRole; 8] = [
        TextureRole::ForwardDepthStencil,
        TextureRole::ForwardColor,
        TextureRole::ForwardNormals,
        TextureRole::LinearDepth,
        TextureRole::Ssao,
        TextureRole::SsaoBlur,
        TextureRole::Tonemapped,
        TextureRole::SssBlurPingPong,
    ];

    /// Survives resizes; contents may still be rewritten every frame.
    pub fn is_persistent(self) -> bool {
        Self::PERSISTENT.contains(&self)
    }

    pub fn name(self) -> &'static str {
        match self {
            TextureRole::ShadowDepth => "shadow_depth",
            TextureRole::SssDepth => "sss_depth",
            TextureRole::SsaoNoise => "ssao_noise",
            TextureRole::ForwardDepthStencil => "forward_depth_stencil",
            TextureRole::ForwardColor => "forward_color",
            TextureRole::ForwardNormals => "forward_normals",
            TextureRole::LinearDepth => "linear_depth",
            TextureRole::Ssao => "ssao",
            TextureRole::SsaoBlur => "ssao_blur",
            TextureRole::Tonemapped => "tonemapped",
            TextureRole::SssBlurPingPong => "sss_blur_ping_pong",
        }
    }

    pub fn format(self) -> TextureFormat {
        match self {
            TextureRole::ShadowDepth | TextureRole::SssDepth => TextureFormat::Depth16,
            TextureRole::SsaoNoise => TextureFormat::Rg16F,
            TextureRole::ForwardDepthStencil => TextureFormat::Depth24Stencil8,
            TextureRole::ForwardColor
            | TextureRole::ForwardNormals
            | TextureRole::SssBlurPingPong => TextureFormat::Rgba16F,
            TextureRole::LinearDepth => TextureFormat::R32F,
            TextureRole::Ssao | TextureRole::SsaoBlur => TextureFormat::R8,
            TextureRole::Tonemapped => TextureFormat::Rgba8,
        }
    }
}

impl fmt::Display for TextureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetRole {
    ShadowDepth,
    SssDepth,
    /// Depth-stencil, HDR color and normals.
    Forward,
    /// Depth-stencil and HDR color, for stencil-masked writes into the scene color.
    ForwardColor,
    LinearDepth,
    Ssao,
    SsaoBlur,
    /// Depth-stencil and the SSS ping-pong color.
    SssBlurPingPong,
    Tonemapped,
}

impl TargetRole {
    pub const PERSISTENT: [TargetRole; 2] = [TargetRole::ShadowDepth, TargetRole::SssDepth];

    pub const SIZED: [TargetRole; 7] = [
        TargetRole::Forward,
        TargetRole::ForwardColor,
        TargetRole::LinearDepth,
        TargetRole::Ssao,
        TargetRole::SsaoBlur,
        TargetRole::SssBlurPingPong,
        TargetRole::Tonemapped,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetRole::ShadowDepth => "shadow_depth",
            TargetRole::SssDepth => "sss_depth",
            TargetRole::Forward => "forward",
            TargetRole::ForwardColor => "forward_color",
            TargetRole::LinearDepth => "linear_depth",
            TargetRole::Ssao => "ssao",
            TargetRole::SsaoBlur => "ssao_blur",
            TargetRole::SssBlurPingPong => "sss_blur_ping_pong",
            TargetRole::Tonemapped => "tonemapped",
        }
    }

    /// Attachments in framebuffer order.
    pub fn attachments(self) -> &'static [TextureRole] {
        match self {
            TargetRole::ShadowDepth => &[TextureRole::ShadowDepth],
            TargetRole::SssDepth => &[TextureRole::SssDepth],
            TargetRole::Forward => &[
                TextureRole::ForwardDepthStencil,
                TextureRole::ForwardColor,
                TextureRole::ForwardNormals,
            ],
            TargetRole::ForwardColor => {
                &[TextureRole::ForwardDepthStencil, TextureRole::ForwardColor]
            }
            TargetRole::LinearDepth => &[TextureRole::LinearDepth],
            TargetRole::Ssao => &[TextureRole::Ssao],
            TargetRole::SsaoBlur => &[TextureRole::SsaoBlur],
            TargetRole::SssBlurPingPong => {
                &[TextureRole::ForwardDepthStencil, TextureRole::SssBlurPingPong]
            }
            TargetRole::Tonemapped => &[TextureRole::Tonemapped],
        }
    }
}

impl fmt::Display for TargetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameResourceError {
    #[error("Texture '{0}' is not allocated")]
    Missing(TextureRole),

    #[error("Render target '{0}' is not allocated")]
    MissingTarget(TargetRole),

    #[error("Program '{0}' is not loaded")]
    MissingProgram(ProgramRole),

    #[error("Debug sphere mesh is not loaded")]
    MissingDebugMesh,

    #[error(transparent)]
    ShaderSource(#[from] ShaderSourceError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

#[derive(Debug, Default)]
pub struct FrameResources {
    textures: BTreeMap<TextureRole, Texture>,
    targets: BTreeMap<TargetRole, Framebuffer>,
    programs: BTreeMap<ProgramRole, ShaderProgram>,
    debug_sphere: Option<Mesh>,
    ssao_kernel: Vec<Vec4>,
    dimensions: Option<(u32, u32)>,
}

impl FrameResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every program and allocate the resolution-independent resources.
    pub fn initialize<B: GpuBackend>(
        &mut self,
        device: &mut Device<B>,
        config: &Config,
        shaders: &ShaderLibrary,
    ) -> Result<(), FrameResourceError> {
        for role in ProgramRole::ALL {
            let program = device.create_program(&shaders.program(role)?)?;
            if let Some(mut old) = self.programs.insert(role, program) {
                device.destroy_program(&mut old)?;
            }
        }

        let shadow_size = config.shadows.map_size.max(1);
        self.allocate_texture(device, TextureRole::ShadowDepth, shadow_size, shadow_size)?;
        let sss_size = config.sss_light.depth_map_size.max(1);
        self.allocate_texture(device, TextureRole::SssDepth, sss_size, sss_size)?;
        for target in TargetRole::PERSISTENT {
            self.allocate_target(device, target)?;
        }

        let noise: Vec<u16> = generate_noise(SSAO_SEED)
            .iter()
            .flat_map(|v| [v.x, v.y])
            .map(|c| half::f16::from_f32(c).to_bits())
            .collect();
        self.allocate_texture(device, TextureRole::SsaoNoise, SSAO_NOISE_SIZE, SSAO_NOISE_SIZE)?;
        device.write_texels(self.texture(TextureRole::SsaoNoise)?, 0, &noise)?;
        self.ssao_kernel = generate_kernel(SSAO_KERNEL_SIZE, SSAO_SEED);

        if let Some(mut old) = self.debug_sphere.take() {
            old.destroy(device)?;
        }
        self.debug_sphere = Some(Mesh::from_shape(
            device,
            "debug_sphere",
            &generate_sphere(1.0, 16, 12),
        )?);

        info!(
            programs = self.programs.len(),
            shadow_map = shadow_size,
            sss_map = sss_size,
            "Frame resources initialized"
        );
        Ok(())
    }

    /// Drop every drawable-sized target and reallocate it at the new size.
    pub fn on_resize<B: GpuBackend>(
        &mut self,
        device: &mut Device<B>,
        width: u32,
        height: u32,
        supersampling: bool,
    ) -> Result<(), FrameResourceError> {
        let factor = if supersampling { SUPERSAMPLE_FACTOR } else { 1 };
        let (width, height) = (width.max(1) * factor, height.max(1) * factor);

        self.destroy_sized(device)?;
        for role in TextureRole::SIZED {
            self.allocate_texture(device, role, width, height)?;
        }
        for target in TargetRole::SIZED {
            self.allocate_target(device, target)?;
        }
        self.dimensions = Some((width, height));
        info!(width, height, supersampling, "Render targets resized");
        Ok(())
    }

    fn allocate_texture<B: GpuBackend>(
        &mut self,
        device: &mut Device<B>,
        role: TextureRole,
        width: u32,
        height: u32,
    ) -> Result<(), FrameResourceError> {
        let texture = device.create_texture(TextureDesc::new_2d(role.name(), width, height, role.format()))?;
        if let Some(mut old) = self.textures.insert(role, texture) {
            device.destroy_texture(&mut old)?;
        }
        Ok(())
    }

    fn allocate_target<B: GpuBackend>(
        &mut self,
        device: &mut Device<B>,
        role: TargetRole,
    ) -> Result<(), FrameResourceError> {
        let attachments = role
            .attachments()
            .iter()
            .map(|&texture| self.texture(texture))
            .collect::<Result<Vec<_>, _>>()?;
        let framebuffer = device.create_framebuffer(role.name(), &attachments)?;
        debug!(target_role = %role, "Render target allocated");
        if let Some(mut old) = self.targets.insert(role, framebuffer) {
            device.destroy_framebuffer(&mut old)?;
        }
        Ok(())
    }

    fn destroy_sized<B: GpuBackend>(&mut self, device: &mut Device<B>) -> Result<(), ResourceError> {
        for role in TargetRole::SIZED {
            if let Some(mut framebuffer) = self.targets.remove(&role) {
                device.destroy_framebuffer(&mut framebuffer)?;
            }
        }
        for role in TextureRole::SIZED {
            if let Some(mut texture) = self.textures.remove(&role) {
                device.destroy_texture(&mut texture)?;
            }
        }
        self.dimensions = None;
        Ok(())
    }

    /// Release everything. Safe to call on an empty set.
    pub fn destroy<B: GpuBackend>(&mut self, device: &mut Device<B>) -> Result<(), ResourceError> {
        self.destroy_sized(device)?;
        for (_, mut framebuffer) in std::mem::take(&mut self.targets) {
            device.destroy_framebuffer(&mut framebuffer)?;
        }
        for (_, mut texture) in std::mem::take(&mut self.textures) {
            device.destroy_texture(&mut texture)?;
        }
        for (_, mut program) in std::mem::take(&mut self.programs) {
            device.destroy_program(&mut program)?;
        }
        if let Some(mut sphere) = self.debug_sphere.take() {
            sphere.destroy(device)?;
        }
        self.ssao_kernel.clear();
        debug!("Frame resources destroyed");
        Ok(())
    }

    pub fn texture(&self, role: TextureRole) -> Result<&Texture, FrameResourceError> {
        self.textures.get(&role).ok_or(FrameResourceError::Missing(role))
    }

    pub fn target(&self, role: TargetRole) -> Result<&Framebuffer, FrameResourceError> {
        self.targets
            .get(&role)
            .ok_or(FrameResourceError::MissingTarget(role))
    }

    pub fn program(&self, role: ProgramRole) -> Result<&ShaderProgram, FrameResourceError> {
        self.programs
            .get(&role)
            .ok_or(FrameResourceError::MissingProgram(role))
    }

    pub fn debug_sphere(&self) -> Result<&VertexArray, FrameResourceError> {
        self.debug_sphere
            .as_ref()
            .map(Mesh::vertex_array)
            .ok_or(FrameResourceError::MissingDebugMesh)
    }

    /// Hemisphere samples, precomputed once at initialization.
    pub fn ssao_kernel(&self) -> &[Vec4] {
        &self.ssao_kernel
    }

    /// Size of the drawable-sized targets, supersampling included.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_target_count(&self) -> usize {
        self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resource::GpuResource;

    fn initialized() -> (Device<RecordingBackend>, FrameResources) {
        let mut device = Device::new(RecordingBackend::new());
        let mut resources = FrameResources::new();
        resources
            .initialize(&mut device, &Config::default(), &ShaderLibrary::embedded())
            .unwrap();
        (device, resources)
    }

    #[test]
    fn test_initialize_allocates_persistent_resources() {
        let (device, resources) = initialized();
        assert_eq!(resources.live_texture_count(), TextureRole::PERSISTENT.len());
        assert_eq!(resources.texture(TextureRole::ShadowDepth).unwrap().dimensions(), (1024, 1024));
        assert_eq!(resources.texture(TextureRole::SsaoNoise).unwrap().dimensions(), (4, 4));
        assert_eq!(resources.ssao_kernel().len(), SSAO_KERNEL_SIZE);
        assert_eq!(device.backend().live_programs(), ProgramRole::ALL.len());
        assert!(resources.dimensions().is_none());
        assert!(matches!(
            resources.texture(TextureRole::ForwardColor),
            Err(FrameResourceError::Missing(TextureRole::ForwardColor))
        ));
    }

    #[test]
    fn test_resize_twice_matches_resize_once() {
        let (mut device, mut resources) = initialized();
        resources.on_resize(&mut device, 640, 360, false).unwrap();
        let once = (
            resources.live_texture_count(),
            resources.live_target_count(),
            device.backend().live_textures(),
            device.backend().live_framebuffers(),
            resources.dimensions(),
        );
        let first_color = resources.texture(TextureRole::ForwardColor).unwrap().id();

        resources.on_resize(&mut device, 640, 360, false).unwrap();
        let twice = (
            resources.live_texture_count(),
            resources.live_target_count(),
            device.backend().live_textures(),
            device.backend().live_framebuffers(),
            resources.dimensions(),
        );
        assert_eq!(once, twice);
        assert_eq!(twice.0, TextureRole::PERSISTENT.len() + TextureRole::SIZED.len());
        assert_ne!(resources.texture(TextureRole::ForwardColor).unwrap().id(), first_color);
    }

    #[test]
    fn test_resize_keeps_persistent_textures() {
        let (mut device, mut resources) = initialized();
        let shadow = resources.texture(TextureRole::ShadowDepth).unwrap().id();
        resources.on_resize(&mut device, 100, 50, true).unwrap();
        resources.on_resize(&mut device, 200, 100, true).unwrap();
        assert_eq!(resources.texture(TextureRole::ShadowDepth).unwrap().id(), shadow);
        assert_eq!(resources.dimensions(), Some((400, 200)));
        let forward = resources.target(TargetRole::Forward).unwrap();
        assert_eq!(forward.color_attachment_count(), 2);
        assert!(forward.has_stencil());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (mut device, mut resources) = initialized();
        resources.on_resize(&mut device, 64, 64, false).unwrap();
        resources.destroy(&mut device).unwrap();
        resources.destroy(&mut device).unwrap();
        assert_eq!(resources.live_texture_count(), 0);
        assert_eq!(device.backend().live_textures(), 0);
        assert_eq!(device.backend().live_framebuffers(), 0);
        assert_eq!(device.backend().live_programs(), 0);
        assert!(resources.debug_sphere().is_err());
    }
}
