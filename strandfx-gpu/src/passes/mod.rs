//! The render passes, one module per stage of the frame.
//!
//! Each pass turns the frame resources, the configuration and the scene into
//! draws. Parameters reach the programs as typed [`ShaderParams`] records that
//! are validated strictly against the reflected interface.

pub mod blur;
pub mod final_pass;
pub mod forward;
pub mod hair;
pub mod linear_depth;
pub mod shadow;
pub mod ssao;
pub mod sss_blur;
pub mod tonemap;

use glam::{Mat4, Vec3, Vec4};

use crate::backend::{BackendError, ClearRequest, GpuBackend};
use crate::camera::FrameCamera;
use crate::config::Config;
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{FrameResourceError, TargetRole};
use crate::resource::{FramebufferError, ShaderError, Texture};
use crate::uniforms::{ShaderParams, UniformSet};

pub use blur::BlurPass;
pub use final_pass::FinalPass;
pub use forward::ForwardPass;
pub use hair::HairPass;
pub use linear_depth::LinearDepthPass;
pub use shadow::{ShadowLight, ShadowPass};
pub use ssao::SsaoPass;
pub use sss_blur::SssBlurPass;
pub use tonemap::TonemapPass;

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("Entity '{0}' has a mesh but no material")]
    MissingMaterial(String),

    #[error(transparent)]
    Resources(#[from] FrameResourceError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Bind one of the frame's targets with a viewport covering it.
pub(crate) fn bind_target<B: GpuBackend>(
    ctx: &mut PassContext<'_, B>,
    target: TargetRole,
) -> Result<(), PassError> {
    let framebuffer = ctx.resources.target(target)?;
    ctx.device.bind_framebuffer(framebuffer)?;
    Ok(())
}

/// Clears a target and draws nothing. Stands in for a disabled producer.
pub struct ClearPass {
    name: &'static str,
    target: TargetRole,
    request: ClearRequest,
}

impl ClearPass {
    pub fn new(name: &'static str, target: TargetRole, request: ClearRequest) -> Self {
        Self {
            name,
            target,
            request,
        }
    }
}

impl<B: GpuBackend> Pass<B> for ClearPass {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        bind_target(ctx, self.target)?;
        ctx.device.clear(self.request)?;
        Ok(())
    }
}

/// Ambient, the three point lights and the directional shadow, shared by the
/// skin and hair programs.
#[derive(Debug, Clone)]
pub struct LightingParams<'t> {
    pub camera_position: Vec3,
    pub shadow_matrix: Mat4,
    pub shadow_sample_radius: i32,
    /// xyz is the caster position, w the bias. A negative bias selects PCSS.
    pub shadow_caster: Vec4,
    pub max_shadow_contribution: f32,
    pub ambient: Vec4,
    pub lights: [(Vec3, Vec4); 3],
    pub shadow_map: &'t Texture,
}

impl<'t> LightingParams<'t> {
    pub fn new(
        config: &Config,
        camera: &FrameCamera,
        shadow_map: &'t Texture,
        bias: f32,
        blur_radius: f32,
    ) -> Self {
        let sign = if config.shadows.use_pcss { -1.0 } else { 1.0 };
        let ambient = config.ambient;
        Self {
            camera_position: camera.position,
            shadow_matrix: shadow::primary_light_matrix(config),
            shadow_sample_radius: blur_radius.floor() as i32,
            shadow_caster: config.shadow_light_position().extend(bias * sign),
            max_shadow_contribution: config.shadows.strength,
            ambient: Vec4::new(ambient.color[0], ambient.color[1], ambient.color[2], ambient.energy),
            lights: config
                .lights
                .map(|light| (light.position.to_cartesian(), Vec4::from(light.color_and_energy()))),
            shadow_map,
        }
    }
}

impl ShaderParams for LightingParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        const POSITIONS: [&str; 3] = ["u_light0_Position", "u_light1_Position", "u_light2_Position"];
        const COLORS: [&str; 3] = ["u_light0_Color", "u_light1_Color", "u_light2_Color"];

        set.set("u_cameraPosition", self.camera_position)
            .set("u_directionalShadowMatrix", self.shadow_matrix)
            .set("u_directionalShadowSampleRadius", self.shadow_sample_radius)
            .set("u_directionalShadowCasterPosition", self.shadow_caster)
            .set("u_maxShadowContribution", self.max_shadow_contribution)
            .set("u_lightAmbient", self.ambient)
            .texture("u_directionalShadowDepthTex", self.shadow_map);
        for (i, (position, color)) in self.lights.iter().enumerate() {
            set.set(POSITIONS[i], *position).set(COLORS[i], *color);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use crate::backend::{GpuCall, RenderTarget};
    use crate::resource::GpuResource;

    #[test]
    fn test_lighting_params_encode_pcss_in_bias_sign() {
        let fixture = Fixture::new();
        let shadow = fixture
            .resources
            .texture(crate::frame_resources::TextureRole::ShadowDepth)
            .unwrap();
        let mut config = fixture.config.clone();
        config.shadows.use_pcss = true;
        let params = LightingParams::new(&config, &fixture.camera, shadow, 0.05, 2.7);
        assert_eq!(params.shadow_caster.w, -0.05);
        assert_eq!(params.shadow_sample_radius, 2);

        config.shadows.use_pcss = false;
        let params = LightingParams::new(&config, &fixture.camera, shadow, 0.05, 2.7);
        assert_eq!(params.shadow_caster.w, 0.05);
        assert!(params.shadow_caster.truncate().abs_diff_eq(config.shadow_light_position(), 1e-6));
    }

    #[test]
    fn test_clear_pass_clears_its_target() {
        let mut fixture = Fixture::new();
        let ssao = fixture.resources.target(TargetRole::Ssao).unwrap().id();
        fixture.run(&ClearPass::new("ssao_clear", TargetRole::Ssao, ClearRequest::color([1.0; 4])));
        let calls = fixture.device.backend().calls();
        assert!(calls.contains(&GpuCall::BindRenderTarget(RenderTarget::Framebuffer(ssao))));
        assert!(calls.contains(&GpuCall::Clear(ClearRequest::color([1.0; 4]))));
        assert!(!calls.iter().any(|c| matches!(c, GpuCall::Draw(_))));
    }
}
