use glam::Vec2;

use crate::backend::GpuBackend;
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{TargetRole, TextureRole};
use crate::passes::{PassError, bind_target};
use crate::resource::Texture;
use crate::shaders::ProgramRole;
use crate::state::DrawState;
use crate::uniforms::{ShaderParams, UniformSet};

struct BlurParams<'t> {
    direction: Vec2,
    radius: i32,
    gauss_sigma: f32,
    depth_max_distance: f32,
    source: &'t Texture,
    linear_depth: &'t Texture,
}

impl ShaderParams for BlurParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_direction", self.direction)
            .set("u_blurRadius", self.radius)
            .set("u_gaussSigma", self.gauss_sigma)
            .set("u_depthMaxDist", self.depth_max_distance)
            .texture("u_sourceTex", self.source)
            .texture("u_linearDepthTex", self.linear_depth);
    }
}

/// One direction of the depth-aware SSAO blur. The horizontal half reads the
/// SSAO target and writes its ping-pong partner; the vertical half writes back.
pub struct BlurPass {
    horizontal: bool,
}

impl BlurPass {
    pub fn new(horizontal: bool) -> Self {
        Self { horizontal }
    }

    pub fn source(&self) -> TextureRole {
        if self.horizontal {
            TextureRole::Ssao
        } else {
            TextureRole::SsaoBlur
        }
    }

    pub fn target(&self) -> TargetRole {
        if self.horizontal {
            TargetRole::SsaoBlur
        } else {
            TargetRole::Ssao
        }
    }

    pub fn output(&self) -> TextureRole {
        if self.horizontal {
            TextureRole::SsaoBlur
        } else {
            TextureRole::Ssao
        }
    }

    fn direction(&self) -> Vec2 {
        if self.horizontal { Vec2::X } else { Vec2::Y }
    }
}

impl<B: GpuBackend> Pass<B> for BlurPass {
    fn name(&self) -> &str {
        if self.horizontal {
            "ssao_blur_h"
        } else {
            "ssao_blur_v"
        }
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let ssao = ctx.config.ssao;

        bind_target(ctx, self.target())?;
        ctx.device.set_state(&DrawState::fullscreen());
        let params = BlurParams {
            direction: self.direction(),
            radius: ssao.blur_radius.floor() as i32,
            gauss_sigma: ssao.blur_gauss_sigma,
            depth_max_distance: ssao.blur_max_depth_distance,
            source: resources.texture(self.source())?,
            linear_depth: resources.texture(TextureRole::LinearDepth)?,
        };
        ctx.device.set_params(resources.program(ProgramRole::Blur)?, &params)?;
        ctx.device.draw_fullscreen()?;
        Ok(())
    }
}
