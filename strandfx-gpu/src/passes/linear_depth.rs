use glam::Vec2;

use crate::backend::GpuBackend;
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{TargetRole, TextureRole};
use crate::passes::{PassError, bind_target};
use crate::resource::Texture;
use crate::shaders::ProgramRole;
use crate::state::DrawState;
use crate::uniforms::{ShaderParams, UniformSet};

struct LinearDepthParams<'t> {
    near_and_far: Vec2,
    depth: &'t Texture,
}

impl ShaderParams for LinearDepthParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_nearAndFar", self.near_and_far)
            .texture("u_depthPerspTex", self.depth);
    }
}

/// Converts the forward depth buffer to view-space distance.
pub struct LinearDepthPass;

impl<B: GpuBackend> Pass<B> for LinearDepthPass {
    fn name(&self) -> &str {
        "linear_depth"
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let settings = ctx.camera.settings;

        bind_target(ctx, TargetRole::LinearDepth)?;
        ctx.device.set_state(&DrawState::fullscreen());
        let params = LinearDepthParams {
            near_and_far: Vec2::new(settings.z_near, settings.z_far),
            depth: resources.texture(TextureRole::ForwardDepthStencil)?,
        };
        ctx.device
            .set_params(resources.program(ProgramRole::LinearDepth)?, &params)?;
        ctx.device.draw_fullscreen()?;
        Ok(())
    }
}
