//! Separable subsurface-scattering blur over skin pixels.
//!
//! The stencil test keeps both halves on pixels that carry the skin bit. The
//! horizontal half writes the ping-pong texture, the vertical half writes the
//! blurred result back into the scene color.

use glam::Vec2;

use crate::backend::{ClearRequest, GpuBackend};
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{TargetRole, TextureRole};
use crate::passes::{PassError, bind_target};
use crate::resource::Texture;
use crate::shaders::ProgramRole;
use crate::state::{CompareFunc, DrawState, StencilFaceState, StencilOps, StencilState};
use crate::uniforms::{ShaderParams, UniformSet};

struct SssBlurParams<'t> {
    direction: Vec2,
    fovy: f32,
    width: f32,
    strength: f32,
    follow_surface: bool,
    source: &'t Texture,
    linear_depth: &'t Texture,
}

impl ShaderParams for SssBlurParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_sssDirection", self.direction)
            .set("u_sssFovy", self.fovy)
            .set("u_sssWidth", self.width)
            .set("u_sssStrength", self.strength)
            .set("u_sssFollowSurface", self.follow_surface)
            .texture("u_sourceTex", self.source)
            .texture("u_linearDepthTex", self.linear_depth);
    }
}

/// Passes only where the stencil holds `bit`; never writes stencil.
pub fn stencil_test(bit: u32) -> StencilState {
    StencilState::both(
        StencilFaceState {
            test: CompareFunc::Equal,
            ops: StencilOps::KEEP,
        },
        bit,
        bit,
        0,
    )
}

pub struct SssBlurPass {
    horizontal: bool,
}

impl SssBlurPass {
    pub fn new(horizontal: bool) -> Self {
        Self { horizontal }
    }

    pub fn source(&self) -> TextureRole {
        if self.horizontal {
            TextureRole::ForwardColor
        } else {
            TextureRole::SssBlurPingPong
        }
    }

    pub fn output(&self) -> TextureRole {
        if self.horizontal {
            TextureRole::SssBlurPingPong
        } else {
            TextureRole::ForwardColor
        }
    }

    fn target(&self) -> TargetRole {
        if self.horizontal {
            TargetRole::SssBlurPingPong
        } else {
            TargetRole::ForwardColor
        }
    }
}

impl<B: GpuBackend> Pass<B> for SssBlurPass {
    fn name(&self) -> &str {
        if self.horizontal {
            "sss_blur_h"
        } else {
            "sss_blur_v"
        }
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let config = ctx.config;
        let source = resources.texture(self.source())?;
        let (width, height) = source.dimensions();

        bind_target(ctx, self.target())?;
        if self.horizontal {
            ctx.device.clear(ClearRequest::color([0.0; 4]))?;
        }
        ctx.device
            .set_state(&DrawState::fullscreen().with_stencil(stencil_test(config.stencil.skin)));

        let fov = ctx.camera.settings.fov_dgr;
        let params = SssBlurParams {
            direction: if self.horizontal { Vec2::X } else { Vec2::Y },
            fovy: fov / width.max(1) as f32 * height as f32 * config.sss_blur.fovy_scale,
            width: config.sss_blur.width,
            strength: config.sss_blur.strength,
            follow_surface: config.sss_blur.follow_surface,
            source,
            linear_depth: resources.texture(TextureRole::LinearDepth)?,
        };
        ctx.device
            .set_params(resources.program(ProgramRole::SssBlur)?, &params)?;
        ctx.device.draw_fullscreen()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuCall;
    use crate::passes::test_support::Fixture;

    #[test]
    fn test_stencil_restricts_to_skin() {
        let stencil = stencil_test(1);
        assert_eq!(stencil.front.test, CompareFunc::Equal);
        assert_eq!(stencil.compare_mask, 1);
        assert_eq!(stencil.write_mask, 0);
        assert!(stencil.is_enabled());
    }

    #[test]
    fn test_only_horizontal_half_clears() {
        let mut fixture = Fixture::new();
        fixture.run(&SssBlurPass::new(true));
        let clears = |f: &Fixture| {
            f.device
                .backend()
                .calls()
                .iter()
                .filter(|c| matches!(c, GpuCall::Clear(_)))
                .count()
        };
        assert_eq!(clears(&fixture), 1);
        fixture.run(&SssBlurPass::new(false));
        assert_eq!(clears(&fixture), 0);
        assert_eq!(
            fixture.device.state_cache().current().map(|s| s.stencil),
            Some(stencil_test(fixture.config.stencil.skin))
        );
    }
}
