//! Hair ribbons into the forward target, on top of the skin.

use glam::Vec3;

use crate::backend::GpuBackend;
use crate::config::HairConfig;
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{TargetRole, TextureRole};
use crate::passes::forward::stencil_write;
use crate::passes::shadow::HairGeometryParams;
use crate::passes::{LightingParams, PassError, bind_target};
use crate::scene::{HairStrands, Transform};
use crate::shaders::ProgramRole;
use crate::state::{CompareFunc, CullMode, DrawState};
use crate::uniforms::{ShaderParams, UniformSet};

struct HairParams<'t> {
    geometry: HairGeometryParams<'t>,
    lighting: LightingParams<'t>,
    hair: HairConfig,
}

impl ShaderParams for HairParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        self.lighting.write(set);
        self.geometry.write(set);
        set.set("u_albedo", Vec3::from(self.hair.albedo))
            .set("u_specularColor1", Vec3::from(self.hair.specular_color1))
            .set("u_specularPower1", self.hair.specular_power1)
            .set("u_specularColor2", Vec3::from(self.hair.specular_color2))
            .set("u_specularPower2", self.hair.specular_power2)
            .set("u_specularShift", self.hair.specular_shift)
            .set("u_displayMode", self.hair.display_mode.shader_value());
    }
}

/// State for hair: both ribbon faces, equal depth passes, hair stencil bit.
pub fn hair_draw_state(stencil_bit: u32) -> DrawState {
    DrawState::default()
        .with_depth(CompareFunc::LessOrEqual, true)
        .with_culling(CullMode::None)
        .with_stencil(stencil_write(stencil_bit))
}

/// Draws every entity with a transform and hair strands, guide strand plus
/// follow hairs as instances.
pub struct HairPass;

impl<B: GpuBackend> Pass<B> for HairPass {
    fn name(&self) -> &str {
        "hair"
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let config = ctx.config;
        let resources = ctx.resources;

        bind_target(ctx, TargetRole::Forward)?;
        ctx.device.set_state(&hair_draw_state(config.stencil.hair));

        let program = resources.program(ProgramRole::Hair)?;
        let shadow_map = resources.texture(TextureRole::ShadowDepth)?;
        let instances = 1 + config.hair.follow_hairs;

        for (_, (transform, hair)) in ctx.world.view::<(&Transform, &HairStrands)>() {
            let params = HairParams {
                geometry: HairGeometryParams::new(
                    config,
                    transform,
                    hair,
                    ctx.camera.view_projection,
                    ctx.camera.position,
                    config.hair.fiber_radius,
                ),
                lighting: LightingParams::new(
                    config,
                    ctx.camera,
                    shadow_map,
                    config.hair.shadow_bias,
                    config.hair.shadow_blur_radius,
                ),
                hair: config.hair,
            };
            ctx.device.set_params(program, &params)?;
            ctx.device.draw_mesh(&hair.indices, instances)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuCall;
    use crate::passes::test_support::Fixture;
    use crate::state::StencilOp;

    #[test]
    fn test_hair_state_writes_hair_bit_without_culling() {
        let state = hair_draw_state(2);
        assert_eq!(state.depth.test, CompareFunc::LessOrEqual);
        assert_eq!(state.culling, CullMode::None);
        assert_eq!(state.stencil.reference, 2);
        assert_eq!(state.stencil.write_mask, 2);
        assert_eq!(state.stencil.front.ops.pass, StencilOp::Replace);
    }

    #[test]
    fn test_hair_draws_follow_hairs_as_instances() {
        let mut fixture = Fixture::new().with_hair();
        fixture.config.hair.follow_hairs = 5;
        fixture.run(&HairPass);
        let draws: Vec<_> = fixture
            .device
            .backend()
            .calls()
            .iter()
            .filter_map(|c| match c {
                GpuCall::Draw(draw) => Some((draw.instances, draw.index_count)),
                _ => None,
            })
            .collect();
        assert_eq!(draws, [(6, Some(2 * 3 * 6))]);
        assert_eq!(
            fixture.device.state_cache().current(),
            Some(&hair_draw_state(fixture.config.stencil.hair))
        );
    }
}
