//! Skin and other opaque meshes into the forward target.

use glam::{Mat4, Vec3};

use crate::backend::{ClearRequest, GpuBackend};
use crate::config::{Config, SkinConfig};
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{TargetRole, TextureRole};
use crate::passes::{LightingParams, PassError, bind_target, shadow};
use crate::resource::Texture;
use crate::scene::{Material, Mesh, Name, Transform};
use crate::shaders::ProgramRole;
use crate::state::{CompareFunc, DrawState, StencilFaceState, StencilOp, StencilOps, StencilState};
use crate::uniforms::{ShaderParams, UniformSet};

struct ForwardParams<'t> {
    lighting: LightingParams<'t>,
    model: Mat4,
    mvp: Mat4,
    sss_matrix: Mat4,
    sss_position: Vec3,
    skin: SkinConfig,
    albedo: &'t Texture,
    sss_depth: &'t Texture,
}

impl ShaderParams for ForwardParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        self.lighting.write(set);
        set.set("u_M", self.model)
            .set("u_MVP", self.mvp)
            .set("u_sssMatrix", self.sss_matrix)
            .set("u_sssPosition", self.sss_position)
            .set("u_fresnelExponent", self.skin.fresnel_exponent)
            .set("u_fresnelMultiplier", self.skin.fresnel_multiplier)
            .set("u_fresnelColor", self.skin.fresnel_color)
            .set("u_ssColor1", self.skin.ss_color1)
            .set("u_ssColor2", self.skin.ss_color2)
            .set("u_modelScale", self.skin.model_scale)
            .texture("u_albedoTexture", self.albedo)
            .texture("u_sssDepthTex", self.sss_depth);
    }
}

/// Stencil state that stamps `bit` wherever a fragment is written.
pub fn stencil_write(bit: u32) -> StencilState {
    StencilState::both(
        StencilFaceState {
            test: CompareFunc::AlwaysPass,
            ops: StencilOps::on_pass(StencilOp::Replace),
        },
        bit,
        0xff,
        bit,
    )
}

fn clear_color(config: &Config, alpha: f32) -> [f32; 4] {
    let [r, g, b] = config.clear_color;
    [r, g, b, alpha]
}

/// Shades every entity with a transform, a mesh and a material.
pub struct ForwardPass;

impl<B: GpuBackend> Pass<B> for ForwardPass {
    fn name(&self) -> &str {
        "forward"
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let config = ctx.config;
        let resources = ctx.resources;

        // Normals clear to zero so later passes can tell background apart.
        bind_target(ctx, TargetRole::Forward)?;
        ctx.device.clear(ClearRequest {
            color: Some([0.0; 4]),
            depth: Some(config.clear_depth),
            stencil: Some(config.clear_stencil),
        })?;
        bind_target(ctx, TargetRole::ForwardColor)?;
        ctx.device.clear(ClearRequest::color(clear_color(config, 1.0)))?;
        bind_target(ctx, TargetRole::Forward)?;

        ctx.device
            .set_state(&DrawState::default().with_stencil(stencil_write(config.stencil.skin)));

        let program = resources.program(ProgramRole::Forward)?;
        let shadow_map = resources.texture(TextureRole::ShadowDepth)?;
        let sss_depth = resources.texture(TextureRole::SssDepth)?;
        let sss_matrix = shadow::sss_light_matrix(config);
        let sss_position = config.sss_light_position();

        for (entity, (transform, mesh)) in ctx.world.view::<(&Transform, &Mesh)>() {
            let material = ctx.world.get::<Material>(entity).ok_or_else(|| {
                let name = ctx
                    .world
                    .get::<Name>(entity)
                    .map(|n| n.0.clone())
                    .unwrap_or_else(|| format!("#{}", entity.index()));
                PassError::MissingMaterial(name)
            })?;
            let model = transform.model_matrix();
            let params = ForwardParams {
                lighting: LightingParams::new(
                    config,
                    ctx.camera,
                    shadow_map,
                    config.shadows.bias,
                    config.shadows.blur_radius,
                ),
                model,
                mvp: ctx.camera.mvp(model),
                sss_matrix,
                sss_position,
                skin: config.skin,
                albedo: &material.albedo,
                sss_depth,
            };
            ctx.device.set_params(program, &params)?;
            ctx.device.draw_mesh(mesh.vertex_array(), 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuCall, RenderTarget};
    use crate::passes::test_support::Fixture;
    use crate::resource::GpuResource;
    use crate::scene::Mesh;
    use strandfx_data::generate_sphere;

    #[test]
    fn test_forward_marks_skin_and_clears_normals() {
        let mut fixture = Fixture::new().with_skin();
        fixture.run(&ForwardPass);
        let forward = fixture.resources.target(TargetRole::Forward).unwrap().id();
        let calls = fixture.device.backend().calls();

        let first_clear = calls.iter().find_map(|c| match c {
            GpuCall::Clear(request) => Some(*request),
            _ => None,
        });
        assert_eq!(first_clear.and_then(|r| r.color), Some([0.0; 4]));
        let indexed: Vec<Option<u32>> = calls
            .iter()
            .filter_map(|c| match c {
                GpuCall::Draw(draw) => Some(draw.index_count),
                _ => None,
            })
            .collect();
        assert_eq!(indexed, [Some(generate_sphere(1.0, 8, 6).indices.len() as u32)]);
        assert!(calls.contains(&GpuCall::BindRenderTarget(RenderTarget::Framebuffer(forward))));
        assert_eq!(
            fixture.device.state_cache().current().map(|s| s.stencil),
            Some(stencil_write(fixture.config.stencil.skin))
        );
    }

    #[test]
    fn test_mesh_without_material_fails() {
        let mut fixture = Fixture::new();
        let mesh = Mesh::from_shape(&mut fixture.device, "bare", &generate_sphere(1.0, 4, 3)).unwrap();
        let entity = fixture.world.spawn();
        fixture.world.insert(entity, Transform::default());
        fixture.world.insert(entity, mesh);
        fixture.world.insert(entity, Name("bare".to_string()));
        fixture.device.begin_frame().unwrap();

        let mut ctx = PassContext {
            device: &mut fixture.device,
            resources: &fixture.resources,
            config: &fixture.config,
            world: &fixture.world,
            camera: &fixture.camera,
        };
        let err = Pass::execute(&ForwardPass, &mut ctx).unwrap_err();
        assert!(matches!(err, PassError::MissingMaterial(name) if name == "bare"));
    }
}
