//! Depth-only renders from the shadow-casting lights.

use glam::{Mat4, Vec3};

use crate::backend::{ClearRequest, GpuBackend};
use crate::config::Config;
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::TargetRole;
use crate::math::light_view_projection;
use crate::passes::{PassError, bind_target};
use crate::resource::Texture;
use crate::scene::{HairStrands, Mesh, Transform};
use crate::shaders::ProgramRole;
use crate::state::{ColorMask, CompareFunc, CullMode, DrawState};
use crate::uniforms::{ShaderParams, UniformSet};

/// View-projection of the primary shadow light.
pub fn primary_light_matrix(config: &Config) -> Mat4 {
    let light = &config.shadows.directional_light;
    light_view_projection(
        config.shadow_light_position(),
        Vec3::from(light.target),
        &light.projection,
    )
}

/// View-projection of the light used for skin transmittance.
pub fn sss_light_matrix(config: &Config) -> Mat4 {
    light_view_projection(config.sss_light_position(), Vec3::ZERO, &config.sss_light.projection)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowLight {
    Primary,
    Sss,
}

impl ShadowLight {
    pub fn target(self) -> TargetRole {
        match self {
            ShadowLight::Primary => TargetRole::ShadowDepth,
            ShadowLight::Sss => TargetRole::SssDepth,
        }
    }

    pub fn position(self, config: &Config) -> Vec3 {
        match self {
            ShadowLight::Primary => config.shadow_light_position(),
            ShadowLight::Sss => config.sss_light_position(),
        }
    }

    pub fn matrix(self, config: &Config) -> Mat4 {
        match self {
            ShadowLight::Primary => primary_light_matrix(config),
            ShadowLight::Sss => sss_light_matrix(config),
        }
    }
}

struct MeshShadowParams {
    mvp: Mat4,
}

impl ShaderParams for MeshShadowParams {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_MVP", self.mvp);
    }
}

/// Ribbons are expanded towards the light, with a widened fiber radius.
pub(crate) struct HairGeometryParams<'t> {
    pub model: Mat4,
    pub view_projection: Mat4,
    pub eye: Vec3,
    pub fiber_radius: f32,
    pub thin_tip: f32,
    pub vertices_per_strand: i32,
    pub follow_hairs: i32,
    pub spread_root: f32,
    pub spread_tip: f32,
    pub positions: &'t Texture,
    pub tangents: &'t Texture,
}

impl<'t> HairGeometryParams<'t> {
    pub fn new(
        config: &Config,
        transform: &Transform,
        hair: &'t HairStrands,
        view_projection: Mat4,
        eye: Vec3,
        fiber_radius: f32,
    ) -> Self {
        Self {
            model: transform.model_matrix(),
            view_projection,
            eye,
            fiber_radius,
            thin_tip: config.hair.thin_tip,
            vertices_per_strand: hair.layout.vertices_per_strand as i32,
            follow_hairs: config.hair.follow_hairs as i32,
            spread_root: config.hair.follow_hair_spread_root,
            spread_tip: config.hair.follow_hair_spread_tip,
            positions: &hair.positions,
            tangents: &hair.tangents,
        }
    }
}

impl ShaderParams for HairGeometryParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_modelMat", self.model)
            .set("u_viewProjectionMat", self.view_projection)
            .set("u_cameraPosition", self.eye)
            .set("u_fiberRadius", self.fiber_radius)
            .set("u_thinTip", self.thin_tip)
            .set("u_verticesPerStrand", self.vertices_per_strand)
            .set("u_followHairs", self.follow_hairs)
            .set("u_followHairSpreadRoot", self.spread_root)
            .set("u_followHairSpreadTip", self.spread_tip)
            .texture("u_positions", self.positions)
            .texture("u_tangents", self.tangents);
    }
}

/// Depth-only state shared by meshes and hair. Back faces write depth too.
pub fn shadow_draw_state() -> DrawState {
    DrawState::default()
        .with_depth(CompareFunc::LessOrEqual, true)
        .with_culling(CullMode::None)
        .with_color_mask(ColorMask::NONE)
}

/// Renders scene depth from `light` into its depth target.
pub struct ShadowPass {
    light: ShadowLight,
    include_hair: bool,
}

impl ShadowPass {
    pub fn new(light: ShadowLight, include_hair: bool) -> Self {
        Self { light, include_hair }
    }
}

impl<B: GpuBackend> Pass<B> for ShadowPass {
    fn name(&self) -> &str {
        match self.light {
            ShadowLight::Primary => "shadow",
            ShadowLight::Sss => "sss_shadow",
        }
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let config = ctx.config;
        let light_matrix = self.light.matrix(config);

        bind_target(ctx, self.light.target())?;
        ctx.device.clear(ClearRequest::depth_only())?;
        ctx.device.set_state(&shadow_draw_state());

        let program = ctx.resources.program(ProgramRole::Shadow)?;
        for (_, (transform, mesh)) in ctx.world.view::<(&Transform, &Mesh)>() {
            let params = MeshShadowParams {
                mvp: light_matrix * transform.model_matrix(),
            };
            ctx.device.set_params(program, &params)?;
            ctx.device.draw_mesh(mesh.vertex_array(), 1)?;
        }

        if !self.include_hair {
            return Ok(());
        }
        let program = ctx.resources.program(ProgramRole::HairShadow)?;
        let radius = config.hair.fiber_radius * config.hair.shadow_radius_multiplier;
        let eye = self.light.position(config);
        for (_, (transform, hair)) in ctx.world.view::<(&Transform, &HairStrands)>() {
            let params = HairGeometryParams::new(config, transform, hair, light_matrix, eye, radius);
            ctx.device.set_params(program, &params)?;
            ctx.device
                .draw_mesh(&hair.indices, 1 + config.hair.follow_hairs)?;
        }
        Ok(())
    }
}
