//! Anti-aliasing and gamma into the backbuffer, plus the debug overlays.

use glam::{Mat4, Vec2, Vec3};

use crate::backend::{ClearRequest, GpuBackend, Viewport};
use crate::config::{Config, DisplayMode};
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::TextureRole;
use crate::math::hex_to_rgb;
use crate::passes::PassError;
use crate::resource::Texture;
use crate::shaders::ProgramRole;
use crate::state::DrawState;
use crate::uniforms::{ShaderParams, UniformSet};

pub const DEBUG_TILE_MAX_SIZE: u32 = 200;
pub const DEBUG_TILE_PADDING: i32 = 5;
const DEBUG_SPHERE_SCALE: f32 = 0.1;
const SHADOW_LIGHT_MARKER: u32 = 0x404040;
const SSS_LIGHT_MARKER: u32 = 0xde875d;

/// Texture shown for each display mode.
pub fn display_source(mode: DisplayMode) -> TextureRole {
    match mode {
        DisplayMode::Final => TextureRole::Tonemapped,
        DisplayMode::LinearDepth => TextureRole::LinearDepth,
        DisplayMode::Normals => TextureRole::ForwardNormals,
        DisplayMode::Ssao => TextureRole::Ssao,
    }
}

/// Bottom-left tiles for the shadow-map previews, laid out left to right.
pub fn debug_tile_viewports(backbuffer_width: u32, count: usize) -> Vec<Viewport> {
    let size = (backbuffer_width / 3).min(DEBUG_TILE_MAX_SIZE);
    (0..count)
        .map(|i| Viewport {
            x: DEBUG_TILE_PADDING + i as i32 * (size as i32 + DEBUG_TILE_PADDING),
            y: DEBUG_TILE_PADDING,
            width: size,
            height: size,
        })
        .collect()
}

/// Marker position and color for every light.
pub fn light_markers(config: &Config) -> Vec<(Vec3, Vec3)> {
    let mut markers: Vec<(Vec3, Vec3)> = config
        .lights
        .iter()
        .map(|light| (light.position.to_cartesian(), Vec3::from(light.color)))
        .collect();
    markers.push((config.shadow_light_position(), Vec3::from(hex_to_rgb(SHADOW_LIGHT_MARKER))));
    markers.push((config.sss_light_position(), Vec3::from(hex_to_rgb(SSS_LIGHT_MARKER))));
    markers
}

struct FinalParams<'t> {
    viewport: Vec2,
    gamma: f32,
    subpixel: f32,
    edge_threshold: f32,
    edge_threshold_min: f32,
    display_mode: i32,
    far_plane: f32,
    source: &'t Texture,
}

impl ShaderParams for FinalParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_viewport", self.viewport)
            .set("u_gamma", self.gamma)
            .set("u_subpixel", self.subpixel)
            .set("u_edgeThreshold", self.edge_threshold)
            .set("u_edgeThresholdMin", self.edge_threshold_min)
            .set("u_displayMode", self.display_mode)
            .set("u_farPlane", self.far_plane)
            .texture("u_source", self.source);
    }
}

struct DepthPreviewParams<'t> {
    depth: &'t Texture,
}

impl ShaderParams for DepthPreviewParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.texture("u_depthTex", self.depth);
    }
}

struct MarkerParams {
    view_projection: Mat4,
    position: Vec3,
    scale: f32,
    color: Vec3,
}

impl ShaderParams for MarkerParams {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_VP", self.view_projection)
            .set("u_position", self.position)
            .set("u_scale", self.scale)
            .set("u_color", self.color);
    }
}

/// The only pass that renders to the backbuffer.
pub struct FinalPass;

impl FinalPass {
    fn draw_shadow_tiles<B: GpuBackend>(ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let program = resources.program(ProgramRole::DebugShadowMap)?;
        let maps = [TextureRole::ShadowDepth, TextureRole::SssDepth];
        let (width, height) = ctx.device.backbuffer_size();

        for (role, viewport) in maps.iter().zip(debug_tile_viewports(width, maps.len())) {
            ctx.device.viewport(viewport);
            let params = DepthPreviewParams {
                depth: resources.texture(*role)?,
            };
            ctx.device.set_params(program, &params)?;
            ctx.device.draw_fullscreen()?;
        }
        ctx.device.viewport(Viewport::full(width, height));
        Ok(())
    }

    fn draw_light_markers<B: GpuBackend>(ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let program = resources.program(ProgramRole::DebugSphere)?;
        let sphere = resources.debug_sphere()?;
        for (position, color) in light_markers(ctx.config) {
            let params = MarkerParams {
                view_projection: ctx.camera.view_projection,
                position,
                scale: DEBUG_SPHERE_SCALE,
                color,
            };
            ctx.device.set_params(program, &params)?;
            ctx.device.draw_mesh(sphere, 1)?;
        }
        Ok(())
    }
}

impl<B: GpuBackend> Pass<B> for FinalPass {
    fn name(&self) -> &str {
        "final"
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let config = ctx.config;
        let postfx = &config.postfx;
        let source = resources.texture(display_source(postfx.display_mode))?;
        let (width, height) = source.dimensions();

        ctx.device.set_backbuffer_as_render_target()?;
        ctx.device.clear(ClearRequest::color([0.0, 0.0, 0.0, 1.0]))?;
        ctx.device.set_state(&DrawState::fullscreen());
        let params = FinalParams {
            viewport: Vec2::new(width as f32, height as f32),
            gamma: postfx.gamma,
            subpixel: postfx.subpixel,
            edge_threshold: if postfx.use_fxaa { postfx.edge_threshold } else { 0.0 },
            edge_threshold_min: postfx.edge_threshold_min,
            display_mode: postfx.display_mode.shader_value(),
            far_plane: ctx.camera.settings.z_far,
            source,
        };
        ctx.device.set_params(resources.program(ProgramRole::Final)?, &params)?;
        ctx.device.draw_fullscreen()?;

        if config.shadows.show_debug_view {
            Self::draw_shadow_tiles(ctx)?;
        }
        if config.show_debug_positions {
            Self::draw_light_markers(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuCall, RenderTarget};
    use crate::passes::test_support::Fixture;

    #[test]
    fn test_debug_tiles_layout() {
        let tiles = debug_tile_viewports(320, 2);
        assert_eq!(tiles[0], Viewport { x: 5, y: 5, width: 106, height: 106 });
        assert_eq!(tiles[1].x, 5 + 106 + 5);

        let wide = debug_tile_viewports(1920, 2);
        assert_eq!(wide[0].width, DEBUG_TILE_MAX_SIZE);
        assert_eq!(wide[1].x, 5 + 200 + 5);
    }

    #[test]
    fn test_light_markers_include_shadow_casters() {
        let config = Config::default();
        let markers = light_markers(&config);
        assert_eq!(markers.len(), 5);
        assert_eq!(markers[3].1, Vec3::splat(64.0 / 255.0));
        assert!(markers[4].0.abs_diff_eq(config.sss_light_position(), 1e-6));
    }

    #[test]
    fn test_final_pass_targets_backbuffer_with_overlays() {
        let mut fixture = Fixture::new();
        fixture.config.shadows.show_debug_view = true;
        fixture.config.show_debug_positions = true;
        fixture.run(&FinalPass);
        let calls = fixture.device.backend().calls();
        assert!(calls.contains(&GpuCall::BindRenderTarget(RenderTarget::Backbuffer)));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, GpuCall::BindRenderTarget(RenderTarget::Framebuffer(_)))));
        let draws = calls.iter().filter(|c| matches!(c, GpuCall::Draw(_))).count();
        assert_eq!(draws, 1 + 2 + 5);
    }

    #[test]
    fn test_display_mode_routes_source() {
        assert_eq!(display_source(DisplayMode::Final), TextureRole::Tonemapped);
        assert_eq!(display_source(DisplayMode::Normals), TextureRole::ForwardNormals);
        assert_eq!(DisplayMode::Ssao.shader_value(), 3);
    }
}
