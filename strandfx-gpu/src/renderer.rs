//! Frame orchestration: owns the device and the frame resources, schedules the
//! passes for the current configuration and runs them once per frame.

use strandfx_data::World;
use tracing::{debug, info, info_span};

use crate::backend::{BackendError, ClearRequest, GpuBackend};
use crate::camera::Camera;
use crate::config::Config;
use crate::device::Device;
use crate::frame_graph::{FrameGraph, FrameGraphError, PassBuilder, PassContext};
use crate::frame_resources::{FrameResourceError, FrameResources, TargetRole, TextureRole};
use crate::passes::final_pass::display_source;
use crate::passes::{
    BlurPass, ClearPass, FinalPass, ForwardPass, HairPass, LinearDepthPass, ShadowLight,
    ShadowPass, SsaoPass, SssBlurPass, TonemapPass,
};
use crate::resource::ResourceError;
use crate::shaders::ShaderLibrary;

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("Render targets are not allocated; call resize before rendering")]
    NotSized,

    #[error(transparent)]
    FrameResources(#[from] FrameResourceError),

    #[error(transparent)]
    FrameGraph(#[from] FrameGraphError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Passes for one frame under `config`, in execution order.
pub fn schedule_passes<B: GpuBackend>(config: &Config) -> Result<FrameGraph<'static, B>, FrameGraphError> {
    let mut graph = FrameGraph::new();
    let hair = config.hair.enabled;

    graph
        .add_pass(
            PassBuilder::new("shadow")
                .write(TextureRole::ShadowDepth)
                .with_pass(ShadowPass::new(
                    ShadowLight::Primary,
                    hair && config.shadows.hair_casts_shadow,
                )),
        )?
        .add_pass(
            PassBuilder::new("sss_shadow")
                .write(TextureRole::SssDepth)
                .with_pass(ShadowPass::new(ShadowLight::Sss, false)),
        )?
        .add_pass(
            PassBuilder::new("forward")
                .read(TextureRole::ShadowDepth)
                .read(TextureRole::SssDepth)
                .write(TextureRole::ForwardDepthStencil)
                .write(TextureRole::ForwardColor)
                .write(TextureRole::ForwardNormals)
                .with_pass(ForwardPass),
        )?;

    if hair {
        graph.add_pass(
            PassBuilder::new("hair")
                .read(TextureRole::ShadowDepth)
                .read_write(TextureRole::ForwardDepthStencil)
                .read_write(TextureRole::ForwardColor)
                .read_write(TextureRole::ForwardNormals)
                .with_pass(HairPass),
        )?;
    }

    graph.add_pass(
        PassBuilder::new("linear_depth")
            .read(TextureRole::ForwardDepthStencil)
            .write(TextureRole::LinearDepth)
            .with_pass(LinearDepthPass),
    )?;

    if config.ssao.enabled {
        graph.add_pass(
            PassBuilder::new("ssao")
                .read(TextureRole::LinearDepth)
                .read(TextureRole::ForwardNormals)
                .read(TextureRole::SsaoNoise)
                .write(TextureRole::Ssao)
                .with_pass(SsaoPass),
        )?;
        for horizontal in [true, false] {
            let blur = BlurPass::new(horizontal);
            let name = if horizontal { "ssao_blur_h" } else { "ssao_blur_v" };
            graph.add_pass(
                PassBuilder::new(name)
                    .read(blur.source())
                    .read(TextureRole::LinearDepth)
                    .write(blur.output())
                    .with_pass(blur),
            )?;
        }
    } else {
        graph.add_pass(
            PassBuilder::new("ssao_clear")
                .write(TextureRole::Ssao)
                .with_pass(ClearPass::new(
                    "ssao_clear",
                    TargetRole::Ssao,
                    ClearRequest::color([1.0; 4]),
                )),
        )?;
    }

    if config.sss_blur.enabled {
        for horizontal in [true, false] {
            let blur = SssBlurPass::new(horizontal);
            let name = if horizontal { "sss_blur_h" } else { "sss_blur_v" };
            graph.add_pass(
                PassBuilder::new(name)
                    .read(blur.source())
                    .read(TextureRole::LinearDepth)
                    .read(TextureRole::ForwardDepthStencil)
                    .write(blur.output())
                    .with_pass(blur),
            )?;
        }
    }

    let mut final_pass = PassBuilder::new("final")
        .read(display_source(config.postfx.display_mode))
        .write_backbuffer();
    if config.shadows.show_debug_view {
        final_pass = final_pass
            .read(TextureRole::ShadowDepth)
            .read(TextureRole::SssDepth);
    }
    graph
        .add_pass(
            PassBuilder::new("tonemapping")
                .read(TextureRole::ForwardColor)
                .read(TextureRole::Ssao)
                .write(TextureRole::Tonemapped)
                .with_pass(TonemapPass),
        )?
        .add_pass(final_pass.with_pass(FinalPass))?;

    Ok(graph)
}

pub struct Renderer<B: GpuBackend> {
    device: Device<B>,
    resources: FrameResources,
    shaders: ShaderLibrary,
    frame_index: u64,
}

impl<B: GpuBackend> Renderer<B> {
    pub fn new(backend: B, shaders: ShaderLibrary) -> Self {
        Self {
            device: Device::new(backend),
            resources: FrameResources::new(),
            shaders,
            frame_index: 0,
        }
    }

    /// Compile programs and allocate the resolution-independent resources.
    pub fn initialize(&mut self, config: &Config) -> Result<(), RendererError> {
        let limits = self.device.limits();
        info!(
            texture_units = limits.max_texture_units,
            max_texture_size = limits.max_texture_size,
            "Initializing renderer"
        );
        self.resources
            .initialize(&mut self.device, config, &self.shaders)?;
        Ok(())
    }

    /// Resize the backbuffer and reallocate every drawable-sized target.
    pub fn resize(&mut self, width: u32, height: u32, config: &Config) -> Result<(), RendererError> {
        self.device.resize_backbuffer(width, height)?;
        self.resources
            .on_resize(&mut self.device, width, height, config.supersampling)?;
        Ok(())
    }

    /// Render one frame. A failing pass aborts the rest of the frame.
    pub fn render_frame(
        &mut self,
        config: &Config,
        world: &World,
        camera: &Camera,
    ) -> Result<(), RendererError> {
        let Some((width, height)) = self.resources.dimensions() else {
            return Err(RendererError::NotSized);
        };
        let _span = info_span!("frame", index = self.frame_index).entered();

        let mut camera = camera.clone();
        camera.update_projection(width, height);
        let camera = camera.frame();

        let graph = schedule_passes::<B>(config)?.build()?;
        debug!(passes = ?graph.pass_names(), "Frame scheduled");

        self.device.begin_frame()?;
        let mut ctx = PassContext {
            device: &mut self.device,
            resources: &self.resources,
            config,
            world,
            camera: &camera,
        };
        let executed = graph.execute(&mut ctx);
        let ended = self.device.end_frame();
        executed?;
        ended?;

        self.frame_index += 1;
        Ok(())
    }

    /// Release every GPU resource the renderer owns.
    pub fn shutdown(&mut self) -> Result<(), RendererError> {
        self.resources.destroy(&mut self.device)?;
        info!(frames = self.frame_index, "Renderer shut down");
        Ok(())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_index
    }

    pub fn device(&self) -> &Device<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<B> {
        &mut self.device
    }

    pub fn resources(&self) -> &FrameResources {
        &self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuCall, RecordingBackend, RenderTarget};
    use crate::scene::{HairStrands, Material, Mesh, Transform};
    use glam::{Vec2, Vec3};
    use strandfx_data::{PreparedHair, StrandLayout, StrandSet, generate_sphere};

    fn renderer(config: &Config) -> Renderer<RecordingBackend> {
        let mut renderer = Renderer::new(
            RecordingBackend::new().with_backbuffer(320, 180),
            ShaderLibrary::embedded(),
        );
        renderer.initialize(config).unwrap();
        renderer
    }

    fn scene(renderer: &mut Renderer<RecordingBackend>) -> World {
        let mut world = World::new();
        let device = renderer.device_mut();

        let head = world.spawn();
        world.insert(head, Transform::default());
        world.insert(head, Mesh::from_shape(device, "head", &generate_sphere(1.0, 12, 8)).unwrap());
        world.insert(head, Material::solid_color(device, "skin", [0.8, 0.6, 0.5]).unwrap());

        let layout = StrandLayout {
            num_strands: 3,
            vertices_per_strand: 4,
        };
        let points: Vec<Vec3> = (0..12).map(|i| Vec3::new((i / 4) as f32, 1.0 - (i % 4) as f32 * 0.2, 0.0)).collect();
        let prepared = PreparedHair::prepare(&StrandSet::from_points(layout, &points).unwrap(), 64).unwrap();
        let hair = world.spawn();
        world.insert(hair, Transform::default());
        world.insert(hair, HairStrands::upload(device, "hair", &prepared).unwrap());
        world
    }

    fn pass_names(config: &Config) -> Vec<String> {
        schedule_passes::<RecordingBackend>(config)
            .unwrap()
            .build()
            .unwrap()
            .pass_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_default_schedule_order() {
        assert_eq!(
            pass_names(&Config::default()),
            [
                "shadow",
                "sss_shadow",
                "forward",
                "hair",
                "linear_depth",
                "ssao",
                "ssao_blur_h",
                "ssao_blur_v",
                "sss_blur_h",
                "sss_blur_v",
                "tonemapping",
                "final",
            ]
        );
    }

    #[test]
    fn test_disabled_passes_are_not_scheduled() {
        let mut config = Config::default();
        config.ssao.enabled = false;
        config.sss_blur.enabled = false;
        config.hair.enabled = false;
        assert_eq!(
            pass_names(&config),
            ["shadow", "sss_shadow", "forward", "linear_depth", "ssao_clear", "tonemapping", "final"]
        );
    }

    #[test]
    fn test_render_before_resize_fails() {
        let config = Config::default();
        let mut renderer = renderer(&config);
        let camera = Camera::new(Vec3::Z * 5.0, Vec2::ZERO, config.camera.settings);
        assert!(matches!(
            renderer.render_frame(&config, &World::new(), &camera),
            Err(RendererError::NotSized)
        ));
    }

    #[test]
    fn test_render_frame_with_skin_and_hair() {
        let mut config = Config::default();
        config.shadows.show_debug_view = true;
        config.show_debug_positions = true;
        let mut renderer = renderer(&config);
        renderer.resize(320, 180, &config).unwrap();
        let world = scene(&mut renderer);
        let camera = Camera::new(Vec3::Z * 5.0, Vec2::ZERO, config.camera.settings);

        renderer.device_mut().backend_mut().clear_calls();
        renderer.render_frame(&config, &world, &camera).unwrap();
        assert_eq!(renderer.frames_rendered(), 1);

        let calls = renderer.device().backend().calls();
        assert_eq!(calls.first(), Some(&GpuCall::BeginFrame));
        assert_eq!(calls.last(), Some(&GpuCall::EndFrame));
        let backbuffer_binds = calls
            .iter()
            .filter(|c| matches!(c, GpuCall::BindRenderTarget(RenderTarget::Backbuffer)))
            .count();
        assert_eq!(backbuffer_binds, 1);
    }

    #[test]
    fn test_supersampling_doubles_targets() {
        let mut config = Config::default();
        config.supersampling = true;
        let mut renderer = renderer(&config);
        renderer.resize(320, 180, &config).unwrap();
        assert_eq!(renderer.resources().dimensions(), Some((640, 360)));
        assert_eq!(renderer.device().backbuffer_size(), (320, 180));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let config = Config::default();
        let mut renderer = renderer(&config);
        renderer.resize(64, 64, &config).unwrap();
        renderer.resize(64, 64, &config).unwrap();
        renderer.shutdown().unwrap();
        let backend = renderer.device().backend();
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_framebuffers(), 0);
        assert_eq!(backend.live_programs(), 0);
    }
}
