//! Headless run loop: build a scene, render a fixed number of frames, tear down.

use std::path::PathBuf;

use glam::{Vec2, Vec3};
use strandfx_data::{PreparedHair, StrandLayout, StrandSet, TfxFile, World, generate_sphere};
use strandfx_gpu::math::hex_to_rgb;
use strandfx_gpu::{
    Camera, Config, Device, GpuBackend, HairStrands, Material, Mesh, Name, Renderer,
    ShaderLibrary, Transform,
};
use tracing::{info, info_span};

use crate::errors::AppError;

const HEAD_RADIUS: f32 = 1.0;
const SKIN_COLOR: u32 = 0xe0ac8f;
const DEMO_STRANDS: u32 = 256;
const DEMO_VERTICES_PER_STRAND: u32 = 16;
const DEMO_STRAND_LENGTH: f32 = 1.2;

/// Everything the run loop needs besides the backend.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: Config,
    pub frames: u32,
    pub width: u32,
    pub height: u32,
    /// Resize to this size halfway through the run.
    pub resize_to: Option<(u32, u32)>,
    /// TressFX file; a procedural scalp is generated when absent.
    pub hair: Option<PathBuf>,
    pub shader_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config: Config::default(),
            frames: 3,
            width: 1280,
            height: 720,
            resize_to: None,
            hair: None,
            shader_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub strands: u32,
}

pub fn run<B: GpuBackend>(backend: B, options: &RunOptions) -> Result<RunSummary, AppError> {
    let shaders = match &options.shader_dir {
        Some(dir) => ShaderLibrary::with_override_dir(dir),
        None => ShaderLibrary::embedded(),
    };
    let config = &options.config;
    let mut renderer = Renderer::new(backend, shaders);
    renderer.initialize(config)?;
    renderer.resize(options.width, options.height, config)?;

    let strands = load_strands(options)?;
    let strand_count = strands.layout().num_strands;
    let mut world = build_scene(renderer.device_mut(), &strands)?;
    let camera = Camera::new(
        Vec3::from(config.camera.position),
        Vec2::from(config.camera.rotation),
        config.camera.settings,
    );

    let resize_at = options.frames / 2;
    for frame in 0..options.frames {
        if let Some((width, height)) = options.resize_to.filter(|_| frame == resize_at) {
            info!(width, height, "Resizing");
            renderer.resize(width, height, config)?;
        }
        renderer.render_frame(config, &world, &camera)?;
    }

    release_scene(renderer.device_mut(), &mut world)?;
    renderer.shutdown()?;
    Ok(RunSummary {
        frames: renderer.frames_rendered(),
        strands: strand_count,
    })
}

fn load_strands(options: &RunOptions) -> Result<StrandSet, AppError> {
    match &options.hair {
        Some(path) => {
            let _span = info_span!("load_hair", path = %path.display()).entered();
            let strands = TfxFile::load(path)?.into_strands()?;
            info!(strands = strands.layout().num_strands, "Hair loaded");
            Ok(strands)
        }
        None => Ok(demo_strands(DEMO_STRANDS, DEMO_VERTICES_PER_STRAND)?),
    }
}

/// Strands rooted on the upper half of the head, growing outwards and
/// drooping with length.
pub fn demo_strands(count: u32, vertices_per_strand: u32) -> Result<StrandSet, strandfx_data::HairError> {
    let layout = StrandLayout {
        num_strands: count,
        vertices_per_strand,
    };
    let golden = std::f32::consts::PI * (3.0 - 5f32.sqrt());
    let segment = DEMO_STRAND_LENGTH / vertices_per_strand.saturating_sub(1).max(1) as f32;
    let mut points = Vec::with_capacity(layout.total_vertices());
    for strand in 0..count {
        let y = 1.0 - (strand as f32 + 0.5) / count as f32;
        let ring = (1.0 - y * y).sqrt();
        let angle = strand as f32 * golden;
        let normal = Vec3::new(angle.cos() * ring, y, angle.sin() * ring);
        let mut position = normal * HEAD_RADIUS;
        for _ in 0..vertices_per_strand {
            points.push(position);
            let direction = (normal - Vec3::Y * 0.8).normalize_or_zero();
            position += direction * segment;
        }
    }
    StrandSet::from_points(layout, &points)
}

fn build_scene<B: GpuBackend>(device: &mut Device<B>, strands: &StrandSet) -> Result<World, AppError> {
    let mut world = World::new();

    let head = world.spawn();
    world.insert(head, Name("head".to_string()));
    world.insert(head, Transform::default());
    world.insert(head, Mesh::from_shape(device, "head", &generate_sphere(HEAD_RADIUS, 48, 32))?);
    world.insert(head, Material::solid_color(device, "skin", hex_to_rgb(SKIN_COLOR))?);

    let prepared = PreparedHair::prepare(strands, device.limits().max_texture_size)?;
    let hair = world.spawn();
    world.insert(hair, Name("hair".to_string()));
    world.insert(hair, Transform::default());
    world.insert(hair, HairStrands::upload(device, "hair", &prepared)?);

    info!(entities = world.len(), "Scene built");
    Ok(world)
}

fn release_scene<B: GpuBackend>(device: &mut Device<B>, world: &mut World) -> Result<(), AppError> {
    for (_, mut mesh) in world.drain::<Mesh>() {
        mesh.destroy(device)?;
    }
    for (_, mut material) in world.drain::<Material>() {
        material.destroy(device)?;
    }
    for (_, mut hair) in world.drain::<HairStrands>() {
        hair.destroy(device)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strandfx_gpu::RecordingBackend;

    #[test]
    fn test_demo_strands_start_on_head() {
        let strands = demo_strands(32, 8).unwrap();
        assert_eq!(strands.layout().total_vertices(), 32 * 8);
        for strand in 0..32 {
            let root = strands.strand(strand)[0].truncate();
            assert!((root.length() - HEAD_RADIUS).abs() < 1e-4);
            assert!(root.y >= 0.0);
        }
    }

    #[test]
    fn test_headless_run_with_resize() {
        let options = RunOptions {
            frames: 4,
            width: 160,
            height: 90,
            resize_to: Some((200, 100)),
            ..RunOptions::default()
        };
        let summary = run(RecordingBackend::new().with_backbuffer(160, 90), &options).unwrap();
        assert_eq!(summary, RunSummary { frames: 4, strands: DEMO_STRANDS });
    }

    #[test]
    fn test_missing_hair_file_is_reported() {
        let options = RunOptions {
            hair: Some(PathBuf::from("/nonexistent/strandfx/hair.tfx")),
            ..RunOptions::default()
        };
        let err = run(RecordingBackend::new(), &options).unwrap_err();
        assert!(matches!(err, AppError::Tfx(_)));
    }
}
