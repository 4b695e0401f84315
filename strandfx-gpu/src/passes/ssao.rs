//! Screen-space ambient occlusion from linear depth and normals.
//!
//! The hemisphere kernel and the rotation noise are generated once from a
//! fixed seed, so every run produces the same occlusion.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::GpuBackend;
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{TargetRole, TextureRole};
use crate::math::lerp;
use crate::passes::{PassError, bind_target};
use crate::resource::Texture;
use crate::shaders::ProgramRole;
use crate::state::DrawState;
use crate::uniforms::{ShaderParams, UniformSet};

/// Samples in the precomputed kernel, and the array length the program declares.
pub const SSAO_KERNEL_SIZE: usize = 256;
/// Side of the tiled rotation-noise texture.
pub const SSAO_NOISE_SIZE: u32 = 4;

/// xorshift64*, uniform in `[0, 1)`.
struct SeededRandom(u64);

impl SeededRandom {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_f32(&mut self) -> f32 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        let bits = self.0.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 40;
        bits as f32 / (1u64 << 24) as f32
    }
}

/// Points in the +Z hemisphere, denser towards the origin.
pub fn generate_kernel(count: usize, seed: u64) -> Vec<Vec4> {
    let mut random = SeededRandom::new(seed);
    (0..count)
        .map(|i| {
            let sample = Vec3::new(
                random.next_f32() * 2.0 - 1.0,
                random.next_f32() * 2.0 - 1.0,
                random.next_f32(),
            )
            .normalize_or_zero();
            let t = i as f32 / count as f32;
            (sample * lerp(0.1, 1.0, t * t)).extend(0.0)
        })
        .collect()
}

/// Random rotation vectors around +Z, one per noise texel.
pub fn generate_noise(seed: u64) -> Vec<Vec2> {
    let mut random = SeededRandom::new(seed ^ 0x9e37_79b9_7f4a_7c15);
    (0..SSAO_NOISE_SIZE * SSAO_NOISE_SIZE)
        .map(|_| Vec2::new(random.next_f32() * 2.0 - 1.0, random.next_f32() * 2.0 - 1.0))
        .collect()
}

struct SsaoParams<'t> {
    projection: glam::Mat4,
    view: glam::Mat4,
    noise_scale: Vec2,
    kernel_size: i32,
    radius: f32,
    bias: f32,
    kernel: Vec<Vec4>,
    linear_depth: &'t Texture,
    normals: &'t Texture,
    noise: &'t Texture,
}

impl ShaderParams for SsaoParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        set.set("u_projection", self.projection)
            .set("u_invProjectionMat", self.projection.inverse())
            .set("u_viewMat", self.view)
            .set("u_noiseScale", self.noise_scale)
            .set("u_kernelSize", self.kernel_size)
            .set("u_radius", self.radius)
            .set("u_bias", self.bias)
            .set("u_kernel", self.kernel.clone())
            .texture("u_linearDepthTex", self.linear_depth)
            .texture("u_normalTex", self.normals)
            .texture("u_noiseTex", self.noise);
    }
}

/// Writes raw occlusion into the SSAO target. The blur passes smooth it.
pub struct SsaoPass;

impl<B: GpuBackend> Pass<B> for SsaoPass {
    fn name(&self) -> &str {
        "ssao"
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let config = ctx.config;
        let ssao = &config.ssao;
        let target = resources.texture(TextureRole::Ssao)?;
        let (width, height) = target.dimensions();

        bind_target(ctx, TargetRole::Ssao)?;
        ctx.device.set_state(&DrawState::fullscreen());
        let params = SsaoParams {
            projection: ctx.camera.projection,
            view: ctx.camera.view,
            noise_scale: Vec2::new(width as f32, height as f32) / SSAO_NOISE_SIZE as f32,
            kernel_size: (ssao.kernel_size as usize).min(SSAO_KERNEL_SIZE) as i32,
            radius: ssao.radius,
            bias: ssao.bias,
            kernel: resources.ssao_kernel().to_vec(),
            linear_depth: resources.texture(TextureRole::LinearDepth)?,
            normals: resources.texture(TextureRole::ForwardNormals)?,
            noise: resources.texture(TextureRole::SsaoNoise)?,
        };
        ctx.device.set_params(resources.program(ProgramRole::Ssao)?, &params)?;
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
    fn test_kernel_is_deterministic_and_in_hemisphere() {
        let kernel = generate_kernel(SSAO_KERNEL_SIZE, 7);
        assert_eq!(kernel, generate_kernel(SSAO_KERNEL_SIZE, 7));
        assert_ne!(kernel, generate_kernel(SSAO_KERNEL_SIZE, 8));
        for (i, sample) in kernel.iter().enumerate() {
            let t = i as f32 / SSAO_KERNEL_SIZE as f32;
            assert!(sample.z >= 0.0);
            assert!(sample.w == 0.0);
            assert!(sample.truncate().length() <= lerp(0.1, 1.0, t * t) + 1e-5);
        }
    }

    #[test]
    fn test_noise_components_in_range() {
        let noise = generate_noise(1);
        assert_eq!(noise.len(), 16);
        assert!(noise.iter().all(|v| v.abs().max_element() <= 1.0));
    }

    #[test]
    fn test_ssao_draws_one_fullscreen_triangle() {
        let mut fixture = Fixture::new();
        fixture.run(&SsaoPass);
        let draws = fixture
            .device
            .backend()
            .calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::Draw(d) if d.vertex_array.is_none() && d.vertex_count == 3))
            .count();
        assert_eq!(draws, 1);
    }
}
