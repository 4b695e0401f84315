use crate::backend::GpuBackend;
use crate::config::{ColorGradingRange, PostFxConfig, SsaoConfig};
use crate::frame_graph::{Pass, PassContext};
use crate::frame_resources::{TargetRole, TextureRole};
use crate::passes::{PassError, bind_target};
use crate::resource::Texture;
use crate::shaders::ProgramRole;
use crate::state::DrawState;
use crate::uniforms::{ShaderParams, UniformSet};

/// Uniform names for saturation, contrast, gamma, gain and offset, per range.
const GRADING_UNIFORMS: [[&str; 5]; 4] = [
    [
        "u_colorSaturation",
        "u_colorContrast",
        "u_colorGamma",
        "u_colorGain",
        "u_colorOffset",
    ],
    [
        "u_colorSaturationShadows",
        "u_colorContrastShadows",
        "u_colorGammaShadows",
        "u_colorGainShadows",
        "u_colorOffsetShadows",
    ],
    [
        "u_colorSaturationMidtones",
        "u_colorContrastMidtones",
        "u_colorGammaMidtones",
        "u_colorGainMidtones",
        "u_colorOffsetMidtones",
    ],
    [
        "u_colorSaturationHighlights",
        "u_colorContrastHighlights",
        "u_colorGammaHighlights",
        "u_colorGainHighlights",
        "u_colorOffsetHighlights",
    ],
];

fn write_range(set: &mut UniformSet<'_>, names: &[&'static str; 5], range: &ColorGradingRange) {
    let props = [
        range.saturation,
        range.contrast,
        range.gamma,
        range.gain,
        range.offset,
    ];
    for (name, prop) in names.iter().zip(props) {
        set.set(*name, glam::Vec4::from(prop.to_array()));
    }
}

struct TonemapParams<'t> {
    postfx: PostFxConfig,
    ssao: SsaoConfig,
    source: &'t Texture,
    ambient_occlusion: &'t Texture,
}

impl ShaderParams for TonemapParams<'_> {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
        let grading = &self.postfx.color_grading;
        let ranges = [&grading.global, &grading.shadows, &grading.midtones, &grading.highlights];
        for (names, range) in GRADING_UNIFORMS.iter().zip(ranges) {
            write_range(set, names, range);
        }
        set.set("u_colorCorrectionShadowsMax", grading.shadows_max)
            .set("u_colorCorrectionHighlightsMin", grading.highlights_min)
            .set("u_exposure", self.postfx.exposure)
            .set("u_whitePoint", self.postfx.white_point)
            .set("u_tonemappingMode", self.postfx.tonemapping_op.shader_value())
            .set("u_acesC", self.postfx.aces_c)
            .set("u_acesS", self.postfx.aces_s)
            .set("u_ssaoStrength", self.ssao.strength)
            .set("u_ssaoExponent", self.ssao.exponent)
            .texture("u_source", self.source)
            .texture("u_ssaoTex", self.ambient_occlusion);
    }
}

/// Color grading, ambient occlusion and the tone-mapping operator, into LDR.
pub struct TonemapPass;

impl<B: GpuBackend> Pass<B> for TonemapPass {
    fn name(&self) -> &str {
        "tonemapping"
    }

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError> {
        let resources = ctx.resources;
        let config = ctx.config;

        bind_target(ctx, TargetRole::Tonemapped)?;
        ctx.device.set_state(&DrawState::fullscreen());
        let params = TonemapParams {
            postfx: config.postfx,
            ssao: config.ssao,
            source: resources.texture(TextureRole::ForwardColor)?,
            ambient_occlusion: resources.texture(TextureRole::Ssao)?,
        };
        ctx.device
            .set_params(resources.program(ProgramRole::Tonemapping)?, &params)?;
        ctx.device.draw_fullscreen()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::passes::test_support::Fixture;
    use crate::uniforms::UniformValue;

    #[test]
    fn test_every_grading_uniform_is_written() {
        let fixture = Fixture::new();
        let config = Config::default();
        let texture = fixture.resources.texture(TextureRole::SsaoNoise).unwrap();
        let params = TonemapParams {
            postfx: config.postfx,
            ssao: config.ssao,
            source: texture,
            ambient_occlusion: texture,
        };
        let set = params.to_set();
        for name in GRADING_UNIFORMS.iter().flatten() {
            assert!(matches!(set.value(name), Some(UniformValue::Vec4(_))), "{name}");
        }
        let program = fixture.resources.program(ProgramRole::Tonemapping).unwrap();
        for (name, _) in set.values() {
            assert!(program.has_uniform(name), "{name}");
        }
    }

    #[test]
    fn test_tonemap_pass_runs_strict() {
        let mut fixture = Fixture::new();
        fixture.run(&TonemapPass);
    }
}
