//! Renderer configuration.
//!
//! Every section is `#[serde(default)]`, so a JSON file only needs the values it
//! overrides. Colors are linear RGB.

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::camera::CameraSettings;
use crate::math::{OrthoBox, hex_to_rgb, rgb8, spherical_to_cartesian};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Position on a sphere around the origin, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphericalPosition {
    pub phi: f32,
    pub theta: f32,
    pub radius: f32,
}

impl SphericalPosition {
    pub const fn new(phi: f32, theta: f32, radius: f32) -> Self {
        Self { phi, theta, radius }
    }

    pub fn to_cartesian(&self) -> Vec3 {
        spherical_to_cartesian(self.phi, self.theta) * self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    pub position: SphericalPosition,
    pub color: [f32; 3],
    pub energy: f32,
}

impl LightConfig {
    /// `rgb` in `xyz`, energy in `w`.
    pub fn color_and_energy(&self) -> [f32; 4] {
        [self.color[0], self.color[1], self.color[2], self.energy]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: [f32; 3],
    pub energy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    /// Pitch and yaw in radians.
    pub rotation: [f32; 2],
    pub settings: CameraSettings,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 2.5, 5.0],
            rotation: [0.0, 0.0],
            settings: CameraSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowLightConfig {
    pub position: SphericalPosition,
    pub target: [f32; 3],
    pub projection: OrthoBox,
}

impl Default for ShadowLightConfig {
    fn default() -> Self {
        Self {
            position: SphericalPosition::new(140.0, 45.0, 10.0),
            target: [0.0; 3],
            projection: OrthoBox::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub map_size: u32,
    /// Percentage-closer soft shadows instead of plain PCF.
    pub use_pcss: bool,
    /// PCF sample radius in texels; fractional part is dropped.
    pub blur_radius: f32,
    pub bias: f32,
    /// Maximum darkening a shadow contributes.
    pub strength: f32,
    pub hair_casts_shadow: bool,
    pub show_debug_view: bool,
    pub directional_light: ShadowLightConfig,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 1024,
            use_pcss: false,
            blur_radius: 4.0,
            bias: 0.05,
            strength: 0.2,
            hair_casts_shadow: true,
            show_debug_view: false,
            directional_light: ShadowLightConfig::default(),
        }
    }
}

/// Light whose depth map drives the forward-scattering (translucency) term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SssLightConfig {
    pub position: SphericalPosition,
    pub depth_map_size: u32,
    pub projection: OrthoBox,
}

impl Default for SssLightConfig {
    fn default() -> Self {
        Self {
            position: SphericalPosition::new(-50.0, 60.0, 10.0),
            depth_map_size: 1024,
            projection: OrthoBox::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SssBlurConfig {
    pub enabled: bool,
    pub width: f32,
    pub strength: f32,
    pub follow_surface: bool,
    /// Multiplier on the `fov / width * height` approximation sent as fovy.
    pub fovy_scale: f32,
}

impl Default for SssBlurConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 25.0,
            strength: 0.35,
            follow_surface: false,
            fovy_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoConfig {
    pub enabled: bool,
    /// Samples used per pixel, at most the precomputed kernel size.
    pub kernel_size: u32,
    pub radius: f32,
    pub bias: f32,
    pub strength: f32,
    pub exponent: f32,
    pub blur_radius: f32,
    pub blur_gauss_sigma: f32,
    pub blur_max_depth_distance: f32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 24,
            radius: 0.5,
            bias: 0.025,
            strength: 0.3,
            exponent: 3.0,
            blur_radius: 7.0,
            blur_gauss_sigma: 3.0,
            blur_max_depth_distance: 0.06,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TonemappingOp {
    Linear,
    Reinhard,
    Uncharted2,
    Photographic,
    #[default]
    AcesUe4,
}

impl TonemappingOp {
    pub fn shader_value(self) -> i32 {
        self as i32
    }
}

/// One color-grading control: a tint plus a scalar amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorGradingProp {
    pub color: [f32; 3],
    pub value: f32,
}

impl ColorGradingProp {
    pub const fn neutral(value: f32) -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            value,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.color[0], self.color[1], self.color[2], self.value]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorGradingRange {
    pub saturation: ColorGradingProp,
    pub contrast: ColorGradingProp,
    pub gamma: ColorGradingProp,
    pub gain: ColorGradingProp,
    pub offset: ColorGradingProp,
}

impl Default for ColorGradingRange {
    fn default() -> Self {
        Self {
            saturation: ColorGradingProp::neutral(1.0),
            contrast: ColorGradingProp::neutral(1.0),
            gamma: ColorGradingProp::neutral(1.0),
            gain: ColorGradingProp::neutral(1.0),
            offset: ColorGradingProp::neutral(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorGrading {
    pub global: ColorGradingRange,
    pub shadows: ColorGradingRange,
    pub midtones: ColorGradingRange,
    pub highlights: ColorGradingRange,
    /// Luma below which a pixel counts as shadow.
    pub shadows_max: f32,
    /// Luma above which a pixel counts as highlight.
    pub highlights_min: f32,
}

impl Default for ColorGrading {
    fn default() -> Self {
        Self {
            global: ColorGradingRange::default(),
            shadows: ColorGradingRange::default(),
            midtones: ColorGradingRange::default(),
            highlights: ColorGradingRange::default(),
            shadows_max: 0.09,
            highlights_min: 0.5,
        }
    }
}

/// What the final pass shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Final,
    LinearDepth,
    Normals,
    Ssao,
}

impl DisplayMode {
    pub fn shader_value(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFxConfig {
    pub gamma: f32,
    pub exposure: f32,
    pub white_point: f32,
    pub tonemapping_op: TonemappingOp,
    pub aces_c: f32,
    pub aces_s: f32,
    pub color_grading: ColorGrading,
    pub use_fxaa: bool,
    pub subpixel: f32,
    pub edge_threshold: f32,
    pub edge_threshold_min: f32,
    pub display_mode: DisplayMode,
}

impl Default for PostFxConfig {
    fn default() -> Self {
        Self {
            gamma: 2.2,
            exposure: 1.0,
            white_point: 1.0,
            tonemapping_op: TonemappingOp::AcesUe4,
            aces_c: 0.8,
            aces_s: 1.0,
            color_grading: ColorGrading::default(),
            use_fxaa: true,
            subpixel: 0.75,
            edge_threshold: 0.125,
            edge_threshold_min: 0.0625,
            display_mode: DisplayMode::Final,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HairDisplayMode {
    #[default]
    Final,
    Flat,
    FollowGroups,
    RootTipPercentage,
    Shadow,
}

impl HairDisplayMode {
    pub fn shader_value(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairConfig {
    pub enabled: bool,
    pub display_mode: HairDisplayMode,
    pub fiber_radius: f32,
    /// Tip radius as a fraction of the root radius.
    pub thin_tip: f32,
    /// Radius multiplier used when hair is rendered into shadow maps.
    pub shadow_radius_multiplier: f32,
    /// Follow hairs rendered per guide strand as extra instances.
    pub follow_hairs: u32,
    pub follow_hair_spread_root: f32,
    pub follow_hair_spread_tip: f32,
    pub shadow_bias: f32,
    pub shadow_blur_radius: f32,
    pub albedo: [f32; 3],
    pub specular_color1: [f32; 3],
    pub specular_power1: f32,
    pub specular_color2: [f32; 3],
    pub specular_power2: f32,
    pub specular_shift: f32,
}

impl Default for HairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            display_mode: HairDisplayMode::Final,
            fiber_radius: 0.02,
            thin_tip: 0.5,
            shadow_radius_multiplier: 1.2,
            follow_hairs: 5,
            follow_hair_spread_root: 0.3,
            follow_hair_spread_tip: 0.09,
            shadow_bias: 0.03,
            shadow_blur_radius: 2.0,
            albedo: rgb8([98, 59, 40]),
            specular_color1: rgb8([255, 236, 208]),
            specular_power1: 80.0,
            specular_color2: rgb8([178, 137, 104]),
            specular_power2: 8.0,
            specular_shift: 0.06,
        }
    }
}

/// Skin material defaults for meshes without an explicit material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinConfig {
    pub fresnel_exponent: f32,
    pub fresnel_multiplier: f32,
    pub fresnel_color: [f32; 3],
    pub ss_color1: [f32; 3],
    pub ss_color2: [f32; 3],
    pub model_scale: f32,
}

impl Default for SkinConfig {
    fn default() -> Self {
        Self {
            fresnel_exponent: 18.0,
            fresnel_multiplier: 12.0,
            fresnel_color: [0.57, 0.105, 0.218],
            ss_color1: [0.146, 0.53, 0.178],
            ss_color2: [0.685, 0.273, 0.158],
            model_scale: 0.1,
        }
    }
}

/// Stencil bits written by the geometry passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StencilBits {
    pub skin: u32,
    pub hair: u32,
}

impl Default for StencilBits {
    fn default() -> Self {
        Self {
            skin: 1 << 0,
            hair: 1 << 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub clear_color: [f32; 3],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// Render resolution-dependent targets at twice the drawable size.
    pub supersampling: bool,
    pub show_debug_positions: bool,
    pub camera: CameraConfig,
    pub ambient: AmbientLight,
    pub lights: [LightConfig; 3],
    pub shadows: ShadowConfig,
    pub sss_light: SssLightConfig,
    pub sss_blur: SssBlurConfig,
    pub ssao: SsaoConfig,
    pub postfx: PostFxConfig,
    pub hair: HairConfig,
    pub skin: SkinConfig,
    pub stencil: StencilBits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clear_color: hex_to_rgb(0xa0a0a0),
            clear_depth: 1.0,
            clear_stencil: 0,
            supersampling: false,
            show_debug_positions: false,
            camera: CameraConfig::default(),
            ambient: AmbientLight {
                color: hex_to_rgb(0xa0a0a0),
                energy: 0.15,
            },
            lights: [
                LightConfig {
                    position: SphericalPosition::new(125.0, 45.0, 10.0),
                    color: rgb8([214, 197, 208]),
                    energy: 1.0,
                },
                LightConfig {
                    position: SphericalPosition::new(45.0, 82.0, 10.0),
                    color: rgb8([214, 166, 166]),
                    energy: 0.8,
                },
                LightConfig {
                    position: SphericalPosition::new(-105.0, 55.0, 10.0),
                    color: rgb8([133, 171, 169]),
                    energy: 0.55,
                },
            ],
            shadows: ShadowConfig::default(),
            sss_light: SssLightConfig::default(),
            sss_blur: SssBlurConfig::default(),
            ssao: SsaoConfig::default(),
            postfx: PostFxConfig::default(),
            hair: HairConfig::default(),
            skin: SkinConfig::default(),
            stencil: StencilBits::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn shadow_light_position(&self) -> Vec3 {
        self.shadows.directional_light.position.to_cartesian()
    }

    pub fn sss_light_position(&self) -> Vec3 {
        self.sss_light.position.to_cartesian()
    }
}
