//! Textures: kind, sized format, dimensions and sampling options.

use super::{Lifetime, impl_gpu_resource};
use crate::resource::{GpuResource, ResourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
    D3,
    D2Array,
}

/// Sized pixel formats. The format alone decides allocation size, integer
/// sampling rules and whether the texture can serve as a depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    R8,
    R32F,
    Rg16F,
    Rgba8,
    Rgba16F,
    Rgba32F,
    R32Ui,
    Rgba8Ui,
    Rgba32Ui,
    Rgba32I,
    Depth16,
    Depth24Stencil8,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Depth16 => 2,
            TextureFormat::R32F
            | TextureFormat::Rg16F
            | TextureFormat::Rgba8
            | TextureFormat::R32Ui
            | TextureFormat::Rgba8Ui
            | TextureFormat::Depth24Stencil8 => 4,
            TextureFormat::Rgba16F => 8,
            TextureFormat::Rgba32F | TextureFormat::Rgba32Ui | TextureFormat::Rgba32I => 16,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TextureFormat::R32Ui
                | TextureFormat::Rgba8Ui
                | TextureFormat::Rgba32Ui
                | TextureFormat::Rgba32I
        )
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth16 | TextureFormat::Depth24Stencil8)
    }

    pub fn is_depth_stencil(self) -> bool {
        self == TextureFormat::Depth24Stencil8
    }

    /// 32-bit float formats are not filterable without an optional device feature.
    pub fn is_filterable(self) -> bool {
        !(self.is_integer()
            || self.is_depth()
            || matches!(self, TextureFormat::R32F | TextureFormat::Rgba32F))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MinFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl MinFilter {
    pub fn is_nearest(self) -> bool {
        matches!(
            self,
            MinFilter::Nearest | MinFilter::NearestMipmapNearest | MinFilter::NearestMipmapLinear
        )
    }

    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, MinFilter::Nearest | MinFilter::Linear)
    }

    pub fn mipmap_is_linear(self) -> bool {
        matches!(
            self,
            MinFilter::NearestMipmapLinear | MinFilter::LinearMipmapLinear
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MagFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    ClampToEdge,
    MirroredRepeat,
    Repeat,
}

/// Sampling state stored with the texture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureOptions {
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    /// s, t, r
    pub wrap: [WrapMode; 3],
    pub mip_base: u32,
    pub mip_max: u32,
    pub lod_min: f32,
    pub lod_max: f32,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            min_filter: MinFilter::Linear,
            mag_filter: MagFilter::Linear,
            wrap: [WrapMode::ClampToEdge; 3],
            mip_base: 0,
            mip_max: 1000,
            lod_min: -1000.0,
            lod_max: 1000.0,
        }
    }
}

impl TextureOptions {
    pub fn nearest() -> Self {
        Self {
            min_filter: MinFilter::Nearest,
            mag_filter: MagFilter::Nearest,
            ..Self::default()
        }
    }

    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = [wrap; 3];
        self
    }

    /// Default options adjusted for `format`.
    pub fn for_format(format: TextureFormat) -> Self {
        Self::default().sanitized(format)
    }

    /// Integer formats cannot be filtered; depth formats additionally clamp to edge.
    pub fn sanitized(mut self, format: TextureFormat) -> Self {
        if format.is_integer() || format.is_depth() {
            self.min_filter = MinFilter::Nearest;
            self.mag_filter = MagFilter::Nearest;
        }
        if format.is_depth() {
            self.wrap = [WrapMode::ClampToEdge; 3];
        }
        self
    }
}

/// Everything needed to allocate a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, layer count for arrays, ignored otherwise.
    pub depth: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub options: TextureOptions,
}

impl TextureDesc {
    pub fn new_2d(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            kind: TextureKind::D2,
            width,
            height,
            depth: 1,
            mip_levels: 1,
            format,
            options: TextureOptions::for_format(format),
        }
    }

    pub fn with_options(mut self, options: TextureOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_kind(mut self, kind: TextureKind, depth: u32) -> Self {
        self.kind = kind;
        self.depth = depth;
        self
    }

    pub fn with_mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels.max(1);
        self
    }

    /// Number of array layers (faces for cubes).
    pub fn layers(&self) -> u32 {
        match self.kind {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
            TextureKind::D3 | TextureKind::D2Array => self.depth.max(1),
        }
    }

    /// Width, height and depth/layers of mip `level`. Array layers do not shrink.
    pub fn level_size(&self, level: u32) -> (u32, u32, u32) {
        let shrink = |v: u32| (v >> level).max(1);
        let depth = match self.kind {
            TextureKind::D3 => shrink(self.depth.max(1)),
            _ => self.layers(),
        };
        (shrink(self.width), shrink(self.height), depth)
    }

    pub fn level_byte_size(&self, level: u32) -> usize {
        let (w, h, d) = self.level_size(level);
        w as usize * h as usize * d as usize * self.format.bytes_per_texel() as usize
    }
}

/// Maximum mip count for a size, i.e. `floor(log2(max(w, h))) + 1`.
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[derive(Debug)]
pub struct Texture {
    pub(crate) lifetime: Lifetime,
    desc: TextureDesc,
}

impl_gpu_resource!(Texture, ResourceKind::Texture);

impl Texture {
    pub(crate) fn new(mut desc: TextureDesc) -> Self {
        desc.options = desc.options.sanitized(desc.format);
        Self {
            lifetime: Lifetime::new(),
            desc,
        }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn kind(&self) -> TextureKind {
        self.desc.kind
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub fn options(&self) -> &TextureOptions {
        &self.desc.options
    }

    pub(crate) fn set_options(&mut self, options: TextureOptions) {
        self.desc.options = options.sanitized(self.desc.format);
    }

    pub fn is_depth(&self) -> bool {
        self.desc.format.is_depth()
    }
}

impl std::fmt::Display for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Texture '{}' {} [{}x{} {:?}]",
            self.desc.label,
            self.id(),
            self.desc.width,
            self.desc.height,
            self.desc.format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats_force_nearest_clamp() {
        let opts = TextureOptions::default()
            .with_wrap(WrapMode::Repeat)
            .sanitized(TextureFormat::Depth24Stencil8);
        assert_eq!(opts.min_filter, MinFilter::Nearest);
        assert_eq!(opts.mag_filter, MagFilter::Nearest);
        assert_eq!(opts.wrap, [WrapMode::ClampToEdge; 3]);
    }

    #[test]
    fn test_integer_formats_force_nearest_keep_wrap() {
        let opts = TextureOptions::default()
            .with_wrap(WrapMode::Repeat)
            .sanitized(TextureFormat::Rgba32Ui);
        assert_eq!(opts.min_filter, MinFilter::Nearest);
        assert_eq!(opts.wrap, [WrapMode::Repeat; 3]);
    }

    #[test]
    fn test_float_formats_keep_requested_filtering() {
        let opts = TextureOptions::for_format(TextureFormat::Rgba16F);
        assert_eq!(opts, TextureOptions::default());
    }

    #[test]
    fn test_level_sizes() {
        let desc = TextureDesc::new_2d("t", 256, 64, TextureFormat::Rgba8).with_mip_levels(9);
        assert_eq!(desc.level_size(0), (256, 64, 1));
        assert_eq!(desc.level_size(3), (32, 8, 1));
        assert_eq!(desc.level_size(8), (1, 1, 1));
        assert_eq!(desc.level_byte_size(1), 128 * 32 * 4);

        let cube = TextureDesc::new_2d("c", 16, 16, TextureFormat::R8).with_kind(TextureKind::Cube, 0);
        assert_eq!(cube.level_size(1), (8, 8, 6));
        let volume = TextureDesc::new_2d("v", 8, 8, TextureFormat::R8).with_kind(TextureKind::D3, 8);
        assert_eq!(volume.level_size(2), (2, 2, 2));
    }

    #[test]
    fn test_full_mip_chain() {
        assert_eq!(full_mip_chain(1, 1), 1);
        assert_eq!(full_mip_chain(256, 64), 9);
        assert_eq!(full_mip_chain(300, 2), 9);
    }

    #[test]
    fn test_format_properties() {
        assert!(TextureFormat::Depth24Stencil8.is_depth_stencil());
        assert!(!TextureFormat::Depth16.is_depth_stencil());
        assert!(TextureFormat::Depth16.is_depth());
        assert!(!TextureFormat::Rgba32F.is_filterable());
        assert!(TextureFormat::Rgba16F.is_filterable());
        assert_eq!(TextureFormat::Rgba32F.bytes_per_texel(), 16);
    }
}
