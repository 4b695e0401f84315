//! Translations from renderer types to wgpu types.

use crate::reflect::SampleKind;
use crate::resource::{
    AttributeFormat, MagFilter, MinFilter, TextureFormat, TextureKind, TextureOptions, WrapMode,
};
use crate::state::{ColorMask, CompareFunc, CullFace, StencilOp};

pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8 => wgpu::TextureFormat::R8Unorm,
        TextureFormat::R32F => wgpu::TextureFormat::R32Float,
        TextureFormat::Rg16F => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16F => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::R32Ui => wgpu::TextureFormat::R32Uint,
        TextureFormat::Rgba8Ui => wgpu::TextureFormat::Rgba8Uint,
        TextureFormat::Rgba32Ui => wgpu::TextureFormat::Rgba32Uint,
        TextureFormat::Rgba32I => wgpu::TextureFormat::Rgba32Sint,
        TextureFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

pub fn texture_dimension(kind: TextureKind) -> wgpu::TextureDimension {
    match kind {
        TextureKind::D3 => wgpu::TextureDimension::D3,
        TextureKind::D2 | TextureKind::Cube | TextureKind::D2Array => wgpu::TextureDimension::D2,
    }
}

pub fn view_dimension(kind: TextureKind) -> wgpu::TextureViewDimension {
    match kind {
        TextureKind::D2 => wgpu::TextureViewDimension::D2,
        TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        TextureKind::D3 => wgpu::TextureViewDimension::D3,
        TextureKind::D2Array => wgpu::TextureViewDimension::D2Array,
    }
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn filter(nearest: bool) -> wgpu::FilterMode {
    if nearest {
        wgpu::FilterMode::Nearest
    } else {
        wgpu::FilterMode::Linear
    }
}

/// Sampler for `options`. Formats that cannot be filtered always get nearest
/// sampling; min filters without mipmaps clamp to the base level.
pub fn sampler_descriptor(
    options: &TextureOptions,
    format: TextureFormat,
) -> wgpu::SamplerDescriptor<'static> {
    let filterable = format.is_filterable();
    let min_nearest = !filterable || options.min_filter.is_nearest();
    let mag_nearest = !filterable || options.mag_filter == MagFilter::Nearest;
    let mip_nearest = !filterable || !options.min_filter.mipmap_is_linear();

    let lod_min = options.lod_min.max(0.0) + options.mip_base as f32;
    let lod_max = if options.min_filter.uses_mipmaps() {
        options.lod_max.min(options.mip_max as f32).max(lod_min)
    } else {
        lod_min
    };

    wgpu::SamplerDescriptor {
        label: None,
        address_mode_u: address_mode(options.wrap[0]),
        address_mode_v: address_mode(options.wrap[1]),
        address_mode_w: address_mode(options.wrap[2]),
        mag_filter: filter(mag_nearest),
        min_filter: filter(min_nearest),
        mipmap_filter: filter(mip_nearest),
        lod_min_clamp: lod_min,
        lod_max_clamp: lod_max,
        ..Default::default()
    }
}

/// The binding type a texture slot needs, given what is actually bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBindingKind {
    pub sample: SampleKind,
    pub filterable: bool,
    pub dimension: TextureKind,
}

impl TextureBindingKind {
    pub fn new(sample: SampleKind, dimension: TextureKind, format: TextureFormat) -> Self {
        Self {
            sample,
            filterable: sample == SampleKind::Float && format.is_filterable(),
            dimension,
        }
    }

    pub fn texture_entry(&self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let sample_type = match self.sample {
            SampleKind::Float => wgpu::TextureSampleType::Float {
                filterable: self.filterable,
            },
            SampleKind::Depth => wgpu::TextureSampleType::Depth,
            SampleKind::Uint => wgpu::TextureSampleType::Uint,
            SampleKind::Sint => wgpu::TextureSampleType::Sint,
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type,
                view_dimension: view_dimension(self.dimension),
                multisampled: false,
            },
            count: None,
        }
    }

    pub fn sampler_entry(&self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = if self.filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Sampler(ty),
            count: None,
        }
    }
}

pub fn compare_function(func: CompareFunc) -> wgpu::CompareFunction {
    match func {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessOrEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::AlwaysPass => wgpu::CompareFunction::Always,
    }
}

pub fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
        StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
        StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
    }
}

pub fn cull_face(face: CullFace) -> Option<wgpu::Face> {
    match face {
        CullFace::Front => Some(wgpu::Face::Front),
        CullFace::Back => Some(wgpu::Face::Back),
        CullFace::FrontAndBack => None,
    }
}

pub fn color_writes(mask: ColorMask) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    if mask.r {
        writes |= wgpu::ColorWrites::RED;
    }
    if mask.g {
        writes |= wgpu::ColorWrites::GREEN;
    }
    if mask.b {
        writes |= wgpu::ColorWrites::BLUE;
    }
    if mask.a {
        writes |= wgpu::ColorWrites::ALPHA;
    }
    writes
}

pub fn vertex_format(format: AttributeFormat) -> wgpu::VertexFormat {
    match format {
        AttributeFormat::Float => wgpu::VertexFormat::Float32,
        AttributeFormat::Vec2 => wgpu::VertexFormat::Float32x2,
        AttributeFormat::Vec3 => wgpu::VertexFormat::Float32x3,
        AttributeFormat::Vec4 => wgpu::VertexFormat::Float32x4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_filterable_formats_sample_nearest() {
        let desc = sampler_descriptor(&TextureOptions::default(), TextureFormat::Rgba32F);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Nearest);
        let desc = sampler_descriptor(&TextureOptions::default(), TextureFormat::Rgba16F);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
    }

    #[test]
    fn test_lod_clamps_are_valid() {
        let desc = sampler_descriptor(&TextureOptions::default(), TextureFormat::Rgba8);
        assert_eq!(desc.lod_min_clamp, 0.0);
        assert_eq!(desc.lod_max_clamp, 0.0);
        let options = TextureOptions {
            min_filter: MinFilter::LinearMipmapLinear,
            ..TextureOptions::default()
        };
        let desc = sampler_descriptor(&options, TextureFormat::Rgba8);
        assert_eq!(desc.lod_max_clamp, 1000.0);
        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Linear);
    }

    #[test]
    fn test_color_writes() {
        assert_eq!(color_writes(ColorMask::ALL), wgpu::ColorWrites::ALL);
        assert_eq!(color_writes(ColorMask::NONE), wgpu::ColorWrites::empty());
    }
}
