//! Render pipelines baked from the tracked fixed-function state.
//!
//! wgpu has no mutable fixed-function state, so every distinct combination of
//! program, state, target formats, vertex layout and texture binding types maps
//! to one cached `wgpu::RenderPipeline`.

use pollster::FutureExt;
use tracing::debug;

use super::convert::{
    TextureBindingKind, color_writes, compare_function, cull_face, stencil_operation, vertex_format,
};
use crate::backend::{BackendError, BackendResult};
use crate::resource::{AttributeFormat, ResourceId};
use crate::state::{ColorMask, CompareFunc, CullFace, StencilOps};

/// Driver-side state as set through the backend's state calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedFunction {
    pub depth_test: bool,
    pub depth_func: CompareFunc,
    pub depth_write: bool,
    pub stencil_test: bool,
    pub stencil_front: (CompareFunc, StencilOps),
    pub stencil_back: (CompareFunc, StencilOps),
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub stencil_reference: u32,
    pub cull_enabled: bool,
    pub cull_face: CullFace,
    pub color_mask: ColorMask,
}

impl Default for FixedFunction {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_func: CompareFunc::Less,
            depth_write: true,
            stencil_test: false,
            stencil_front: (CompareFunc::AlwaysPass, StencilOps::KEEP),
            stencil_back: (CompareFunc::AlwaysPass, StencilOps::KEEP),
            stencil_read_mask: 0xffff_ffff,
            stencil_write_mask: 0xffff_ffff,
            stencil_reference: 0,
            cull_enabled: false,
            cull_face: CullFace::Back,
            color_mask: ColorMask::ALL,
        }
    }
}

/// The part of [`FixedFunction`] that is baked into a pipeline for a given
/// target. Disabled tests collapse to one canonical value so they share
/// pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterKey {
    pub depth: Option<(CompareFunc, bool)>,
    pub stencil: Option<StencilKey>,
    pub cull: Option<CullFace>,
    pub color_mask: ColorMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilKey {
    pub front: (CompareFunc, StencilOps),
    pub back: (CompareFunc, StencilOps),
    pub read_mask: u32,
    pub write_mask: u32,
}

impl FixedFunction {
    pub fn raster_key(&self, has_depth: bool, has_stencil: bool) -> RasterKey {
        let depth = has_depth.then_some(if self.depth_test {
            (self.depth_func, self.depth_write)
        } else {
            (CompareFunc::AlwaysPass, false)
        });
        let stencil = (has_stencil && self.stencil_test).then_some(StencilKey {
            front: self.stencil_front,
            back: self.stencil_back,
            read_mask: self.stencil_read_mask,
            write_mask: self.stencil_write_mask,
        });
        RasterKey {
            depth,
            stencil,
            cull: self.cull_enabled.then_some(self.cull_face),
            color_mask: self.color_mask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexSlot {
    pub location: u32,
    pub format: AttributeFormat,
    pub stride: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: ResourceId,
    pub raster: RasterKey,
    pub color_formats: Vec<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub vertex_slots: Vec<VertexSlot>,
    pub textures: Vec<(u32, TextureBindingKind)>,
}

pub struct PipelineEntry {
    pub pipeline: wgpu::RenderPipeline,
    pub texture_layout: Option<wgpu::BindGroupLayout>,
}

pub struct ProgramModules<'a> {
    pub label: &'a str,
    pub vertex: &'a wgpu::ShaderModule,
    pub fragment: &'a wgpu::ShaderModule,
    pub uniform_layout: &'a wgpu::BindGroupLayout,
}

fn face_state((compare, ops): (CompareFunc, StencilOps)) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: compare_function(compare),
        fail_op: stencil_operation(ops.stencil_fail),
        depth_fail_op: stencil_operation(ops.depth_fail),
        pass_op: stencil_operation(ops.pass),
    }
}

pub fn create_pipeline(
    device: &wgpu::Device,
    modules: ProgramModules<'_>,
    key: &PipelineKey,
) -> BackendResult<PipelineEntry> {
    debug!(program = modules.label, "Creating pipeline variant");
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let texture_layout = (!key.textures.is_empty()).then(|| {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = key
            .textures
            .iter()
            .flat_map(|(binding, kind)| [kind.texture_entry(*binding), kind.sampler_entry(binding + 1)])
            .collect();
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(modules.label),
            entries: &entries,
        })
    });

    let mut bind_group_layouts = vec![modules.uniform_layout];
    if let Some(layout) = &texture_layout {
        bind_group_layouts.push(layout);
    }
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(modules.label),
        bind_group_layouts: &bind_group_layouts,
        push_constant_ranges: &[],
    });

    let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
        .vertex_slots
        .iter()
        .map(|slot| {
            [wgpu::VertexAttribute {
                format: vertex_format(slot.format),
                offset: 0,
                shader_location: slot.location,
            }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
        .vertex_slots
        .iter()
        .zip(&attributes)
        .map(|(slot, attribute)| wgpu::VertexBufferLayout {
            array_stride: slot.stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: attribute,
        })
        .collect();

    let write_mask = color_writes(key.raster.color_mask);
    let targets: Vec<Option<wgpu::ColorTargetState>> = key
        .color_formats
        .iter()
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: None,
                write_mask,
            })
        })
        .collect();

    let depth_stencil = key.depth_format.map(|format| {
        let (depth_compare, depth_write_enabled) = key
            .raster
            .depth
            .map(|(func, write)| (compare_function(func), write))
            .unwrap_or((wgpu::CompareFunction::Always, false));
        let stencil = key
            .raster
            .stencil
            .map(|s| wgpu::StencilState {
                front: face_state(s.front),
                back: face_state(s.back),
                read_mask: s.read_mask,
                write_mask: s.write_mask,
            })
            .unwrap_or_default();
        wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil,
            bias: wgpu::DepthBiasState::default(),
        }
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(modules.label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: modules.vertex,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &buffers,
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: key.raster.cull.and_then(cull_face),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: modules.fragment,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &targets,
        }),
        multiview: None,
        cache: None,
    });

    if let Some(error) = device.pop_error_scope().block_on() {
        return Err(BackendError::Pipeline(format!("{}: {error}", modules.label)));
    }

    Ok(PipelineEntry {
        pipeline,
        texture_layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_depth_collapses() {
        let a = FixedFunction {
            depth_func: CompareFunc::Less,
            ..FixedFunction::default()
        };
        let b = FixedFunction {
            depth_func: CompareFunc::Greater,
            depth_write: false,
            ..FixedFunction::default()
        };
        assert_eq!(a.raster_key(true, true), b.raster_key(true, true));
        assert_eq!(a.raster_key(true, false).depth, Some((CompareFunc::AlwaysPass, false)));
        assert_eq!(a.raster_key(false, false).depth, None);
    }

    #[test]
    fn test_stencil_ignored_without_stencil_aspect() {
        let ff = FixedFunction {
            stencil_test: true,
            ..FixedFunction::default()
        };
        assert!(ff.raster_key(true, true).stencil.is_some());
        assert!(ff.raster_key(true, false).stencil.is_none());
    }
}
