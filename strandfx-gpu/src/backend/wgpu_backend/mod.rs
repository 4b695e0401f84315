//! [`GpuBackend`] on top of wgpu.
//!
//! State calls update a tracked [`FixedFunction`] record; draws bake it into a
//! cached pipeline. Render passes open lazily on the first draw after a target
//! change and pick up any pending clear as their load operations. All commands
//! of a frame go into one encoder that is submitted in `end_frame`.

mod convert;
mod pipeline;

use std::collections::HashMap;
use std::num::NonZeroU64;

use pollster::FutureExt;
use tracing::{debug, info, trace, warn};

use self::convert::{TextureBindingKind, sampler_descriptor, texture_dimension, texture_format, view_dimension};
use self::pipeline::{FixedFunction, PipelineEntry, PipelineKey, ProgramModules, VertexSlot, create_pipeline};
use super::{
    BackendError, BackendResult, Capability, ClearRequest, DeviceLimits, DrawCall, GpuBackend,
    RenderTarget, StencilFace, Viewport,
};
use crate::reflect::ProgramInterface;
use crate::resource::{
    AttachmentPoint, BufferKind, CompileFailure, Diagnostic, FramebufferAttachment,
    FramebufferStatus, ProgramSource, ResourceId, ShaderStage, TextureDesc, TextureKind,
    TextureOptions, VertexArrayDesc,
};
use crate::state::{ColorMask, CompareFunc, CullFace, StencilOps};

const UNIFORM_RING_SIZE: u64 = 4 * 1024 * 1024;
const BACKBUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    attachment_view: wgpu::TextureView,
    sample_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct GpuFramebuffer {
    colors: Vec<ResourceId>,
    depth: Option<ResourceId>,
    size: (u32, u32),
}

struct GpuProgram {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    interface: ProgramInterface,
    uniform_data: Vec<u8>,
    uniform_layout: Option<wgpu::BindGroupLayout>,
    uniform_group: Option<wgpu::BindGroup>,
    texture_units: HashMap<u32, u32>,
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::RenderPass<'static>>,
}

struct TargetInfo {
    colors: Vec<(ResourceId, wgpu::TextureFormat)>,
    depth: Option<(ResourceId, wgpu::TextureFormat)>,
    size: (u32, u32),
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: DeviceLimits,

    textures: HashMap<ResourceId, GpuTexture>,
    framebuffers: HashMap<ResourceId, GpuFramebuffer>,
    buffers: HashMap<ResourceId, wgpu::Buffer>,
    vertex_arrays: HashMap<ResourceId, VertexArrayDesc>,
    programs: HashMap<ResourceId, GpuProgram>,
    pipelines: HashMap<PipelineKey, PipelineEntry>,

    empty_layout: wgpu::BindGroupLayout,
    empty_group: wgpu::BindGroup,
    uniform_ring: wgpu::Buffer,
    ring_data: Vec<u8>,
    ring_alignment: u64,

    backbuffer: wgpu::Texture,
    backbuffer_view: wgpu::TextureView,
    backbuffer_size: (u32, u32),

    fixed: FixedFunction,
    units: Vec<Option<ResourceId>>,
    target: RenderTarget,
    viewport: Viewport,
    current_program: Option<ResourceId>,
    pending_clear: Option<ClearRequest>,
    frame: Option<Frame>,
}

impl WgpuBackend {
    /// Create a backend rendering into an offscreen backbuffer.
    pub async fn new(width: u32, height: u32) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        let info = adapter.get_info();
        info!(adapter = %info.name, backend = ?info.backend, "Using GPU adapter");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("strandfx"),
                ..Default::default()
            })
            .await?;
        Ok(Self::from_device(device, queue, width, height))
    }

    /// Blocking variant of [`WgpuBackend::new`].
    pub fn headless(width: u32, height: u32) -> Result<Self, BackendError> {
        Self::new(width, height).block_on()
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let device_limits = device.limits();
        let limits = DeviceLimits {
            max_texture_units: device_limits
                .max_sampled_textures_per_shader_stage
                .min(device_limits.max_samplers_per_shader_stage),
            max_texture_size: device_limits.max_texture_dimension_2d,
            max_3d_texture_size: device_limits.max_texture_dimension_3d,
            max_array_layers: device_limits.max_texture_array_layers,
        };

        let empty_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("empty"),
            entries: &[],
        });
        let empty_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("empty"),
            layout: &empty_layout,
            entries: &[],
        });
        let uniform_ring = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform ring"),
            size: UNIFORM_RING_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let (backbuffer, backbuffer_view) = create_backbuffer(&device, width, height);

        Self {
            limits,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            empty_layout,
            empty_group,
            uniform_ring,
            ring_data: Vec::new(),
            ring_alignment: device_limits.min_uniform_buffer_offset_alignment as u64,
            backbuffer,
            backbuffer_view,
            backbuffer_size: (width.max(1), height.max(1)),
            fixed: FixedFunction::default(),
            units: vec![None; limits.max_texture_units as usize],
            target: RenderTarget::Backbuffer,
            viewport: Viewport::full(width, height),
            current_program: None,
            pending_clear: None,
            frame: None,
            device,
            queue,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// The offscreen texture the final pass renders into.
    pub fn backbuffer(&self) -> &wgpu::Texture {
        &self.backbuffer
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn texture(&self, id: ResourceId) -> BackendResult<&GpuTexture> {
        self.textures.get(&id).ok_or(BackendError::UnknownResource { kind: "texture", id })
    }

    fn target_info(&self) -> BackendResult<TargetInfo> {
        match self.target {
            RenderTarget::Backbuffer => Ok(TargetInfo {
                colors: Vec::new(),
                depth: None,
                size: self.backbuffer_size,
            }),
            RenderTarget::Framebuffer(id) => {
                let fbo = self
                    .framebuffers
                    .get(&id)
                    .ok_or(BackendError::UnknownResource { kind: "framebuffer", id })?;
                let format = |tex: &ResourceId| -> BackendResult<(ResourceId, wgpu::TextureFormat)> {
                    Ok((*tex, texture_format(self.texture(*tex)?.desc.format)))
                };
                Ok(TargetInfo {
                    colors: fbo.colors.iter().map(format).collect::<BackendResult<_>>()?,
                    depth: fbo.depth.as_ref().map(format).transpose()?,
                    size: fbo.size,
                })
            }
        }
    }

    fn color_formats(&self, info: &TargetInfo) -> Vec<wgpu::TextureFormat> {
        if matches!(self.target, RenderTarget::Backbuffer) {
            vec![BACKBUFFER_FORMAT]
        } else {
            info.colors.iter().map(|(_, f)| *f).collect()
        }
    }

    /// End the open render pass, if any.
    fn end_pass(&mut self) {
        if let Some(frame) = self.frame.as_mut() {
            frame.pass = None;
        }
    }

    /// Open a render pass on the current target, consuming the pending clear.
    fn ensure_pass(&mut self) -> BackendResult<()> {
        let has_pass = self
            .frame
            .as_ref()
            .ok_or(BackendError::NoFrame)?
            .pass
            .is_some();
        if has_pass {
            return Ok(());
        }

        let info = self.target_info()?;
        let clear = self.pending_clear.take().unwrap_or_default();
        let color_load = match clear.color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let color_ops = wgpu::Operations {
            load: color_load,
            store: wgpu::StoreOp::Store,
        };

        let textures = &self.textures;
        let attachment_view = |id: ResourceId| {
            textures
                .get(&id)
                .map(|t| &t.attachment_view)
                .ok_or(BackendError::UnknownResource { kind: "texture", id })
        };
        let color_views: Vec<&wgpu::TextureView> = match self.target {
            RenderTarget::Backbuffer => vec![&self.backbuffer_view],
            RenderTarget::Framebuffer(_) => info
                .colors
                .iter()
                .map(|(id, _)| attachment_view(*id))
                .collect::<BackendResult<_>>()?,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: color_ops,
                })
            })
            .collect();

        let depth_stencil_attachment = match info.depth {
            Some((id, format)) => {
                let depth_load = match clear.depth {
                    Some(depth) => wgpu::LoadOp::Clear(depth),
                    None => wgpu::LoadOp::Load,
                };
                let stencil_ops = format.has_stencil_aspect().then(|| wgpu::Operations {
                    load: match clear.stencil {
                        Some(stencil) => wgpu::LoadOp::Clear(stencil),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                });
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: attachment_view(id)?,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops,
                })
            }
            None => None,
        };

        let frame = self.frame.as_mut().ok_or(BackendError::NoFrame)?;
        let mut pass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("strandfx pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        apply_viewport(&mut pass, self.viewport, info.size);
        trace!(render_target = ?self.target, "Opened render pass");
        frame.pass = Some(pass);
        Ok(())
    }

    /// Copy the program's uniform block into the ring and return its offset.
    fn push_uniforms(&mut self, program: ResourceId) -> BackendResult<Option<u32>> {
        let data = &self
            .programs
            .get(&program)
            .ok_or(BackendError::UnknownResource { kind: "program", id: program })?
            .uniform_data;
        if data.is_empty() {
            return Ok(None);
        }
        let offset = (self.ring_data.len() as u64).next_multiple_of(self.ring_alignment);
        if offset + data.len() as u64 > UNIFORM_RING_SIZE {
            return Err(BackendError::UniformRingFull(UNIFORM_RING_SIZE));
        }
        self.ring_data.resize(offset as usize, 0);
        self.ring_data.extend_from_slice(data);
        Ok(Some(offset as u32))
    }

    /// Resolve the texture bound to every slot the program declares.
    fn program_textures(&self, program: &GpuProgram) -> BackendResult<Vec<(u32, ResourceId, TextureBindingKind)>> {
        program
            .interface
            .textures
            .iter()
            .map(|slot| {
                let unit = program.texture_units.get(&slot.binding).copied().unwrap_or(0);
                let id = self
                    .units
                    .get(unit as usize)
                    .copied()
                    .flatten()
                    .ok_or_else(|| {
                        BackendError::Pipeline(format!(
                            "program '{}' samples '{}' from empty unit {unit}",
                            program.name, slot.name
                        ))
                    })?;
                let texture = self.texture(id)?;
                Ok((
                    slot.binding,
                    id,
                    TextureBindingKind::new(slot.sample, texture.desc.kind, texture.desc.format),
                ))
            })
            .collect()
    }
}

fn create_backbuffer(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("backbuffer"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: BACKBUFFER_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Convert a bottom-left origin viewport to wgpu's top-left origin, clamped to
/// the target.
fn apply_viewport(pass: &mut wgpu::RenderPass<'static>, viewport: Viewport, (tw, th): (u32, u32)) {
    let x = viewport.x.clamp(0, tw as i32) as u32;
    let y = viewport.y.clamp(0, th as i32) as u32;
    let width = viewport.width.min(tw - x);
    let height = viewport.height.min(th - y);
    if width == 0 || height == 0 {
        return;
    }
    let top = th - (y + height);
    pass.set_viewport(x as f32, top as f32, width as f32, height as f32, 0.0, 1.0);
}

fn compilation_diagnostics(module: &wgpu::ShaderModule) -> Vec<Diagnostic> {
    module
        .get_compilation_info()
        .block_on()
        .messages
        .into_iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| Diagnostic {
            line: m.location.map(|l| l.line_number),
            message: m.message,
        })
        .collect()
}

impl GpuBackend for WgpuBackend {
    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn create_texture(&mut self, id: ResourceId, desc: &TextureDesc) -> BackendResult<()> {
        let format = texture_format(desc.format);
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
        if !desc.format.is_depth() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        if desc.kind == TextureKind::D2 {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label.as_str()),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: desc.layers(),
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: texture_dimension(desc.kind),
            format,
            usage,
            view_formats: &[],
        });
        let aspect = if desc.format.is_depth_stencil() {
            wgpu::TextureAspect::DepthOnly
        } else {
            wgpu::TextureAspect::All
        };
        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label.as_str()),
            dimension: Some(view_dimension(desc.kind)),
            aspect,
            ..Default::default()
        });
        let attachment_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label.as_str()),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(1),
            ..Default::default()
        });
        let sampler = self
            .device
            .create_sampler(&sampler_descriptor(&desc.options, desc.format));
        self.textures.insert(
            id,
            GpuTexture {
                desc: desc.clone(),
                texture,
                attachment_view,
                sample_view,
                sampler,
            },
        );
        Ok(())
    }

    fn write_texture(&mut self, id: ResourceId, level: u32, data: &[u8]) -> BackendResult<()> {
        let texture = self.texture(id)?;
        let desc = &texture.desc;
        if desc.format.is_depth() {
            return Err(BackendError::Unsupported(format!("uploading into depth texture '{}'", desc.label)));
        }
        let expected = desc.level_byte_size(level);
        if data.len() != expected {
            return Err(BackendError::UploadSize {
                expected,
                actual: data.len(),
            });
        }
        let (width, height, depth) = desc.level_size(level);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * desc.format.bytes_per_texel()),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: depth,
            },
        );
        Ok(())
    }

    fn set_sampling(&mut self, id: ResourceId, options: &TextureOptions) -> BackendResult<()> {
        let format = self.texture(id)?.desc.format;
        let sampler = self.device.create_sampler(&sampler_descriptor(options, format));
        if let Some(texture) = self.textures.get_mut(&id) {
            texture.desc.options = *options;
            texture.sampler = sampler;
        }
        Ok(())
    }

    fn destroy_texture(&mut self, id: ResourceId) {
        if let Some(texture) = self.textures.remove(&id) {
            texture.texture.destroy();
        }
        for unit in &mut self.units {
            if *unit == Some(id) {
                *unit = None;
            }
        }
    }

    fn create_framebuffer(
        &mut self,
        id: ResourceId,
        attachments: &[FramebufferAttachment],
    ) -> BackendResult<FramebufferStatus> {
        let mut colors = Vec::new();
        let mut depth = None;
        for attachment in attachments {
            let Some(texture) = self.textures.get(&attachment.texture) else {
                return Ok(FramebufferStatus::IncompleteAttachment(format!(
                    "missing texture {}",
                    attachment.texture
                )));
            };
            if texture.desc.kind != TextureKind::D2 {
                return Ok(FramebufferStatus::Unsupported(format!(
                    "{:?} textures cannot be attached",
                    texture.desc.kind
                )));
            }
            match attachment.point {
                AttachmentPoint::Color(_) => colors.push(attachment.texture),
                AttachmentPoint::Depth | AttachmentPoint::DepthStencil => depth = Some(attachment.texture),
            }
        }
        if colors.len() as u32 > self.device.limits().max_color_attachments {
            return Ok(FramebufferStatus::Unsupported(format!(
                "{} color attachments",
                colors.len()
            )));
        }
        let size = attachments
            .first()
            .map(|a| (a.width, a.height))
            .unwrap_or((1, 1));
        self.framebuffers.insert(id, GpuFramebuffer { colors, depth, size });
        Ok(FramebufferStatus::Complete)
    }

    fn destroy_framebuffer(&mut self, id: ResourceId) {
        if self.target == RenderTarget::Framebuffer(id) {
            self.end_pass();
            self.pending_clear = None;
            self.target = RenderTarget::Backbuffer;
        }
        self.framebuffers.remove(&id);
    }

    fn create_buffer(&mut self, id: ResourceId, kind: BufferKind, data: &[u8]) -> BackendResult<()> {
        use wgpu::util::DeviceExt;

        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: data,
            usage,
        });
        self.buffers.insert(id, buffer);
        Ok(())
    }

    fn destroy_buffer(&mut self, id: ResourceId) {
        if let Some(buffer) = self.buffers.remove(&id) {
            buffer.destroy();
        }
    }

    fn create_vertex_array(&mut self, id: ResourceId, desc: &VertexArrayDesc) -> BackendResult<()> {
        let buffers = desc
            .attributes
            .iter()
            .map(|a| a.buffer)
            .chain(desc.indices.map(|i| i.buffer));
        for buffer in buffers {
            if !self.buffers.contains_key(&buffer) {
                return Err(BackendError::UnknownResource { kind: "buffer", id: buffer });
            }
        }
        self.vertex_arrays.insert(id, desc.clone());
        Ok(())
    }

    fn destroy_vertex_array(&mut self, id: ResourceId) {
        self.vertex_arrays.remove(&id);
    }

    fn compile_program(
        &mut self,
        id: ResourceId,
        source: &ProgramSource,
        interface: &ProgramInterface,
    ) -> BackendResult<Result<(), CompileFailure>> {
        let mut modules = Vec::with_capacity(2);
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(format!("{} ({stage})", source.name).as_str()),
                source: wgpu::ShaderSource::Wgsl(source.stage(stage).into()),
            });
            let diagnostics = compilation_diagnostics(&module);
            let scope_error = self.device.pop_error_scope().block_on();
            if !diagnostics.is_empty() || scope_error.is_some() {
                let mut diagnostics = diagnostics;
                if diagnostics.is_empty() {
                    if let Some(error) = scope_error {
                        diagnostics.push(Diagnostic {
                            line: None,
                            message: error.to_string(),
                        });
                    }
                }
                return Ok(Err(CompileFailure { stage, diagnostics }));
            }
            modules.push(module);
        }
        let (Some(fragment), Some(vertex)) = (modules.pop(), modules.pop()) else {
            return Err(BackendError::Pipeline(format!("program '{}' lost a stage", source.name)));
        };

        let block_size = NonZeroU64::new(interface.uniform_block_size as u64);
        let (uniform_layout, uniform_group) = match block_size {
            Some(size) => {
                let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(source.name.as_str()),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: Some(size),
                        },
                        count: None,
                    }],
                });
                let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(source.name.as_str()),
                    layout: &layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &self.uniform_ring,
                            offset: 0,
                            size: Some(size),
                        }),
                    }],
                });
                (Some(layout), Some(group))
            }
            None => (None, None),
        };

        debug!(program = %source.name, "Compiled program");
        self.programs.insert(
            id,
            GpuProgram {
                name: source.name.clone(),
                vertex,
                fragment,
                interface: interface.clone(),
                uniform_data: vec![0; interface.uniform_block_size as usize],
                uniform_layout,
                uniform_group,
                texture_units: HashMap::new(),
            },
        );
        Ok(Ok(()))
    }

    fn destroy_program(&mut self, id: ResourceId) {
        self.programs.remove(&id);
        self.pipelines.retain(|key, _| key.program != id);
        if self.current_program == Some(id) {
            self.current_program = None;
        }
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::DepthTest => self.fixed.depth_test = enabled,
            Capability::StencilTest => self.fixed.stencil_test = enabled,
            Capability::CullFace => self.fixed.cull_enabled = enabled,
            Capability::Dither => trace!(enabled, "Dithering has no wgpu equivalent"),
        }
    }

    fn depth_func(&mut self, func: CompareFunc) {
        self.fixed.depth_func = func;
    }

    fn depth_mask(&mut self, write: bool) {
        self.fixed.depth_write = write;
    }

    fn stencil_func(&mut self, face: StencilFace, func: CompareFunc, reference: u32, mask: u32) {
        if matches!(face, StencilFace::Front | StencilFace::FrontAndBack) {
            self.fixed.stencil_front.0 = func;
        }
        if matches!(face, StencilFace::Back | StencilFace::FrontAndBack) {
            self.fixed.stencil_back.0 = func;
        }
        self.fixed.stencil_reference = reference;
        self.fixed.stencil_read_mask = mask;
    }

    fn stencil_op(&mut self, face: StencilFace, ops: StencilOps) {
        if matches!(face, StencilFace::Front | StencilFace::FrontAndBack) {
            self.fixed.stencil_front.1 = ops;
        }
        if matches!(face, StencilFace::Back | StencilFace::FrontAndBack) {
            self.fixed.stencil_back.1 = ops;
        }
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.fixed.stencil_write_mask = mask;
    }

    fn cull_face(&mut self, face: CullFace) {
        self.fixed.cull_face = face;
    }

    fn color_mask(&mut self, mask: ColorMask) {
        self.fixed.color_mask = mask;
    }

    fn bind_texture(&mut self, unit: u32, texture: ResourceId) -> BackendResult<()> {
        self.texture(texture)?;
        let slot = self
            .units
            .get_mut(unit as usize)
            .ok_or_else(|| BackendError::Unsupported(format!("texture unit {unit}")))?;
        *slot = Some(texture);
        Ok(())
    }

    fn bind_render_target(&mut self, target: RenderTarget) -> BackendResult<()> {
        if let RenderTarget::Framebuffer(id) = target {
            if !self.framebuffers.contains_key(&id) {
                return Err(BackendError::UnknownResource { kind: "framebuffer", id });
            }
        }
        if self.target == target {
            return Ok(());
        }
        if self.pending_clear.is_some() && self.frame.is_some() {
            self.ensure_pass()?;
        }
        self.end_pass();
        self.target = target;
        Ok(())
    }

    fn viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        let size = match self.target_info() {
            Ok(info) => info.size,
            Err(err) => {
                warn!(%err, "Viewport set on an unknown target");
                return;
            }
        };
        if let Some(pass) = self.frame.as_mut().and_then(|f| f.pass.as_mut()) {
            apply_viewport(pass, viewport, size);
        }
    }

    fn clear(&mut self, request: ClearRequest) -> BackendResult<()> {
        if self.frame.is_none() {
            return Err(BackendError::NoFrame);
        }
        self.end_pass();
        let pending = self.pending_clear.get_or_insert_with(ClearRequest::default);
        pending.color = request.color.or(pending.color);
        pending.depth = request.depth.or(pending.depth);
        pending.stencil = request.stencil.or(pending.stencil);
        Ok(())
    }

    fn use_program(&mut self, program: ResourceId) -> BackendResult<()> {
        if !self.programs.contains_key(&program) {
            return Err(BackendError::UnknownResource { kind: "program", id: program });
        }
        self.current_program = Some(program);
        Ok(())
    }

    fn set_uniform(&mut self, program: ResourceId, offset: u32, data: &[u8]) -> BackendResult<()> {
        let gpu = self
            .programs
            .get_mut(&program)
            .ok_or(BackendError::UnknownResource { kind: "program", id: program })?;
        let start = offset as usize;
        let end = start + data.len();
        let Some(target) = gpu.uniform_data.get_mut(start..end) else {
            return Err(BackendError::UploadSize {
                expected: gpu.uniform_data.len().saturating_sub(start),
                actual: data.len(),
            });
        };
        target.copy_from_slice(data);
        Ok(())
    }

    fn set_texture_unit(&mut self, program: ResourceId, binding: u32, unit: u32) -> BackendResult<()> {
        let gpu = self
            .programs
            .get_mut(&program)
            .ok_or(BackendError::UnknownResource { kind: "program", id: program })?;
        gpu.texture_units.insert(binding, unit);
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> BackendResult<()> {
        if self.frame.is_none() {
            return Err(BackendError::NoFrame);
        }
        let program_id = self.current_program.ok_or(BackendError::NoProgram)?;
        if self.fixed.cull_enabled && self.fixed.cull_face == CullFace::FrontAndBack {
            trace!("Skipping draw with both faces culled");
            return Ok(());
        }

        let info = self.target_info()?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or(BackendError::UnknownResource { kind: "program", id: program_id })?;
        let textures = self.program_textures(program)?;
        let vertex_array = match call.vertex_array {
            Some(id) => Some(
                self.vertex_arrays
                    .get(&id)
                    .ok_or(BackendError::UnknownResource { kind: "vertex array", id })?,
            ),
            None => None,
        };
        let vertex_slots = vertex_array
            .map(|va| {
                va.attributes
                    .iter()
                    .map(|a| VertexSlot {
                        location: a.location,
                        format: a.format,
                        stride: a.effective_stride(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let depth_format = info.depth.map(|(_, f)| f);
        let key = PipelineKey {
            program: program_id,
            raster: self.fixed.raster_key(
                depth_format.is_some(),
                depth_format.is_some_and(|f| f.has_stencil_aspect()),
            ),
            color_formats: self.color_formats(&info),
            depth_format,
            vertex_slots,
            textures: textures.iter().map(|(binding, _, kind)| (*binding, *kind)).collect(),
        };

        if !self.pipelines.contains_key(&key) {
            let modules = ProgramModules {
                label: &program.name,
                vertex: &program.vertex,
                fragment: &program.fragment,
                uniform_layout: program.uniform_layout.as_ref().unwrap_or(&self.empty_layout),
            };
            let entry = create_pipeline(&self.device, modules, &key)?;
            self.pipelines.insert(key.clone(), entry);
        }

        let texture_group = match self.pipelines.get(&key).and_then(|e| e.texture_layout.as_ref()) {
            Some(layout) => {
                let mut entries = Vec::with_capacity(textures.len() * 2);
                for (binding, id, _) in &textures {
                    let texture = self.texture(*id)?;
                    entries.push(wgpu::BindGroupEntry {
                        binding: *binding,
                        resource: wgpu::BindingResource::TextureView(&texture.sample_view),
                    });
                    entries.push(wgpu::BindGroupEntry {
                        binding: binding + 1,
                        resource: wgpu::BindingResource::Sampler(&texture.sampler),
                    });
                }
                Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout,
                    entries: &entries,
                }))
            }
            None => None,
        };

        let dynamic_offset = self.push_uniforms(program_id)?;
        self.ensure_pass()?;

        let entry = self
            .pipelines
            .get(&key)
            .ok_or_else(|| BackendError::Pipeline("pipeline cache miss".into()))?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or(BackendError::UnknownResource { kind: "program", id: program_id })?;
        let pass = self
            .frame
            .as_mut()
            .and_then(|f| f.pass.as_mut())
            .ok_or(BackendError::NoFrame)?;

        pass.set_pipeline(&entry.pipeline);
        match (&program.uniform_group, dynamic_offset) {
            (Some(group), Some(offset)) => pass.set_bind_group(0, group, &[offset]),
            _ => pass.set_bind_group(0, &self.empty_group, &[]),
        }
        if let Some(group) = &texture_group {
            pass.set_bind_group(1, group, &[]);
        }
        pass.set_stencil_reference(self.fixed.stencil_reference);

        if let Some(id) = call.vertex_array {
            let va = self
                .vertex_arrays
                .get(&id)
                .ok_or(BackendError::UnknownResource { kind: "vertex array", id })?;
            for (slot, attribute) in va.attributes.iter().enumerate() {
                let buffer = self
                    .buffers
                    .get(&attribute.buffer)
                    .ok_or(BackendError::UnknownResource { kind: "buffer", id: attribute.buffer })?;
                pass.set_vertex_buffer(slot as u32, buffer.slice(attribute.offset as u64..));
            }
            if let (Some(count), Some(indices)) = (call.index_count, va.indices) {
                let buffer = self
                    .buffers
                    .get(&indices.buffer)
                    .ok_or(BackendError::UnknownResource { kind: "buffer", id: indices.buffer })?;
                pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..count, 0, 0..call.instances);
                return Ok(());
            }
        }
        pass.draw(0..call.vertex_count, 0..call.instances);
        Ok(())
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        if self.frame.is_some() {
            warn!("begin_frame called with a frame in flight; submitting it first");
            self.end_frame()?;
        }
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strandfx frame"),
            });
        self.frame = Some(Frame { encoder, pass: None });
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.pending_clear.is_some() {
            self.ensure_pass()?;
        }
        self.end_pass();
        let frame = self.frame.take().ok_or(BackendError::NoFrame)?;
        if !self.ring_data.is_empty() {
            self.queue.write_buffer(&self.uniform_ring, 0, &self.ring_data);
            self.ring_data.clear();
        }
        self.queue.submit(Some(frame.encoder.finish()));
        Ok(())
    }

    fn backbuffer_size(&self) -> (u32, u32) {
        self.backbuffer_size
    }

    fn resize_backbuffer(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if self.target == RenderTarget::Backbuffer {
            self.end_pass();
        }
        let (texture, view) = create_backbuffer(&self.device, width, height);
        self.backbuffer.destroy();
        self.backbuffer = texture;
        self.backbuffer_view = view;
        self.backbuffer_size = (width.max(1), height.max(1));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{TextureFormat, next_resource_id};

    const VS: &str = "@vertex fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4f {
        let p = vec2f(f32((i << 1u) & 2u), f32(i & 2u));
        return vec4f(p * 2.0 - 1.0, 0.0, 1.0);
    }";
    const FS: &str = "struct U { color: vec4f }
        @group(0) @binding(0) var<uniform> u: U;
        @fragment fn fs_main() -> @location(0) vec4f { return u.color; }";

    fn backend() -> Option<WgpuBackend> {
        WgpuBackend::headless(32, 32).ok()
    }

    #[test]
    fn test_compile_error_reports_line() {
        let Some(mut backend) = backend() else {
            return;
        };
        let source = ProgramSource::new("broken", VS, "@fragment\nfn fs_main() -> @location(0) vec4f {\n  return nope;\n}");
        let result = backend
            .compile_program(next_resource_id(), &source, &ProgramInterface::default())
            .unwrap();
        let failure = result.unwrap_err();
        assert_eq!(failure.stage, ShaderStage::Fragment);
        assert!(failure.diagnostics.iter().any(|d| d.line == Some(3)));
    }

    #[test]
    fn test_fullscreen_draw_into_framebuffer() {
        let Some(mut backend) = backend() else {
            return;
        };
        let interface = ProgramInterface::reflect(VS, FS).unwrap();
        let program = next_resource_id();
        backend
            .compile_program(program, &ProgramSource::new("fill", VS, FS), &interface)
            .unwrap()
            .unwrap();

        let color = next_resource_id();
        let desc = TextureDesc::new_2d("color", 32, 32, TextureFormat::Rgba16F);
        backend.create_texture(color, &desc).unwrap();
        let fbo = next_resource_id();
        let status = backend
            .create_framebuffer(
                fbo,
                &[FramebufferAttachment {
                    point: AttachmentPoint::Color(0),
                    texture: color,
                    format: TextureFormat::Rgba16F,
                    width: 32,
                    height: 32,
                    kind: TextureKind::D2,
                    mip_level: 0,
                    layer: 0,
                }],
            )
            .unwrap();
        assert_eq!(status, FramebufferStatus::Complete);

        backend.begin_frame().unwrap();
        backend.bind_render_target(RenderTarget::Framebuffer(fbo)).unwrap();
        backend.clear(ClearRequest::color([0.0, 0.0, 0.0, 1.0])).unwrap();
        backend.use_program(program).unwrap();
        backend.set_uniform(program, 0, bytemuck::cast_slice(&[1.0f32, 0.5, 0.25, 1.0])).unwrap();
        let draw = DrawCall {
            vertex_array: None,
            index_count: None,
            vertex_count: 3,
            instances: 1,
        };
        backend.draw(&draw).unwrap();
        backend.draw(&draw).unwrap();
        backend.end_frame().unwrap();
        assert_eq!(backend.pipeline_count(), 1);
    }
}
