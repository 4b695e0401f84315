//! The rendering device: a backend plus the device-lifetime caches in front of it.
//!
//! All resource creation and destruction goes through [`Device`], so the
//! binding table never holds a destroyed texture and every wrapper's validity
//! flag matches what the backend knows.

use bytemuck::Pod;
use tracing::{debug, error, trace, warn};

use crate::backend::{
    BackendError, ClearRequest, DeviceLimits, DrawCall, GpuBackend, RenderTarget, Viewport,
};
use crate::binding::{BindingError, TextureBindingTable};
use crate::reflect::ProgramInterface;
use crate::resource::{
    Buffer, BufferKind, Framebuffer, FramebufferError, FramebufferStatus, GpuResource,
    ProgramSource, ResourceError, ResourceId, ShaderError, ShaderProgram, Texture, TextureDesc,
    TextureKind, TextureOptions, VertexArray, VertexArrayBuildError, VertexArrayBuilder,
    format_diagnostics,
};
use crate::state::{DrawState, DrawStateCache};
use crate::uniforms::{ShaderParams, UniformSet, Validation};

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("Cannot upload pixel data into depth texture '{0}'")]
    DepthUpload(String),

    #[error("Texture '{label}' has {levels} mip levels, level {level} requested")]
    InvalidLevel { label: String, level: u32, levels: u32 },

    #[error("Texture '{label}' level {level} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        label: String,
        level: u32,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Owns the backend, the draw-state cache and the texture binding table.
pub struct Device<B: GpuBackend> {
    backend: B,
    state: DrawStateCache,
    bindings: TextureBindingTable,
    current_program: Option<ResourceId>,
}

impl<B: GpuBackend> Device<B> {
    /// Wraps `backend` and forces the default draw state onto it.
    pub fn new(mut backend: B) -> Self {
        let limits = *backend.limits();
        let mut state = DrawStateCache::new();
        state.apply_forced(&mut backend, &DrawState::default());
        debug!(
            texture_units = limits.max_texture_units,
            max_texture_size = limits.max_texture_size,
            "Device created"
        );
        Self {
            backend,
            state,
            bindings: TextureBindingTable::new(limits.max_texture_units),
            current_program: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn limits(&self) -> &DeviceLimits {
        self.backend.limits()
    }

    pub fn bindings(&self) -> &TextureBindingTable {
        &self.bindings
    }

    pub fn state_cache(&self) -> &DrawStateCache {
        &self.state
    }

    fn warn_on_limits(&self, desc: &TextureDesc) {
        let limits = self.backend.limits();
        let max = match desc.kind {
            TextureKind::D3 => limits.max_3d_texture_size,
            _ => limits.max_texture_size,
        };
        if desc.width > max || desc.height > max {
            warn!(
                texture = %desc.label,
                width = desc.width,
                height = desc.height,
                max,
                "Texture exceeds the maximum texture size"
            );
        }
        match desc.kind {
            TextureKind::D3 if desc.depth > max => {
                warn!(texture = %desc.label, depth = desc.depth, max, "3D texture too deep");
            }
            TextureKind::D2Array if desc.depth > limits.max_array_layers => {
                warn!(
                    texture = %desc.label,
                    layers = desc.depth,
                    max = limits.max_array_layers,
                    "Texture array has too many layers"
                );
            }
            _ => {}
        }
    }

    pub fn create_texture(&mut self, desc: TextureDesc) -> Result<Texture, BackendError> {
        self.warn_on_limits(&desc);
        let texture = Texture::new(desc);
        self.backend.create_texture(texture.id(), texture.desc())?;
        trace!(%texture, "created");
        Ok(texture)
    }

    /// Create a texture and fill its base level.
    pub fn create_texture_with_data(
        &mut self,
        desc: TextureDesc,
        data: &[u8],
    ) -> Result<Texture, TextureError> {
        let mut texture = self.create_texture(desc)?;
        if let Err(err) = self.write_texture(&texture, 0, data) {
            self.destroy_texture(&mut texture)?;
            return Err(err);
        }
        Ok(texture)
    }

    pub fn write_texture(
        &mut self,
        texture: &Texture,
        level: u32,
        data: &[u8],
    ) -> Result<(), TextureError> {
        texture.ensure_valid()?;
        if texture.is_depth() {
            return Err(TextureError::DepthUpload(texture.label().to_string()));
        }
        let desc = texture.desc();
        if level >= desc.mip_levels {
            return Err(TextureError::InvalidLevel {
                label: desc.label.clone(),
                level,
                levels: desc.mip_levels,
            });
        }
        let expected = desc.level_byte_size(level);
        if data.len() != expected {
            return Err(TextureError::SizeMismatch {
                label: desc.label.clone(),
                level,
                expected,
                actual: data.len(),
            });
        }
        self.bindings.bind_single(&mut self.backend, texture)?;
        self.backend.write_texture(texture.id(), level, data)?;
        Ok(())
    }

    /// Typed variant of [`Device::write_texture`] for texel slices.
    pub fn write_texels<T: Pod>(
        &mut self,
        texture: &Texture,
        level: u32,
        texels: &[T],
    ) -> Result<(), TextureError> {
        self.write_texture(texture, level, bytemuck::cast_slice(texels))
    }

    pub fn set_texture_options(
        &mut self,
        texture: &mut Texture,
        options: TextureOptions,
    ) -> Result<(), TextureError> {
        texture.ensure_valid()?;
        texture.set_options(options);
        self.bindings.bind_single(&mut self.backend, texture)?;
        self.backend.set_sampling(texture.id(), texture.options())?;
        Ok(())
    }

    pub fn destroy_texture(&mut self, texture: &mut Texture) -> Result<(), ResourceError> {
        texture.ensure_valid()?;
        self.bindings.forget(texture.id());
        self.backend.destroy_texture(texture.id());
        texture.lifetime.invalidate();
        trace!(texture = %texture.id(), "destroyed");
        Ok(())
    }

    /// Build a framebuffer over `textures`. Depth formats become the depth
    /// attachment, the rest are color attachments in order.
    pub fn create_framebuffer(
        &mut self,
        label: &str,
        textures: &[&Texture],
    ) -> Result<Framebuffer, FramebufferError> {
        let attachments = Framebuffer::plan(label, textures)?;
        let framebuffer = Framebuffer::new(label, attachments);
        let status = self
            .backend
            .create_framebuffer(framebuffer.id(), framebuffer.attachments())?;
        match status {
            FramebufferStatus::Complete => {
                debug!(
                    framebuffer = label,
                    colors = framebuffer.color_attachment_count(),
                    depth = framebuffer.depth_attachment().is_some(),
                    "Framebuffer created"
                );
                Ok(framebuffer)
            }
            FramebufferStatus::IncompleteAttachment(reason) => {
                self.backend.destroy_framebuffer(framebuffer.id());
                Err(FramebufferError::Incomplete {
                    label: label.to_string(),
                    reason,
                })
            }
            FramebufferStatus::Unsupported(reason) => {
                self.backend.destroy_framebuffer(framebuffer.id());
                Err(FramebufferError::Unsupported {
                    label: label.to_string(),
                    reason,
                })
            }
        }
    }

    pub fn destroy_framebuffer(&mut self, framebuffer: &mut Framebuffer) -> Result<(), ResourceError> {
        framebuffer.ensure_valid()?;
        self.backend.destroy_framebuffer(framebuffer.id());
        framebuffer.lifetime.invalidate();
        Ok(())
    }

    pub fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<Buffer, BackendError> {
        let buffer = Buffer::new(kind, data.len());
        self.backend.create_buffer(buffer.id(), kind, data)?;
        Ok(buffer)
    }

    pub fn create_buffer_from<T: Pod>(
        &mut self,
        kind: BufferKind,
        data: &[T],
    ) -> Result<Buffer, BackendError> {
        self.create_buffer(kind, bytemuck::cast_slice(data))
    }

    pub fn destroy_buffer(&mut self, buffer: &mut Buffer) -> Result<(), ResourceError> {
        buffer.ensure_valid()?;
        self.backend.destroy_buffer(buffer.id());
        buffer.lifetime.invalidate();
        Ok(())
    }

    pub fn create_vertex_array(
        &mut self,
        builder: VertexArrayBuilder,
    ) -> Result<VertexArray, VertexArrayBuildError> {
        let (desc, buffers) = builder.build()?;
        let vertex_array = VertexArray::new(desc, buffers);
        self.backend
            .create_vertex_array(vertex_array.id(), vertex_array.desc())?;
        Ok(vertex_array)
    }

    /// Destroy the array and every buffer it owns.
    pub fn destroy_vertex_array(&mut self, vertex_array: &mut VertexArray) -> Result<(), ResourceError> {
        vertex_array.ensure_valid()?;
        self.backend.destroy_vertex_array(vertex_array.id());
        for buffer in &mut vertex_array.buffers {
            if buffer.is_valid() {
                self.backend.destroy_buffer(buffer.id());
                buffer.lifetime.invalidate();
            }
        }
        vertex_array.lifetime.invalidate();
        Ok(())
    }

    /// Reflect, compile and link `source`. A failed compile logs the
    /// line-correlated diagnostics and leaves no program behind.
    pub fn create_program(&mut self, source: &ProgramSource) -> Result<ShaderProgram, ShaderError> {
        let interface = ProgramInterface::reflect(&source.vertex, &source.fragment).map_err(
            |err| ShaderError::Reflection {
                program: source.name.clone(),
                source: err,
            },
        )?;
        let program = ShaderProgram::new(&source.name, interface);
        match self
            .backend
            .compile_program(program.id(), source, program.interface())?
        {
            Ok(()) => {
                debug!(
                    program = %source.name,
                    uniforms = program.interface().uniforms.len(),
                    textures = program.interface().textures.len(),
                    "Program compiled"
                );
                Ok(program)
            }
            Err(failure) => {
                let log = format_diagnostics(source.stage(failure.stage), &failure.diagnostics);
                error!(program = %source.name, stage = %failure.stage, "Shader compilation failed:\n{log}");
                Err(ShaderError::Compile {
                    program: source.name.clone(),
                    stage: failure.stage,
                    log,
                })
            }
        }
    }

    pub fn destroy_program(&mut self, program: &mut ShaderProgram) -> Result<(), ResourceError> {
        program.ensure_valid()?;
        if self.current_program == Some(program.id()) {
            self.current_program = None;
        }
        self.backend.destroy_program(program.id());
        program.lifetime.invalidate();
        Ok(())
    }

    pub fn use_program(&mut self, program: &ShaderProgram) -> Result<(), ShaderError> {
        program.ensure_valid()?;
        if self.current_program != Some(program.id()) {
            self.backend.use_program(program.id())?;
            self.current_program = Some(program.id());
        }
        Ok(())
    }

    /// Apply `state`, issuing only the calls that differ from the active state.
    pub fn set_state(&mut self, state: &DrawState) {
        self.state.apply(&mut self.backend, state);
    }

    /// Make `program` current and upload `set` into it.
    ///
    /// Every name is checked against the program's reflected interface. Under
    /// [`Validation::Strict`] an unknown name is an error; under
    /// [`Validation::Lenient`] it is skipped.
    pub fn set_uniforms(
        &mut self,
        program: &ShaderProgram,
        set: &UniformSet<'_>,
        validation: Validation,
    ) -> Result<(), ShaderError> {
        self.use_program(program)?;
        let interface = program.interface();

        for (name, value) in set.values() {
            let Some(info) = interface.uniform(name) else {
                missing(program, name, validation)?;
                continue;
            };
            if !value.matches(info.ty) {
                return Err(ShaderError::TypeMismatch {
                    program: program.name().to_string(),
                    name: name.to_string(),
                    expected: info.ty,
                    actual: value.type_name(),
                });
            }
            self.backend
                .set_uniform(program.id(), info.offset, &value.encode())?;
        }

        let mut sampled: Vec<(u32, &Texture)> = Vec::new();
        for (name, texture) in set.textures() {
            match interface.texture(name) {
                Some(slot) => sampled.push((slot.binding, texture)),
                None if interface.uniform(name).is_some() => {
                    return Err(ShaderError::NotASampler {
                        program: program.name().to_string(),
                        name: name.to_string(),
                    });
                }
                None => missing(program, name, validation)?,
            }
        }
        if sampled.is_empty() {
            return Ok(());
        }

        let textures: Vec<&Texture> = sampled.iter().map(|(_, t)| *t).collect();
        let units = self.bindings.replace_textures(&mut self.backend, &textures)?;
        for (binding, texture) in sampled {
            let unit = units
                .get(&texture.id())
                .copied()
                .ok_or(BindingError::NoFreeSlot(texture.id()))?;
            self.backend.set_texture_unit(program.id(), binding, unit)?;
        }
        Ok(())
    }

    /// Strictly validated upload of a typed parameter record.
    pub fn set_params(
        &mut self,
        program: &ShaderProgram,
        params: &impl ShaderParams,
    ) -> Result<(), ShaderError> {
        self.set_uniforms(program, &params.to_set(), Validation::Strict)
    }

    /// Render into `framebuffer` with a viewport covering it.
    pub fn bind_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<(), FramebufferError> {
        framebuffer.ensure_valid()?;
        self.backend
            .bind_render_target(RenderTarget::Framebuffer(framebuffer.id()))?;
        let (width, height) = framebuffer.dimensions();
        self.backend.viewport(Viewport::full(width, height));
        Ok(())
    }

    pub fn set_backbuffer_as_render_target(&mut self) -> Result<(), BackendError> {
        self.backend.bind_render_target(RenderTarget::Backbuffer)?;
        let (width, height) = self.backend.backbuffer_size();
        self.backend.viewport(Viewport::full(width, height));
        Ok(())
    }

    pub fn viewport(&mut self, viewport: Viewport) {
        self.backend.viewport(viewport);
    }

    pub fn clear(&mut self, request: ClearRequest) -> Result<(), BackendError> {
        self.backend.clear(request)
    }

    /// Draw `vertex_array` with the current program, indexed when it has indices.
    pub fn draw_mesh(&mut self, vertex_array: &VertexArray, instances: u32) -> Result<(), ShaderError> {
        vertex_array.ensure_valid()?;
        self.backend.draw(&DrawCall {
            vertex_array: Some(vertex_array.id()),
            index_count: vertex_array.index_count(),
            vertex_count: vertex_array.vertex_count(),
            instances: instances.max(1),
        })?;
        Ok(())
    }

    /// One oversized triangle; the vertex shader derives positions from the
    /// vertex index.
    pub fn draw_fullscreen(&mut self) -> Result<(), BackendError> {
        self.backend.draw(&DrawCall {
            vertex_array: None,
            index_count: None,
            vertex_count: 3,
            instances: 1,
        })
    }

    pub fn begin_frame(&mut self) -> Result<(), BackendError> {
        self.backend.begin_frame()
    }

    pub fn end_frame(&mut self) -> Result<(), BackendError> {
        self.backend.end_frame()
    }

    pub fn backbuffer_size(&self) -> (u32, u32) {
        self.backend.backbuffer_size()
    }

    pub fn resize_backbuffer(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        self.backend.resize_backbuffer(width, height)
    }
}

fn missing(program: &ShaderProgram, name: &str, validation: Validation) -> Result<(), ShaderError> {
    match validation {
        Validation::Strict => Err(ShaderError::MissingUniform {
            program: program.name().to_string(),
            name: name.to_string(),
        }),
        Validation::Lenient => {
            trace!(program = program.name(), name, "skipping unknown uniform");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuCall, RecordingBackend};
    use crate::resource::{AttributeFormat, TextureFormat};
    use crate::state::CullMode;

    const VS: &str = r#"
        struct Uniforms {
            u_mvp: mat4x4f,
            u_exposure: f32,
        };
        @group(0) @binding(0) var<uniform> u: Uniforms;
        struct VertexInput {
            @location(0) position: vec3f,
        };
        @vertex
        fn vs_main(in: VertexInput) -> @builtin(position) vec4f {
            return u.u_mvp * vec4f(in.position, 1.0);
        }
    "#;

    const FS: &str = r#"
        @group(1) @binding(0) var u_color: texture_2d<f32>;
        @group(1) @binding(1) var u_colorSampler: sampler;
        @group(1) @binding(2) var u_depth: texture_depth_2d;
        @group(1) @binding(3) var u_depthSampler: sampler;
        @fragment
        fn fs_main() -> @location(0) vec4f { return vec4f(1.0); }
    "#;

    fn device() -> Device<RecordingBackend> {
        Device::new(RecordingBackend::new())
    }

    fn program(device: &mut Device<RecordingBackend>) -> ShaderProgram {
        device
            .create_program(&ProgramSource::new("test", VS, FS))
            .unwrap()
    }

    #[test]
    fn test_destroyed_texture_fails_fast() {
        let mut device = device();
        let mut texture = device
            .create_texture(TextureDesc::new_2d("t", 4, 4, TextureFormat::Rgba8))
            .unwrap();
        device.destroy_texture(&mut texture).unwrap();
        assert!(!texture.is_valid());
        assert!(matches!(
            device.write_texture(&texture, 0, &[0; 64]),
            Err(TextureError::Resource(_))
        ));
        assert!(device.destroy_texture(&mut texture).is_err());
        assert_eq!(device.backend().live_textures(), 0);
    }

    #[test]
    fn test_write_texture_rejects_depth_and_wrong_size() {
        let mut device = device();
        let depth = device
            .create_texture(TextureDesc::new_2d("d", 4, 4, TextureFormat::Depth16))
            .unwrap();
        assert!(matches!(
            device.write_texture(&depth, 0, &[0; 32]),
            Err(TextureError::DepthUpload(_))
        ));
        let color = device
            .create_texture(TextureDesc::new_2d("c", 2, 2, TextureFormat::Rgba32F))
            .unwrap();
        assert!(matches!(
            device.write_texels(&color, 0, &[0.0f32; 15]),
            Err(TextureError::SizeMismatch {
                expected: 64,
                actual: 60,
                ..
            })
        ));
        device.write_texels(&color, 0, &[0.0f32; 16]).unwrap();
        assert_eq!(device.bindings().bound(0), Some(color.id()));
    }

    #[test]
    fn test_oversized_texture_only_warns() {
        let mut device = device();
        let limit = device.limits().max_texture_size;
        let texture = device
            .create_texture(TextureDesc::new_2d("huge", limit + 1, 1, TextureFormat::R8))
            .unwrap();
        assert!(texture.is_valid());
    }

    #[test]
    fn test_framebuffer_over_destroyed_texture_fails() {
        let mut device = device();
        let mut color = device
            .create_texture(TextureDesc::new_2d("c", 8, 8, TextureFormat::Rgba16F))
            .unwrap();
        let depth = device
            .create_texture(TextureDesc::new_2d("d", 8, 8, TextureFormat::Depth24Stencil8))
            .unwrap();
        let framebuffer = device
            .create_framebuffer("fb", &[&depth, &color])
            .unwrap();
        assert_eq!(framebuffer.color_attachment_count(), 1);
        assert!(framebuffer.has_stencil());

        device.destroy_texture(&mut color).unwrap();
        assert!(matches!(
            device.create_framebuffer("fb2", &[&depth, &color]),
            Err(FramebufferError::Resource(_))
        ));
    }

    #[test]
    fn test_vertex_array_destroys_its_buffers() {
        let mut device = device();
        let positions = device
            .create_buffer_from(BufferKind::Vertex, &[0.0f32; 9])
            .unwrap();
        let indices = device
            .create_buffer_from(BufferKind::Index, &[0u32, 1, 2])
            .unwrap();
        let mut mesh = device
            .create_vertex_array(
                VertexArrayBuilder::new("tri")
                    .attribute(0, positions, AttributeFormat::Vec3)
                    .indices(indices, 3),
            )
            .unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        device.destroy_vertex_array(&mut mesh).unwrap();
        assert!(mesh.buffers().iter().all(|b| !b.is_valid()));
        let destroyed = device
            .backend()
            .calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::DestroyBuffer(_)))
            .count();
        assert_eq!(destroyed, 2);
    }

    #[test]
    fn test_compile_failure_leaves_no_program() {
        let mut device = Device::new(RecordingBackend::new().fail_compile_on("u_exposure"));
        let err = device
            .create_program(&ProgramSource::new("broken", VS, FS))
            .unwrap_err();
        match err {
            ShaderError::Compile { stage, log, .. } => {
                assert_eq!(stage, crate::resource::ShaderStage::Vertex);
                assert!(log.contains("> u_exposure: f32,"));
                assert!(log.contains("L4:"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(device.backend().live_programs(), 0);
    }

    #[test]
    fn test_strict_uniforms_reject_unknown_names() {
        let mut device = device();
        let program = program(&mut device);
        let mut set = UniformSet::new();
        set.set("u_exposure", 1.0f32).set("u_gamma", 2.2f32);
        assert!(matches!(
            device.set_uniforms(&program, &set, Validation::Strict),
            Err(ShaderError::MissingUniform { .. })
        ));
        device
            .set_uniforms(&program, &set, Validation::Lenient)
            .unwrap();

        let mut wrong = UniformSet::new();
        wrong.set("u_exposure", 1i32);
        assert!(matches!(
            device.set_uniforms(&program, &wrong, Validation::Lenient),
            Err(ShaderError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_uniform_textures_use_binding_table() {
        let mut device = device();
        let program = program(&mut device);
        let color = device
            .create_texture(TextureDesc::new_2d("c", 4, 4, TextureFormat::Rgba8))
            .unwrap();
        let depth = device
            .create_texture(TextureDesc::new_2d("d", 4, 4, TextureFormat::Depth16))
            .unwrap();
        let mut set = UniformSet::new();
        set.texture("u_color", &color).texture("u_depth", &depth);
        device.backend_mut().clear_calls();
        device
            .set_uniforms(&program, &set, Validation::Strict)
            .unwrap();

        let calls = device.backend_mut().take_calls();
        let binds = calls
            .iter()
            .filter(|c| matches!(c, GpuCall::BindTexture { .. }))
            .count();
        assert_eq!(binds, 2);
        assert!(calls.contains(&GpuCall::SetTextureUnit {
            program: program.id(),
            binding: 2,
            unit: device.bindings().slot_of(depth.id()).unwrap(),
        }));

        device
            .set_uniforms(&program, &set, Validation::Strict)
            .unwrap();
        let rebinds = device
            .backend()
            .calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::BindTexture { .. }))
            .count();
        assert_eq!(rebinds, 0);

        let mut not_sampler = UniformSet::new();
        not_sampler.texture("u_exposure", &color);
        assert!(matches!(
            device.set_uniforms(&program, &not_sampler, Validation::Strict),
            Err(ShaderError::NotASampler { .. })
        ));
    }

    #[test]
    fn test_set_state_skips_redundant_calls() {
        let mut device = device();
        device.backend_mut().clear_calls();
        device.set_state(&DrawState::default());
        assert!(device.backend().calls().is_empty());
        device.set_state(&DrawState::default().with_culling(CullMode::None));
        assert!(!device.backend().calls().is_empty());
    }

    #[test]
    fn test_draw_mesh_needs_program_and_frame() {
        let mut device = device();
        let indices = device
            .create_buffer_from(BufferKind::Index, &[0u32, 1, 2, 2, 1, 3])
            .unwrap();
        let ribbon = device
            .create_vertex_array(VertexArrayBuilder::new("ribbon").indices(indices, 6))
            .unwrap();
        device.begin_frame().unwrap();
        assert!(device.draw_mesh(&ribbon, 1).is_err());
        let program = program(&mut device);
        device.use_program(&program).unwrap();
        device.draw_mesh(&ribbon, 4).unwrap();
        assert!(device.backend().calls().contains(&GpuCall::Draw(DrawCall {
            vertex_array: Some(ribbon.id()),
            index_count: Some(6),
            vertex_count: 0,
            instances: 4,
        })));
        device.end_frame().unwrap();
    }
}
