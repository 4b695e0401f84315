//! A backend that records calls instead of talking to a GPU.
//!
//! Used for headless runs and for every GPU-free test: it tracks which
//! resources exist so invalid ids are still caught, and keeps an ordered log of
//! [`GpuCall`]s that tests assert against.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::{
    BackendError, BackendResult, Capability, ClearRequest, DeviceLimits, DrawCall, GpuBackend,
    RenderTarget, StencilFace, Viewport,
};
use crate::reflect::ProgramInterface;
use crate::resource::{
    BufferKind, CompileFailure, Diagnostic, FramebufferAttachment, FramebufferStatus,
    ProgramSource, ResourceId, ShaderStage, TextureDesc, TextureOptions, VertexArrayDesc,
};
use crate::state::{ColorMask, CompareFunc, CullFace, StencilOps};

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateTexture(ResourceId, TextureDesc),
    WriteTexture { id: ResourceId, level: u32, bytes: usize },
    SetSampling(ResourceId, TextureOptions),
    DestroyTexture(ResourceId),
    CreateFramebuffer(ResourceId, Vec<ResourceId>),
    DestroyFramebuffer(ResourceId),
    CreateBuffer(ResourceId, BufferKind, usize),
    DestroyBuffer(ResourceId),
    CreateVertexArray(ResourceId),
    DestroyVertexArray(ResourceId),
    CompileProgram(ResourceId, String),
    DestroyProgram(ResourceId),
    SetCapability(Capability, bool),
    DepthFunc(CompareFunc),
    DepthMask(bool),
    StencilFunc(StencilFace, CompareFunc, u32, u32),
    StencilOp(StencilFace, StencilOps),
    StencilMask(u32),
    CullFace(CullFace),
    ColorMask(ColorMask),
    BindTexture { unit: u32, texture: ResourceId },
    BindRenderTarget(RenderTarget),
    Viewport(Viewport),
    Clear(ClearRequest),
    UseProgram(ResourceId),
    SetUniform { program: ResourceId, offset: u32, bytes: usize },
    SetTextureUnit { program: ResourceId, binding: u32, unit: u32 },
    Draw(DrawCall),
    BeginFrame,
    EndFrame,
    ResizeBackbuffer(u32, u32),
}

impl GpuCall {
    /// Fixed-function state calls, as issued by the draw-state cache.
    pub fn is_state_call(&self) -> bool {
        matches!(
            self,
            GpuCall::SetCapability(..)
                | GpuCall::DepthFunc(_)
                | GpuCall::DepthMask(_)
                | GpuCall::StencilFunc(..)
                | GpuCall::StencilOp(..)
                | GpuCall::StencilMask(_)
                | GpuCall::CullFace(_)
                | GpuCall::ColorMask(_)
        )
    }
}

#[derive(Debug)]
pub struct RecordingBackend {
    limits: DeviceLimits,
    calls: Vec<GpuCall>,
    textures: HashMap<ResourceId, TextureDesc>,
    framebuffers: HashSet<ResourceId>,
    buffers: HashSet<ResourceId>,
    vertex_arrays: HashSet<ResourceId>,
    programs: HashSet<ResourceId>,
    current_program: Option<ResourceId>,
    in_frame: bool,
    backbuffer: (u32, u32),
    fail_compile_on: Option<String>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::with_limits(DeviceLimits::default())
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            calls: Vec::new(),
            textures: HashMap::new(),
            framebuffers: HashSet::new(),
            buffers: HashSet::new(),
            vertex_arrays: HashSet::new(),
            programs: HashSet::new(),
            current_program: None,
            in_frame: false,
            backbuffer: (1280, 720),
            fail_compile_on: None,
        }
    }

    pub fn with_backbuffer(mut self, width: u32, height: u32) -> Self {
        self.backbuffer = (width, height);
        self
    }

    /// Make compilation fail on any source line containing `needle`.
    pub fn fail_compile_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_compile_on = Some(needle.into());
        self
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn record(&mut self, call: GpuCall) {
        trace!(?call, "gpu call");
        self.calls.push(call);
    }

    fn check_diagnostics(&self, stage: ShaderStage, source: &str) -> Result<(), CompileFailure> {
        if source.trim().is_empty() {
            return Err(CompileFailure {
                stage,
                diagnostics: vec![Diagnostic {
                    line: None,
                    message: "empty shader stage".into(),
                }],
            });
        }
        if let Some(needle) = &self.fail_compile_on {
            let diagnostics: Vec<Diagnostic> = source
                .lines()
                .enumerate()
                .filter(|(_, line)| line.contains(needle.as_str()))
                .map(|(i, _)| Diagnostic {
                    line: Some(i as u32 + 1),
                    message: format!("rejected token '{needle}'"),
                })
                .collect();
            if !diagnostics.is_empty() {
                return Err(CompileFailure { stage, diagnostics });
            }
        }
        Ok(())
    }
}

fn unknown(kind: &'static str, id: ResourceId) -> BackendError {
    BackendError::UnknownResource { kind, id }
}

impl GpuBackend for RecordingBackend {
    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn create_texture(&mut self, id: ResourceId, desc: &TextureDesc) -> BackendResult<()> {
        self.textures.insert(id, desc.clone());
        self.record(GpuCall::CreateTexture(id, desc.clone()));
        Ok(())
    }

    fn write_texture(&mut self, id: ResourceId, level: u32, data: &[u8]) -> BackendResult<()> {
        let desc = self.textures.get(&id).ok_or_else(|| unknown("texture", id))?;
        let expected = desc.level_byte_size(level);
        if data.len() != expected {
            return Err(BackendError::UploadSize {
                expected,
                actual: data.len(),
            });
        }
        self.record(GpuCall::WriteTexture {
            id,
            level,
            bytes: data.len(),
        });
        Ok(())
    }

    fn set_sampling(&mut self, id: ResourceId, options: &TextureOptions) -> BackendResult<()> {
        let desc = self.textures.get_mut(&id).ok_or_else(|| unknown("texture", id))?;
        desc.options = *options;
        self.record(GpuCall::SetSampling(id, *options));
        Ok(())
    }

    fn destroy_texture(&mut self, id: ResourceId) {
        self.textures.remove(&id);
        self.record(GpuCall::DestroyTexture(id));
    }

    fn create_framebuffer(
        &mut self,
        id: ResourceId,
        attachments: &[FramebufferAttachment],
    ) -> BackendResult<FramebufferStatus> {
        if let Some(missing) = attachments.iter().find(|a| !self.textures.contains_key(&a.texture)) {
            return Ok(FramebufferStatus::IncompleteAttachment(format!(
                "attachment {:?} refers to missing texture {}",
                missing.point, missing.texture
            )));
        }
        self.framebuffers.insert(id);
        self.record(GpuCall::CreateFramebuffer(
            id,
            attachments.iter().map(|a| a.texture).collect(),
        ));
        Ok(FramebufferStatus::Complete)
    }

    fn destroy_framebuffer(&mut self, id: ResourceId) {
        self.framebuffers.remove(&id);
        self.record(GpuCall::DestroyFramebuffer(id));
    }

    fn create_buffer(&mut self, id: ResourceId, kind: BufferKind, data: &[u8]) -> BackendResult<()> {
        self.buffers.insert(id);
        self.record(GpuCall::CreateBuffer(id, kind, data.len()));
        Ok(())
    }

    fn destroy_buffer(&mut self, id: ResourceId) {
        self.buffers.remove(&id);
        self.record(GpuCall::DestroyBuffer(id));
    }

    fn create_vertex_array(&mut self, id: ResourceId, desc: &VertexArrayDesc) -> BackendResult<()> {
        for attribute in &desc.attributes {
            if !self.buffers.contains(&attribute.buffer) {
                return Err(unknown("buffer", attribute.buffer));
            }
        }
        if let Some(indices) = &desc.indices {
            if !self.buffers.contains(&indices.buffer) {
                return Err(unknown("buffer", indices.buffer));
            }
        }
        self.vertex_arrays.insert(id);
        self.record(GpuCall::CreateVertexArray(id));
        Ok(())
    }

    fn destroy_vertex_array(&mut self, id: ResourceId) {
        self.vertex_arrays.remove(&id);
        self.record(GpuCall::DestroyVertexArray(id));
    }

    fn compile_program(
        &mut self,
        id: ResourceId,
        source: &ProgramSource,
        _interface: &ProgramInterface,
    ) -> BackendResult<Result<(), CompileFailure>> {
        self.record(GpuCall::CompileProgram(id, source.name.clone()));
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if let Err(failure) = self.check_diagnostics(stage, source.stage(stage)) {
                return Ok(Err(failure));
            }
        }
        self.programs.insert(id);
        Ok(Ok(()))
    }

    fn destroy_program(&mut self, id: ResourceId) {
        self.programs.remove(&id);
        if self.current_program == Some(id) {
            self.current_program = None;
        }
        self.record(GpuCall::DestroyProgram(id));
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.record(GpuCall::SetCapability(capability, enabled));
    }

    fn depth_func(&mut self, func: CompareFunc) {
        self.record(GpuCall::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GpuCall::DepthMask(write));
    }

    fn stencil_func(&mut self, face: StencilFace, func: CompareFunc, reference: u32, mask: u32) {
        self.record(GpuCall::StencilFunc(face, func, reference, mask));
    }

    fn stencil_op(&mut self, face: StencilFace, ops: StencilOps) {
        self.record(GpuCall::StencilOp(face, ops));
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.record(GpuCall::StencilMask(mask));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.record(GpuCall::CullFace(face));
    }

    fn color_mask(&mut self, mask: ColorMask) {
        self.record(GpuCall::ColorMask(mask));
    }

    fn bind_texture(&mut self, unit: u32, texture: ResourceId) -> BackendResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(unknown("texture", texture));
        }
        if unit >= self.limits.max_texture_units {
            return Err(BackendError::Unsupported(format!(
                "texture unit {unit} exceeds {} units",
                self.limits.max_texture_units
            )));
        }
        self.record(GpuCall::BindTexture { unit, texture });
        Ok(())
    }

    fn bind_render_target(&mut self, target: RenderTarget) -> BackendResult<()> {
        if let RenderTarget::Framebuffer(id) = target {
            if !self.framebuffers.contains(&id) {
                return Err(unknown("framebuffer", id));
            }
        }
        self.record(GpuCall::BindRenderTarget(target));
        Ok(())
    }

    fn viewport(&mut self, viewport: Viewport) {
        self.record(GpuCall::Viewport(viewport));
    }

    fn clear(&mut self, request: ClearRequest) -> BackendResult<()> {
        if !self.in_frame {
            return Err(BackendError::NoFrame);
        }
        self.record(GpuCall::Clear(request));
        Ok(())
    }

    fn use_program(&mut self, program: ResourceId) -> BackendResult<()> {
        if !self.programs.contains(&program) {
            return Err(unknown("program", program));
        }
        self.current_program = Some(program);
        self.record(GpuCall::UseProgram(program));
        Ok(())
    }

    fn set_uniform(&mut self, program: ResourceId, offset: u32, data: &[u8]) -> BackendResult<()> {
        if !self.programs.contains(&program) {
            return Err(unknown("program", program));
        }
        self.record(GpuCall::SetUniform {
            program,
            offset,
            bytes: data.len(),
        });
        Ok(())
    }

    fn set_texture_unit(&mut self, program: ResourceId, binding: u32, unit: u32) -> BackendResult<()> {
        if !self.programs.contains(&program) {
            return Err(unknown("program", program));
        }
        self.record(GpuCall::SetTextureUnit {
            program,
            binding,
            unit,
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> BackendResult<()> {
        if !self.in_frame {
            return Err(BackendError::NoFrame);
        }
        if self.current_program.is_none() {
            return Err(BackendError::NoProgram);
        }
        if let Some(id) = call.vertex_array {
            if !self.vertex_arrays.contains(&id) {
                return Err(unknown("vertex array", id));
            }
        }
        self.record(GpuCall::Draw(*call));
        Ok(())
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.in_frame = true;
        self.record(GpuCall::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if !self.in_frame {
            return Err(BackendError::NoFrame);
        }
        self.in_frame = false;
        self.record(GpuCall::EndFrame);
        Ok(())
    }

    fn backbuffer_size(&self) -> (u32, u32) {
        self.backbuffer
    }

    fn resize_backbuffer(&mut self, width: u32, height: u32) -> BackendResult<()> {
        self.backbuffer = (width.max(1), height.max(1));
        self.record(GpuCall::ResizeBackbuffer(width, height));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{TextureFormat, next_resource_id};

    #[test]
    fn test_write_texture_checks_size() {
        let mut backend = RecordingBackend::new();
        let id = next_resource_id();
        backend
            .create_texture(id, &TextureDesc::new_2d("t", 4, 4, TextureFormat::Rgba8))
            .unwrap();
        assert!(backend.write_texture(id, 0, &[0; 64]).is_ok());
        assert!(matches!(
            backend.write_texture(id, 0, &[0; 63]),
            Err(BackendError::UploadSize {
                expected: 64,
                actual: 63
            })
        ));
        assert!(backend.write_texture(next_resource_id(), 0, &[]).is_err());
    }

    #[test]
    fn test_compile_fails_on_needle() {
        let mut backend = RecordingBackend::new().fail_compile_on("oops");
        let source = ProgramSource::new("p", "fn vs_main() {}", "fn fs_main() {}\noops\n");
        let result = backend
            .compile_program(next_resource_id(), &source, &ProgramInterface::default())
            .unwrap();
        let failure = result.unwrap_err();
        assert_eq!(failure.stage, ShaderStage::Fragment);
        assert_eq!(failure.diagnostics[0].line, Some(2));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_draw_requires_frame_and_program() {
        let mut backend = RecordingBackend::new();
        let call = DrawCall {
            vertex_array: None,
            index_count: None,
            vertex_count: 3,
            instances: 1,
        };
        assert!(matches!(backend.draw(&call), Err(BackendError::NoFrame)));
        backend.begin_frame().unwrap();
        assert!(matches!(backend.draw(&call), Err(BackendError::NoProgram)));
    }

    #[test]
    fn test_state_call_classification() {
        assert!(GpuCall::DepthMask(true).is_state_call());
        assert!(!GpuCall::BeginFrame.is_state_call());
    }
}
