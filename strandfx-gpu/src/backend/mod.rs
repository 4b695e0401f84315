//! The driver seam.
//!
//! [`GpuBackend`] is an immediate-mode, state-machine style interface: capabilities
//! are toggled, textures are bound to numbered units, and draws consume whatever
//! state is current. Everything above this trait (state cache, binding table,
//! passes) is backend-agnostic.

pub mod recording;
pub mod wgpu_backend;

pub use recording::{GpuCall, RecordingBackend};
pub use wgpu_backend::WgpuBackend;

use crate::reflect::ProgramInterface;
use crate::resource::{
    BufferKind, CompileFailure, FramebufferAttachment, FramebufferStatus, ProgramSource,
    ResourceId, TextureDesc, TextureOptions, VertexArrayDesc,
};
use crate::state::{ColorMask, CompareFunc, CullFace, StencilOps};

/// Hardware limits reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_texture_units: u32,
    pub max_texture_size: u32,
    pub max_3d_texture_size: u32,
    pub max_array_layers: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_texture_size: 8192,
            max_3d_texture_size: 2048,
            max_array_layers: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    StencilTest,
    CullFace,
    Dither,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilFace {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Backbuffer,
    Framebuffer(ResourceId),
}

/// Pixel rectangle with a bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Which buffers of the current target to clear, and to what.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearRequest {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl ClearRequest {
    pub fn all(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
            stencil: Some(0),
        }
    }

    pub fn depth_only() -> Self {
        Self {
            color: None,
            depth: Some(1.0),
            stencil: None,
        }
    }

    pub fn color(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: None,
            stencil: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub vertex_array: Option<ResourceId>,
    /// `Some` draws indexed using the vertex array's index buffer.
    pub index_count: Option<u32>,
    pub vertex_count: u32,
    pub instances: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend has no {kind} with id {id}")]
    UnknownResource { kind: &'static str, id: ResourceId },

    #[error("Upload of {actual} bytes does not match the expected {expected}")]
    UploadSize { expected: usize, actual: usize },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Uniform ring exhausted ({0} bytes per frame)")]
    UniformRingFull(u64),

    #[error("Draw issued without a program in use")]
    NoProgram,

    #[error("No frame in flight; call begin_frame first")]
    NoFrame,

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Request Adapter Error: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),

    #[error("Request Device Error: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// The set of driver calls the renderer issues.
pub trait GpuBackend {
    fn limits(&self) -> &DeviceLimits;

    fn create_texture(&mut self, id: ResourceId, desc: &TextureDesc) -> BackendResult<()>;
    fn write_texture(&mut self, id: ResourceId, level: u32, data: &[u8]) -> BackendResult<()>;
    fn set_sampling(&mut self, id: ResourceId, options: &TextureOptions) -> BackendResult<()>;
    fn destroy_texture(&mut self, id: ResourceId);

    fn create_framebuffer(
        &mut self,
        id: ResourceId,
        attachments: &[FramebufferAttachment],
    ) -> BackendResult<FramebufferStatus>;
    fn destroy_framebuffer(&mut self, id: ResourceId);

    fn create_buffer(&mut self, id: ResourceId, kind: BufferKind, data: &[u8]) -> BackendResult<()>;
    fn destroy_buffer(&mut self, id: ResourceId);
    fn create_vertex_array(&mut self, id: ResourceId, desc: &VertexArrayDesc) -> BackendResult<()>;
    fn destroy_vertex_array(&mut self, id: ResourceId);

    /// Compile and link both stages. `Err` carries the failing stage's diagnostics.
    fn compile_program(
        &mut self,
        id: ResourceId,
        source: &ProgramSource,
        interface: &ProgramInterface,
    ) -> BackendResult<Result<(), CompileFailure>>;
    fn destroy_program(&mut self, id: ResourceId);

    fn set_capability(&mut self, capability: Capability, enabled: bool);
    fn depth_func(&mut self, func: CompareFunc);
    fn depth_mask(&mut self, write: bool);
    fn stencil_func(&mut self, face: StencilFace, func: CompareFunc, reference: u32, mask: u32);
    fn stencil_op(&mut self, face: StencilFace, ops: StencilOps);
    fn stencil_mask(&mut self, mask: u32);
    fn cull_face(&mut self, face: CullFace);
    fn color_mask(&mut self, mask: ColorMask);

    fn bind_texture(&mut self, unit: u32, texture: ResourceId) -> BackendResult<()>;
    fn bind_render_target(&mut self, target: RenderTarget) -> BackendResult<()>;
    fn viewport(&mut self, viewport: Viewport);
    fn clear(&mut self, request: ClearRequest) -> BackendResult<()>;

    fn use_program(&mut self, program: ResourceId) -> BackendResult<()>;
    /// Copy `data` into the current uniform block of `program` at `offset`.
    fn set_uniform(&mut self, program: ResourceId, offset: u32, data: &[u8]) -> BackendResult<()>;
    /// Point the texture declared at `binding` at texture unit `unit`.
    fn set_texture_unit(&mut self, program: ResourceId, binding: u32, unit: u32) -> BackendResult<()>;
    fn draw(&mut self, call: &DrawCall) -> BackendResult<()>;

    fn begin_frame(&mut self) -> BackendResult<()>;
    fn end_frame(&mut self) -> BackendResult<()>;
    fn backbuffer_size(&self) -> (u32, u32);
    fn resize_backbuffer(&mut self, width: u32, height: u32) -> BackendResult<()>;
}
