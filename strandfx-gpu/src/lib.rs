//! Real-time hair and skin rendering core.
//!
//! A [`Renderer`] drives a fixed sequence of passes (shadows, forward skin,
//! hair, linear depth, SSAO, subsurface blur, tone mapping, final) over the
//! entities of a [`World`](strandfx_data::World). GPU work goes through a
//! [`GpuBackend`]; [`WgpuBackend`] renders for real and [`RecordingBackend`]
//! records calls for tests and headless runs.

pub mod backend;
pub mod binding;
pub mod camera;
pub mod config;
pub mod device;
pub mod frame_graph;
pub mod frame_resources;
pub mod logging;
pub mod math;
pub mod passes;
pub mod reflect;
pub mod renderer;
pub mod resource;
pub mod scene;
pub mod shaders;
pub mod state;
pub mod uniforms;

pub use backend::{
    BackendError, ClearRequest, DeviceLimits, GpuBackend, GpuCall, RecordingBackend, Viewport,
    WgpuBackend,
};
pub use binding::{BindingError, TextureBindingTable};
pub use camera::{Camera, CameraSettings, FrameCamera};
pub use config::{Config, ConfigError};
pub use device::{Device, TextureError};
pub use frame_graph::{
    ExecutableFrameGraph, FrameGraph, FrameGraphError, GraphResource, Pass, PassBuilder,
    PassContext,
};
pub use frame_resources::{FrameResourceError, FrameResources, TargetRole, TextureRole};
pub use logging::init_logging;
pub use passes::PassError;
pub use reflect::{ProgramInterface, ReflectError};
pub use renderer::{Renderer, RendererError, schedule_passes};
pub use resource::{
    Framebuffer, FramebufferError, GpuResource, ResourceError, ResourceId, ShaderError,
    ShaderProgram, Texture, TextureDesc, TextureFormat,
};
pub use scene::{HairStrands, Material, Mesh, Name, SceneError, Transform};
pub use shaders::{ProgramRole, ShaderLibrary, ShaderSourceError};
pub use state::DrawState;
pub use uniforms::{ShaderParams, UniformSet, UniformValue, Validation};

pub use strandfx_data;
pub use wgpu;
