//! GPU resource wrappers.
//!
//! Every wrapper carries a process-unique [`ResourceId`] and an explicit validity
//! flag. Resources are never freed implicitly: they are destroyed through the
//! [`Device`](crate::Device), after which every operation on them fails with
//! [`ResourceError::Invalid`].

pub mod buffer;
pub mod framebuffer;
pub mod program;
pub mod texture;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use buffer::{
    AttributeFormat, Buffer, BufferKind, IndexRange, VertexArray, VertexArrayBuildError,
    VertexArrayBuilder, VertexArrayDesc, VertexAttribute,
};
pub use framebuffer::{
    AttachmentPoint, Framebuffer, FramebufferAttachment, FramebufferError, FramebufferStatus,
};
pub use program::{
    CompileFailure, Diagnostic, ProgramSource, ShaderError, ShaderProgram, ShaderStage,
    format_diagnostics,
};
pub use texture::{
    MagFilter, MinFilter, Texture, TextureDesc, TextureFormat, TextureKind, TextureOptions,
    WrapMode, full_mip_chain,
};

/// Monotonically increasing resource identity, used as a map key in place of raw
/// API handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_resource_id() -> ResourceId {
    ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Framebuffer,
    ShaderProgram,
    VertexArray,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::ShaderProgram => "shader program",
            ResourceKind::VertexArray => "vertex array",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("Tried to use invalid {kind} {id}")]
    Invalid { kind: ResourceKind, id: ResourceId },
}

/// Common surface of all resource wrappers.
pub trait GpuResource {
    const KIND: ResourceKind;

    fn id(&self) -> ResourceId;

    fn is_valid(&self) -> bool;

    /// Fails with a kind-attributed error once the resource has been destroyed.
    fn ensure_valid(&self) -> Result<(), ResourceError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ResourceError::Invalid {
                kind: Self::KIND,
                id: self.id(),
            })
        }
    }
}

/// Identity plus liveness, embedded in every wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lifetime {
    id: ResourceId,
    valid: bool,
}

impl Lifetime {
    pub(crate) fn new() -> Self {
        Self {
            id: next_resource_id(),
            valid: true,
        }
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }
}

macro_rules! impl_gpu_resource {
    ($ty:ty, $kind:expr) => {
        impl $crate::resource::GpuResource for $ty {
            const KIND: $crate::resource::ResourceKind = $kind;

            fn id(&self) -> $crate::resource::ResourceId {
                self.lifetime.id()
            }

            fn is_valid(&self) -> bool {
                self.lifetime.is_valid()
            }
        }
    };
}

pub(crate) use impl_gpu_resource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = next_resource_id();
        let b = next_resource_id();
        assert!(b > a);
        assert_ne!(Lifetime::new().id(), Lifetime::new().id());
    }

    #[test]
    fn test_error_names_resource_kind() {
        let id = next_resource_id();
        let err = ResourceError::Invalid {
            kind: ResourceKind::Framebuffer,
            id,
        };
        assert_eq!(err.to_string(), format!("Tried to use invalid framebuffer {id}"));
    }
}
