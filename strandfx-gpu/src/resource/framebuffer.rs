//! Framebuffers: validated attachment lists.

use super::{Lifetime, ResourceError, ResourceId, impl_gpu_resource};
use crate::backend::BackendError;
use crate::resource::{GpuResource, ResourceKind, Texture, TextureFormat, TextureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentPoint {
    Color(u32),
    Depth,
    DepthStencil,
}

/// Snapshot of the attached texture taken when the framebuffer was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferAttachment {
    pub point: AttachmentPoint,
    pub texture: ResourceId,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub kind: TextureKind,
    pub mip_level: u32,
    pub layer: u32,
}

/// Backend verdict for an attachment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment(String),
    Unsupported(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FramebufferError {
    #[error("Framebuffer '{0}' needs at least one attachment")]
    NoAttachments(String),

    #[error("Framebuffer '{label}' attachments differ in size: {sizes}")]
    SizeMismatch { label: String, sizes: String },

    #[error("Framebuffer '{label}' has {count} depth attachments, at most 1 is allowed")]
    MultipleDepthAttachments { label: String, count: usize },

    #[error("Framebuffer '{label}' is incomplete: {reason}")]
    Incomplete { label: String, reason: String },

    #[error("Framebuffer '{label}' uses an unsupported combination: {reason}")]
    Unsupported { label: String, reason: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Ordered attachments sharing one size; at most one depth attachment.
#[derive(Debug)]
pub struct Framebuffer {
    pub(crate) lifetime: Lifetime,
    label: String,
    attachments: Vec<FramebufferAttachment>,
    width: u32,
    height: u32,
}

impl_gpu_resource!(Framebuffer, ResourceKind::Framebuffer);

impl Framebuffer {
    /// Validates `textures` and derives attachment points: depth formats become the
    /// depth (or depth-stencil) attachment, everything else is numbered as color
    /// attachments in order.
    pub(crate) fn plan(
        label: &str,
        textures: &[&Texture],
    ) -> Result<Vec<FramebufferAttachment>, FramebufferError> {
        if textures.is_empty() {
            return Err(FramebufferError::NoAttachments(label.to_string()));
        }
        for texture in textures {
            texture.ensure_valid()?;
        }

        let (width, height) = textures[0].dimensions();
        if textures.iter().any(|t| t.dimensions() != (width, height)) {
            let sizes = textures
                .iter()
                .map(|t| format!("[{}x{}]", t.width(), t.height()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(FramebufferError::SizeMismatch {
                label: label.to_string(),
                sizes,
            });
        }

        let depth_count = textures.iter().filter(|t| t.is_depth()).count();
        if depth_count > 1 {
            return Err(FramebufferError::MultipleDepthAttachments {
                label: label.to_string(),
                count: depth_count,
            });
        }

        let mut next_color = 0;
        let attachments = textures
            .iter()
            .map(|texture| {
                let point = if texture.format().is_depth_stencil() {
                    AttachmentPoint::DepthStencil
                } else if texture.is_depth() {
                    AttachmentPoint::Depth
                } else {
                    next_color += 1;
                    AttachmentPoint::Color(next_color - 1)
                };
                FramebufferAttachment {
                    point,
                    texture: texture.id(),
                    format: texture.format(),
                    width,
                    height,
                    kind: texture.kind(),
                    mip_level: 0,
                    layer: 0,
                }
            })
            .collect();
        Ok(attachments)
    }

    pub(crate) fn new(label: &str, attachments: Vec<FramebufferAttachment>) -> Self {
        let (width, height) = attachments
            .first()
            .map(|a| (a.width, a.height))
            .unwrap_or((0, 0));
        Self {
            lifetime: Lifetime::new(),
            label: label.to_string(),
            attachments,
            width,
            height,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn attachments(&self) -> &[FramebufferAttachment] {
        &self.attachments
    }

    pub fn color_attachment_count(&self) -> usize {
        self.attachments
            .iter()
            .filter(|a| matches!(a.point, AttachmentPoint::Color(_)))
            .count()
    }

    pub fn depth_attachment(&self) -> Option<&FramebufferAttachment> {
        self.attachments
            .iter()
            .find(|a| !matches!(a.point, AttachmentPoint::Color(_)))
    }

    pub fn has_stencil(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.point == AttachmentPoint::DepthStencil)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::TextureDesc;

    fn texture(w: u32, h: u32, format: TextureFormat) -> Texture {
        Texture::new(TextureDesc::new_2d("t", w, h, format))
    }

    #[test]
    fn test_plan_numbers_color_and_detects_depth() {
        let depth = texture(64, 32, TextureFormat::Depth24Stencil8);
        let color = texture(64, 32, TextureFormat::Rgba16F);
        let normals = texture(64, 32, TextureFormat::Rgba16F);
        let plan = Framebuffer::plan("fwd", &[&depth, &color, &normals]).unwrap();
        let points: Vec<_> = plan.iter().map(|a| a.point).collect();
        assert_eq!(
            points,
            vec![
                AttachmentPoint::DepthStencil,
                AttachmentPoint::Color(0),
                AttachmentPoint::Color(1)
            ]
        );
        let fbo = Framebuffer::new("fwd", plan);
        assert_eq!(fbo.dimensions(), (64, 32));
        assert_eq!(fbo.color_attachment_count(), 2);
        assert!(fbo.has_stencil());
    }

    #[test]
    fn test_plan_accepts_any_matching_size() {
        for (w, h) in [(1, 1), (7, 3), (1920, 1080)] {
            let a = texture(w, h, TextureFormat::Rgba8);
            let b = texture(w, h, TextureFormat::R8);
            let d = texture(w, h, TextureFormat::Depth16);
            assert!(Framebuffer::plan("ok", &[&a, &b, &d]).is_ok());
            assert!(Framebuffer::plan("ok", &[&d]).is_ok());
        }
    }

    #[test]
    fn test_plan_rejects_size_mismatch() {
        let a = texture(64, 32, TextureFormat::Rgba8);
        for (w, h) in [(65, 32), (64, 31), (1, 1)] {
            let b = texture(w, h, TextureFormat::Rgba8);
            let err = Framebuffer::plan("bad", &[&a, &b]).unwrap_err();
            assert!(matches!(err, FramebufferError::SizeMismatch { .. }));
            assert!(err.to_string().contains("[64x32]"));
        }
    }

    #[test]
    fn test_plan_rejects_two_depth_attachments() {
        let a = texture(8, 8, TextureFormat::Depth16);
        let b = texture(8, 8, TextureFormat::Depth24Stencil8);
        let err = Framebuffer::plan("bad", &[&a, &b]).unwrap_err();
        assert!(matches!(
            err,
            FramebufferError::MultipleDepthAttachments { count: 2, .. }
        ));
    }

    #[test]
    fn test_plan_rejects_empty_and_destroyed() {
        assert!(matches!(
            Framebuffer::plan("empty", &[]),
            Err(FramebufferError::NoAttachments(_))
        ));
        let mut a = texture(8, 8, TextureFormat::Rgba8);
        a.lifetime.invalidate();
        assert!(matches!(
            Framebuffer::plan("dead", &[&a]),
            Err(FramebufferError::Resource(_))
        ));
    }
}
