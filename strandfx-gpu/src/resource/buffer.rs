//! Buffers and vertex arrays.

use super::{Lifetime, ResourceError, ResourceId, impl_gpu_resource};
use crate::backend::BackendError;
use crate::resource::{GpuResource, ResourceKind};

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex attribute data
    Vertex,
    /// u32 triangle indices
    Index,
    /// Uniform block storage
    Uniform,
}

#[derive(Debug)]
pub struct Buffer {
    pub(crate) lifetime: Lifetime,
    kind: BufferKind,
    size: usize,
}

impl_gpu_resource!(Buffer, ResourceKind::Buffer);

impl Buffer {
    pub(crate) fn new(kind: BufferKind, size: usize) -> Self {
        Self {
            lifetime: Lifetime::new(),
            kind,
            size,
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Per-attribute component layout; always f32 components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl AttributeFormat {
    pub fn components(self) -> u32 {
        match self {
            AttributeFormat::Float => 1,
            AttributeFormat::Vec2 => 2,
            AttributeFormat::Vec3 => 3,
            AttributeFormat::Vec4 => 4,
        }
    }

    pub fn byte_size(self) -> u32 {
        self.components() * 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer: ResourceId,
    pub format: AttributeFormat,
    /// 0 means tightly packed.
    pub stride: u32,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.format.byte_size()
        } else {
            self.stride
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexRange {
    pub buffer: ResourceId,
    pub count: u32,
}

/// What the backend needs to build a vertex array object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexArrayDesc {
    pub label: String,
    pub attributes: Vec<VertexAttribute>,
    pub indices: Option<IndexRange>,
    /// Vertex count for non-indexed draws.
    pub vertex_count: u32,
}

/// Attribute bindings plus an optional index buffer. Owns the buffers it
/// references; destroying the array destroys them too.
#[derive(Debug)]
pub struct VertexArray {
    pub(crate) lifetime: Lifetime,
    pub(crate) buffers: Vec<Buffer>,
    desc: VertexArrayDesc,
}

impl_gpu_resource!(VertexArray, ResourceKind::VertexArray);

impl VertexArray {
    pub(crate) fn new(desc: VertexArrayDesc, buffers: Vec<Buffer>) -> Self {
        Self {
            lifetime: Lifetime::new(),
            buffers,
            desc,
        }
    }

    pub fn desc(&self) -> &VertexArrayDesc {
        &self.desc
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn index_count(&self) -> Option<u32> {
        self.desc.indices.map(|i| i.count)
    }

    pub fn vertex_count(&self) -> u32 {
        self.desc.vertex_count
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VertexArrayBuildError {
    #[error("Vertex array '{0}' has neither attributes nor indices")]
    NoAttributes(String),

    #[error("Vertex array '{label}' binds location {location} twice")]
    DuplicateLocation { label: String, location: u32 },

    #[error("Vertex array '{label}': {count} indices are not a whole number of triangles")]
    PartialTriangle { label: String, count: u32 },

    #[error("Buffer {buffer} is a {actual:?} buffer, expected {expected:?}")]
    WrongBufferKind {
        buffer: ResourceId,
        expected: BufferKind,
        actual: BufferKind,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Builder for vertex arrays. Buffers handed to the builder move into the array.
///
/// An array may consist of indices only, for geometry whose vertices are
/// fetched from textures by index.
pub struct VertexArrayBuilder {
    label: String,
    attributes: Vec<VertexAttribute>,
    buffers: Vec<Buffer>,
    indices: Option<(Buffer, u32)>,
    vertex_count: u32,
}

impl VertexArrayBuilder {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            attributes: Vec::new(),
            buffers: Vec::new(),
            indices: None,
            vertex_count: 0,
        }
    }

    /// Bind a tightly packed attribute stored in its own buffer.
    pub fn attribute(self, location: u32, buffer: Buffer, format: AttributeFormat) -> Self {
        self.attribute_with_layout(location, buffer, format, 0, 0)
    }

    pub fn attribute_with_layout(
        mut self,
        location: u32,
        buffer: Buffer,
        format: AttributeFormat,
        stride: u32,
        offset: u32,
    ) -> Self {
        let attribute = VertexAttribute {
            location,
            buffer: buffer.id(),
            format,
            stride,
            offset,
        };
        if self.vertex_count == 0 {
            let stride = attribute.effective_stride().max(1) as usize;
            self.vertex_count = (buffer.size().saturating_sub(offset as usize) / stride) as u32;
        }
        self.attributes.push(attribute);
        self.buffers.push(buffer);
        self
    }

    pub fn indices(mut self, buffer: Buffer, count: u32) -> Self {
        self.indices = Some((buffer, count));
        self
    }

    /// Override the vertex count derived from the first attribute buffer.
    pub fn vertex_count(mut self, count: u32) -> Self {
        self.vertex_count = count;
        self
    }

    pub(crate) fn build(mut self) -> Result<(VertexArrayDesc, Vec<Buffer>), VertexArrayBuildError> {
        if self.attributes.is_empty() && self.indices.is_none() {
            return Err(VertexArrayBuildError::NoAttributes(self.label));
        }
        for buffer in &self.buffers {
            buffer.ensure_valid()?;
            if buffer.kind() != BufferKind::Vertex {
                return Err(VertexArrayBuildError::WrongBufferKind {
                    buffer: buffer.id(),
                    expected: BufferKind::Vertex,
                    actual: buffer.kind(),
                });
            }
        }
        let mut locations: Vec<u32> = self.attributes.iter().map(|a| a.location).collect();
        locations.sort_unstable();
        if let Some(pair) = locations.windows(2).find(|w| w[0] == w[1]) {
            return Err(VertexArrayBuildError::DuplicateLocation {
                label: self.label,
                location: pair[0],
            });
        }

        let indices = match self.indices.take() {
            Some((buffer, count)) => {
                buffer.ensure_valid()?;
                if buffer.kind() != BufferKind::Index {
                    return Err(VertexArrayBuildError::WrongBufferKind {
                        buffer: buffer.id(),
                        expected: BufferKind::Index,
                        actual: buffer.kind(),
                    });
                }
                if count % 3 != 0 {
                    return Err(VertexArrayBuildError::PartialTriangle {
                        label: self.label,
                        count,
                    });
                }
                let range = IndexRange {
                    buffer: buffer.id(),
                    count,
                };
                self.buffers.push(buffer);
                Some(range)
            }
            None => None,
        };

        let desc = VertexArrayDesc {
            label: self.label,
            attributes: self.attributes,
            indices,
            vertex_count: self.vertex_count,
        };
        Ok((desc, self.buffers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_derives_vertex_count() {
        let positions = Buffer::new(BufferKind::Vertex, 12 * 5);
        let (desc, buffers) = VertexArrayBuilder::new("tri")
            .attribute(0, positions, AttributeFormat::Vec3)
            .build()
            .unwrap();
        assert_eq!(desc.vertex_count, 5);
        assert_eq!(buffers.len(), 1);
        assert!(desc.indices.is_none());
    }

    #[test]
    fn test_builder_takes_index_buffer() {
        let positions = Buffer::new(BufferKind::Vertex, 48);
        let indices = Buffer::new(BufferKind::Index, 24);
        let index_id = indices.id();
        let (desc, buffers) = VertexArrayBuilder::new("quad")
            .attribute(0, positions, AttributeFormat::Vec3)
            .indices(indices, 6)
            .build()
            .unwrap();
        assert_eq!(
            desc.indices,
            Some(IndexRange {
                buffer: index_id,
                count: 6
            })
        );
        assert_eq!(buffers.len(), 2);
    }

    #[test]
    fn test_builder_rejects_bad_input() {
        let err = VertexArrayBuilder::new("empty").build().unwrap_err();
        assert!(matches!(err, VertexArrayBuildError::NoAttributes(_)));

        let err = VertexArrayBuilder::new("dup")
            .attribute(0, Buffer::new(BufferKind::Vertex, 12), AttributeFormat::Vec3)
            .attribute(0, Buffer::new(BufferKind::Vertex, 12), AttributeFormat::Vec3)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            VertexArrayBuildError::DuplicateLocation { location: 0, .. }
        ));

        let err = VertexArrayBuilder::new("partial")
            .attribute(0, Buffer::new(BufferKind::Vertex, 12), AttributeFormat::Vec3)
            .indices(Buffer::new(BufferKind::Index, 16), 4)
            .build()
            .unwrap_err();
        assert!(matches!(err, VertexArrayBuildError::PartialTriangle { count: 4, .. }));

        let err = VertexArrayBuilder::new("kind")
            .attribute(0, Buffer::new(BufferKind::Index, 12), AttributeFormat::Vec3)
            .build()
            .unwrap_err();
        assert!(matches!(err, VertexArrayBuildError::WrongBufferKind { .. }));
    }
}
