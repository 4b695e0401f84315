//! TressFX `.tfx` strand file parsing.
//!
//! Layout (little-endian):
//! - `f32` version
//! - 7 x `u32`: strand count, vertices per strand, then byte offsets of the vertex
//!   position, strand UV, vertex UV, strand thickness and vertex color blocks
//! - at `offset_vertex_position`: `float4` per control vertex

use crate::hair::{HairError, StrandLayout, StrandSet};
use glam::Vec4;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Size of the fixed file header in bytes.
pub const HEADER_SIZE: usize = 4 + 7 * 4;

const POSITION_STRIDE: usize = 16;

#[derive(Debug, Error)]
pub enum TfxError {
    #[error("Strand file too small for header: {0} bytes, need {HEADER_SIZE}")]
    TruncatedHeader(usize),

    #[error("Header claims {strands} strands x {vertices_per_strand} vertices, which overflows")]
    CountOverflow { strands: u32, vertices_per_strand: u32 },

    #[error("Vertex positions out of bounds: need bytes {start}..{end}, file has {len}")]
    TruncatedPositions { start: usize, end: usize, len: usize },

    #[error("Invalid strand data: {0}")]
    Hair(#[from] HairError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fixed header at the start of every strand file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TfxHeader {
    pub version: f32,
    pub num_hair_strands: u32,
    pub num_vertices_per_strand: u32,
    pub offset_vertex_position: u32,
    pub offset_strand_uv: u32,
    pub offset_vertex_uv: u32,
    pub offset_strand_thickness: u32,
    pub offset_vertex_color: u32,
}

impl TfxHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, TfxError> {
        if bytes.len() < HEADER_SIZE {
            return Err(TfxError::TruncatedHeader(bytes.len()));
        }
        let word = |index: usize| read_u32(bytes, 4 + index * 4);
        Ok(Self {
            version: f32::from_bits(read_u32(bytes, 0)),
            num_hair_strands: word(0),
            num_vertices_per_strand: word(1),
            offset_vertex_position: word(2),
            offset_strand_uv: word(3),
            offset_vertex_uv: word(4),
            offset_strand_thickness: word(5),
            offset_vertex_color: word(6),
        })
    }

    /// `None` when the product does not fit in `usize`.
    pub fn total_vertices(&self) -> Option<usize> {
        (self.num_hair_strands as usize).checked_mul(self.num_vertices_per_strand as usize)
    }

    pub fn layout(&self) -> StrandLayout {
        StrandLayout {
            num_strands: self.num_hair_strands,
            vertices_per_strand: self.num_vertices_per_strand,
        }
    }
}

/// Parsed strand file. Only the data the renderer consumes is decoded.
#[derive(Debug, Clone)]
pub struct TfxFile {
    pub header: TfxHeader,
    pub positions: Vec<Vec4>,
}

impl TfxFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, TfxError> {
        let header = TfxHeader::parse(bytes)?;
        debug!(
            "Strand file v{}: {} strands x {} vertices",
            header.version, header.num_hair_strands, header.num_vertices_per_strand
        );

        let overflow = || TfxError::CountOverflow {
            strands: header.num_hair_strands,
            vertices_per_strand: header.num_vertices_per_strand,
        };
        let start = header.offset_vertex_position as usize;
        let end = header
            .total_vertices()
            .and_then(|count| count.checked_mul(POSITION_STRIDE))
            .and_then(|len| len.checked_add(start))
            .ok_or_else(overflow)?;
        if end > bytes.len() {
            return Err(TfxError::TruncatedPositions {
                start,
                end,
                len: bytes.len(),
            });
        }

        let positions = bytes[start..end]
            .chunks_exact(POSITION_STRIDE)
            .map(|chunk| {
                Vec4::new(
                    f32::from_bits(read_u32(chunk, 0)),
                    f32::from_bits(read_u32(chunk, 4)),
                    f32::from_bits(read_u32(chunk, 8)),
                    f32::from_bits(read_u32(chunk, 12)),
                )
            })
            .collect();

        Ok(Self { header, positions })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TfxError> {
        let path = path.as_ref();
        info!("Loading strand file {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Validated strand set ready for geometry preparation.
    pub fn into_strands(self) -> Result<StrandSet, TfxError> {
        Ok(StrandSet::new(self.header.layout(), self.positions)?)
    }
}

/// Caller guarantees `offset + 4 <= bytes.len()`.
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}
