//! Hair geometry preparation.
//!
//! Turns strand control points into the data the hair pass fetches from textures:
//! per-vertex positions and tangents packed as RGBA32F texels, plus an index buffer
//! that expands every strand into a camera-facing ribbon (2 render vertices per
//! control vertex).

use glam::{Vec3, Vec4};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum HairError {
    #[error("Strand set contains no strands")]
    NoStrands,

    #[error("Strands need at least 2 vertices, got {0}")]
    TooFewVertices(u32),

    #[error("Expected {expected} control vertices, got {actual}")]
    PositionCountMismatch { expected: usize, actual: usize },

    #[error("{texels} texels do not fit a {max_size}x{max_size} texture")]
    TooLargeForTexture { texels: usize, max_size: u32 },
}

/// Strand count and fixed strand length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrandLayout {
    pub num_strands: u32,
    pub vertices_per_strand: u32,
}

impl StrandLayout {
    pub fn total_vertices(&self) -> usize {
        self.num_strands as usize * self.vertices_per_strand as usize
    }

    pub fn segments_per_strand(&self) -> u32 {
        self.vertices_per_strand.saturating_sub(1)
    }

    /// 2 triangles per segment.
    pub fn triangle_count(&self) -> usize {
        self.num_strands as usize * self.segments_per_strand() as usize * 2
    }

    pub fn index_count(&self) -> usize {
        self.triangle_count() * 3
    }
}

/// Control vertices grouped into equal-length strands.
///
/// Positions keep the source `w` component (TressFX stores inverse mass there);
/// only `xyz` take part in tangent derivation.
#[derive(Debug, Clone)]
pub struct StrandSet {
    layout: StrandLayout,
    positions: Vec<Vec4>,
}

impl StrandSet {
    pub fn new(layout: StrandLayout, positions: Vec<Vec4>) -> Result<Self, HairError> {
        if layout.num_strands == 0 {
            return Err(HairError::NoStrands);
        }
        if layout.vertices_per_strand < 2 {
            return Err(HairError::TooFewVertices(layout.vertices_per_strand));
        }
        if positions.len() != layout.total_vertices() {
            return Err(HairError::PositionCountMismatch {
                expected: layout.total_vertices(),
                actual: positions.len(),
            });
        }
        Ok(Self { layout, positions })
    }

    pub fn from_points(layout: StrandLayout, points: &[Vec3]) -> Result<Self, HairError> {
        Self::new(layout, points.iter().map(|p| p.extend(1.0)).collect())
    }

    pub fn layout(&self) -> StrandLayout {
        self.layout
    }

    pub fn positions(&self) -> &[Vec4] {
        &self.positions
    }

    pub fn strand(&self, index: usize) -> &[Vec4] {
        let n = self.layout.vertices_per_strand as usize;
        &self.positions[index * n..(index + 1) * n]
    }
}

/// Unit tangent per control vertex.
///
/// - first vertex: direction to the second vertex
/// - interior vertex: sum of the normalized incoming and outgoing directions, so
///   segment length does not bias the result
/// - last vertex: backward difference towards the previous vertex
///
/// Degenerate (zero-length) segments produce a zero tangent instead of NaN.
pub fn compute_tangents(strands: &StrandSet) -> Vec<Vec3> {
    let n = strands.layout.vertices_per_strand as usize;
    let mut tangents = Vec::with_capacity(strands.positions.len());

    for s in 0..strands.layout.num_strands as usize {
        let strand = strands.strand(s);
        let p = |i: usize| strand[i].truncate();

        tangents.push((p(1) - p(0)).normalize_or_zero());
        for i in 1..n - 1 {
            let incoming = (p(i) - p(i - 1)).normalize_or_zero();
            let outgoing = (p(i + 1) - p(i)).normalize_or_zero();
            tangents.push((incoming + outgoing).normalize_or_zero());
        }
        tangents.push((p(n - 1) - p(n - 2)).normalize_or_zero());
    }

    tangents
}

/// Ribbon index buffer.
///
/// `id` advances once per segment and once more at the end of each strand, so the
/// last render vertex pair of a strand is never stitched to the next strand's root.
pub fn expand_indices(layout: StrandLayout) -> Vec<u32> {
    let mut indices = Vec::with_capacity(layout.index_count());
    let mut id = 0u32;

    for _ in 0..layout.num_strands {
        for _ in 0..layout.segments_per_strand() {
            indices.extend_from_slice(&[
                2 * id,
                2 * id + 1,
                2 * id + 2,
                2 * id + 2,
                2 * id + 1,
                2 * id + 3,
            ]);
            id += 1;
        }
        id += 1;
    }

    indices
}

/// 2D texture size holding one texel per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelExtent {
    pub width: u32,
    pub height: u32,
}

impl TexelExtent {
    pub fn for_texels(texels: usize, max_size: u32) -> Result<Self, HairError> {
        let max = max_size.max(1) as usize;
        let width = texels.clamp(1, max);
        let height = texels.div_ceil(width).max(1);
        if height > max {
            return Err(HairError::TooLargeForTexture {
                texels,
                max_size,
            });
        }
        Ok(Self {
            width: width as u32,
            height: height as u32,
        })
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Everything the hair pass needs, still on the CPU.
#[derive(Debug, Clone)]
pub struct PreparedHair {
    pub layout: StrandLayout,
    pub extent: TexelExtent,
    /// Row-major RGBA32F texels, zero padded to `extent`.
    pub position_texels: Vec<[f32; 4]>,
    pub tangent_texels: Vec<[f32; 4]>,
    pub indices: Vec<u32>,
}

impl PreparedHair {
    pub fn prepare(strands: &StrandSet, max_texture_size: u32) -> Result<Self, HairError> {
        let layout = strands.layout();
        let extent = TexelExtent::for_texels(layout.total_vertices(), max_texture_size)?;

        let position_texels = pad_texels(strands.positions().iter().map(|p| p.to_array()), extent);
        let tangent_texels = pad_texels(
            compute_tangents(strands)
                .into_iter()
                .map(|t| t.extend(0.0).to_array()),
            extent,
        );

        Ok(Self {
            layout,
            extent,
            position_texels,
            tangent_texels,
            indices: expand_indices(layout),
        })
    }
}

fn pad_texels(values: impl Iterator<Item = [f32; 4]>, extent: TexelExtent) -> Vec<[f32; 4]> {
    let mut texels: Vec<[f32; 4]> = values.collect();
    texels.resize(extent.texel_count(), [0.0; 4]);
    texels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(num_strands: u32, vertices_per_strand: u32) -> StrandLayout {
        StrandLayout {
            num_strands,
            vertices_per_strand,
        }
    }

    fn wavy_strands() -> StrandSet {
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(1.0, 3.0, 0.0),
            Vec3::new(1.0, 7.0, 2.0),
            Vec3::new(5.0, 1.0, 0.0),
            Vec3::new(4.0, 1.5, 0.0),
            Vec3::new(3.0, 0.5, 0.5),
            Vec3::new(3.0, 0.5, 3.0),
        ];
        StrandSet::from_points(layout(2, 4), &points).expect("valid strands")
    }

    #[test]
    fn test_first_tangent_is_exact_direction() {
        let strands = wavy_strands();
        let tangents = compute_tangents(&strands);
        for s in 0..2 {
            let strand = strands.strand(s);
            let expected = (strand[1].truncate() - strand[0].truncate()).normalize();
            assert_eq!(tangents[s * 4], expected);
        }
    }

    #[test]
    fn test_interior_tangent_ignores_segment_length() {
        let points = [
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 10.0, 0.0),
        ];
        let strands = StrandSet::from_points(layout(1, 3), &points).unwrap();
        let tangents = compute_tangents(&strands);
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((tangents[1] - expected).length() < 1e-6);
    }

    #[test]
    fn test_last_tangent_is_backward_difference() {
        let strands = wavy_strands();
        let tangents = compute_tangents(&strands);
        assert_eq!(tangents.len(), 8);
        let strand = strands.strand(1);
        let expected = (strand[3].truncate() - strand[2].truncate()).normalize();
        assert!((tangents[7] - expected).length() < 1e-6);
        for t in &tangents {
            assert!((t.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_degenerate_segment_gives_zero_tangent() {
        let points = [Vec3::ONE, Vec3::ONE];
        let strands = StrandSet::from_points(layout(1, 2), &points).unwrap();
        let tangents = compute_tangents(&strands);
        assert_eq!(tangents, vec![Vec3::ZERO, Vec3::ZERO]);
    }

    #[test]
    fn test_index_count_three_by_four() {
        let indices = expand_indices(layout(3, 4));
        assert_eq!(indices.len(), 3 * 3 * 6);
        assert_eq!(layout(3, 4).index_count(), 54);
    }

    #[test]
    fn test_indices_skip_strand_seams() {
        let indices = expand_indices(layout(2, 3));
        assert_eq!(&indices[..6], &[0, 1, 2, 2, 1, 3]);
        assert_eq!(&indices[6..12], &[2, 3, 4, 4, 3, 5]);
        // second strand starts at control vertex 3, render vertex 6
        assert_eq!(&indices[12..18], &[6, 7, 8, 8, 7, 9]);
        let max = indices.iter().copied().max().unwrap();
        assert_eq!(max, 2 * 6 - 1);
    }

    #[test]
    fn test_strand_set_validation() {
        assert_eq!(
            StrandSet::new(layout(0, 4), vec![]).unwrap_err(),
            HairError::NoStrands
        );
        assert_eq!(
            StrandSet::new(layout(1, 1), vec![Vec4::ZERO]).unwrap_err(),
            HairError::TooFewVertices(1)
        );
        assert_eq!(
            StrandSet::new(layout(2, 2), vec![Vec4::ZERO; 3]).unwrap_err(),
            HairError::PositionCountMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_texel_extent() {
        let extent = TexelExtent::for_texels(10, 4).unwrap();
        assert_eq!(extent, TexelExtent { width: 4, height: 3 });
        let extent = TexelExtent::for_texels(3, 4096).unwrap();
        assert_eq!(extent, TexelExtent { width: 3, height: 1 });
        assert!(TexelExtent::for_texels(17, 4).is_err());
    }

    #[test]
    fn test_prepare_pads_texels() {
        let prepared = PreparedHair::prepare(&wavy_strands(), 3).unwrap();
        assert_eq!(prepared.extent, TexelExtent { width: 3, height: 3 });
        assert_eq!(prepared.position_texels.len(), 9);
        assert_eq!(prepared.tangent_texels.len(), 9);
        assert_eq!(prepared.position_texels[8], [0.0; 4]);
        assert_eq!(prepared.position_texels[1], [0.0, 2.0, 0.0, 1.0]);
        assert_eq!(prepared.tangent_texels[0], [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(prepared.indices.len(), 2 * 3 * 6);
    }
}
