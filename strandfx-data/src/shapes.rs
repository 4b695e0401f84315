//! Procedural shapes for debug overlays.

use glam::Vec3;

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default)]
pub struct Shape {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

/// Ring of `segments` points around +Y at height 0.
fn circle(radius: f32, segments: u32) -> impl Iterator<Item = Vec3> {
    (0..segments).map(move |i| {
        let theta = i as f32 / segments as f32 * std::f32::consts::TAU;
        Vec3::new(radius * theta.sin(), 0.0, radius * theta.cos())
    })
}

/// Quad strip between two rings starting at `a` and `b`.
fn ring_faces(segments: u32, a: u32, b: u32, out: &mut Vec<u32>) {
    for i in 0..segments {
        let next = (i + 1) % segments;
        out.extend_from_slice(&[a + i, a + next, b + i]);
        out.extend_from_slice(&[b + i, a + next, b + next]);
    }
}

/// Triangle fan from a ring to a single apex vertex.
fn cone_faces(segments: u32, ring: u32, apex: u32, out: &mut Vec<u32>) {
    for i in 0..segments {
        out.extend_from_slice(&[ring + i, ring + (i + 1) % segments, apex]);
    }
}

/// UV sphere centered at the origin. `segments` is clamped to at least 3 and
/// `rings` (horizontal rings between the poles) to at least 2.
pub fn generate_sphere(radius: f32, segments: u32, rings: u32) -> Shape {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let dh = 2.0 / (rings + 1) as f32;

    let mut vertices = Vec::with_capacity((segments * rings + 2) as usize);
    for i in 0..rings {
        let height = (i + 1) as f32 * dh - 1.0;
        let ring_radius = (1.0 - height * height).max(0.0).sqrt();
        vertices.extend(circle(ring_radius, segments).map(|v| v + Vec3::Y * height));
    }

    let mut indices = Vec::new();
    for i in 0..rings - 1 {
        ring_faces(segments, segments * i, segments * (i + 1), &mut indices);
    }

    vertices.push(Vec3::Y);
    cone_faces(segments, (rings - 1) * segments, vertices.len() as u32 - 1, &mut indices);
    vertices.push(-Vec3::Y);
    cone_faces(segments, 0, vertices.len() as u32 - 1, &mut indices);

    for v in &mut vertices {
        *v *= radius.abs();
    }

    Shape { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_counts() {
        let sphere = generate_sphere(1.0, 8, 4);
        assert_eq!(sphere.vertices.len(), 8 * 4 + 2);
        // 3 ring strips of 2 triangles per segment plus 2 caps
        assert_eq!(sphere.indices.len(), (3 * 8 * 2 + 2 * 8) * 3);
        let max = *sphere.indices.iter().max().unwrap() as usize;
        assert!(max < sphere.vertices.len());
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let sphere = generate_sphere(2.5, 12, 6);
        for v in &sphere.vertices {
            assert!((v.length() - 2.5).abs() < 1e-4, "{v:?}");
        }
    }

    #[test]
    fn test_sphere_clamps_degenerate_input() {
        let sphere = generate_sphere(1.0, 1, 0);
        assert_eq!(sphere.vertices.len(), 3 * 2 + 2);
    }
}
