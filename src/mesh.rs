use std::collections::HashMap;

/// Indexed triangle mesh in physical (millimetre) coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// True when every triangle refers to an existing vertex.
    pub fn validate_indices(&self) -> bool {
        let count = self.vertices.len();
        self.triangles
            .iter()
            .flatten()
            .all(|&index| (index as usize) < count)
    }

    /// Number of triangles using each undirected edge.
    pub fn edge_use_counts(&self) -> HashMap<(u32, u32), usize> {
        let mut counts = HashMap::new();
        for &[a, b, c] in &self.triangles {
            for (from, to) in [(a, b), (b, c), (c, a)] {
                *counts.entry((from.min(to), from.max(to))).or_insert(0) += 1;
            }
        }
        counts
    }

    /// A closed surface uses every edge exactly twice.
    pub fn is_closed(&self) -> bool {
        self.edge_use_counts().values().all(|&uses| uses == 2)
    }

    /// `V - E + F`; 2 for every closed surface of genus zero.
    pub fn euler_characteristic(&self) -> i64 {
        let edges = self.edge_use_counts().len() as i64;
        self.vertices.len() as i64 - edges + self.triangles.len() as i64
    }

    /// Axis-aligned bounds as `(min, max)`, `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            (
                [lo[0].min(v[0]), lo[1].min(v[1]), lo[2].min(v[2])],
                [hi[0].max(v[0]), hi[1].max(v[1]), hi[2].max(v[2])],
            )
        }))
    }

    /// Unit normal of a triangle by the right-hand rule, zero when degenerate.
    pub fn triangle_normal(&self, triangle: [u32; 3]) -> [f32; 3] {
        let [a, b, c] = triangle.map(|index| self.vertices[index as usize]);
        let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let n = [
            ab[1] * ac[2] - ab[2] * ac[1],
            ab[2] * ac[0] - ab[0] * ac[2],
            ab[0] * ac[1] - ab[1] * ac[0],
        ];
        let len2 = n[0] * n[0] + n[1] * n[1] + n[2] * n[2];
        if len2 <= f32::EPSILON * f32::EPSILON {
            return [0.0; 3];
        }
        let inv_len = 1.0 / len2.sqrt();
        [n[0] * inv_len, n[1] * inv_len, n[2] * inv_len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Mesh {
        Mesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            triangles: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        }
    }

    #[test]
    fn tetrahedron_is_closed_sphere() {
        let mesh = tetrahedron();
        assert!(mesh.validate_indices());
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
    }

    #[test]
    fn open_mesh_is_detected() {
        let mut mesh = tetrahedron();
        mesh.triangles.pop();
        assert!(!mesh.is_closed());
    }

    #[test]
    fn bad_index_is_detected() {
        let mut mesh = tetrahedron();
        mesh.triangles.push([0, 1, 9]);
        assert!(!mesh.validate_indices());
    }

    #[test]
    fn empty_mesh() {
        let mesh = Mesh::new();
        assert!(mesh.is_empty());
        assert!(mesh.is_closed());
        assert!(mesh.bounds().is_none());
    }

    #[test]
    fn normal_follows_right_hand_rule() {
        let mesh = tetrahedron();
        assert_eq!(mesh.triangle_normal([0, 1, 2]), [0.0, 0.0, 1.0]);
        assert_eq!(mesh.triangle_normal([0, 2, 1]), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let (lo, hi) = tetrahedron().bounds().unwrap();
        assert_eq!(lo, [0.0, 0.0, 0.0]);
        assert_eq!(hi, [1.0, 1.0, 1.0]);
    }
}
