//! Cell topology and the 256-case triangulation table.
//!
//! Corner `i` sits at `CORNERS[i]` as `(x, y, z)` offsets inside the cell and
//! contributes bit `i` of the case index when its sample is inside the
//! surface. Rather than carrying a hand-typed table, the triangulation is
//! derived once from the face structure of the cube:
//!
//! 1. On every face, walk the four boundary edges counter-clockwise as seen
//!    from outside the cell and record where the inside/outside state flips.
//! 2. Each point where the walk leaves the inside region is joined to the
//!    crossing just before it. With four crossings on a face this keeps the
//!    two inside corners apart. Both cells sharing a face see the same four
//!    samples, so they always make the same choice and the surface has no
//!    cracks.
//! 3. Every crossed edge now has exactly one successor, so the joins form
//!    closed polygons. Each polygon is fanned into triangles wound so that
//!    normals face away from the inside region. The fan apex is chosen so no
//!    diagonal joins two crossings on the same face: such a diagonal would lie
//!    in the face and be repeated by the neighbouring cell.

use std::sync::LazyLock;

/// Corner offsets `(x, y, z)`.
pub(crate) const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Edges as pairs of corner indices.
pub(crate) const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Face corners, counter-clockwise when viewed from outside the cell.
const FACES: [[usize; 4]; 6] = [
    [0, 3, 2, 1], // z = 0
    [4, 5, 6, 7], // z = 1
    [0, 1, 5, 4], // y = 0
    [3, 7, 6, 2], // y = 1
    [0, 4, 7, 3], // x = 0
    [1, 2, 6, 5], // x = 1
];

/// `FACE_EDGES[f][k]` joins `FACES[f][k]` and `FACES[f][(k + 1) % 4]`.
const FACE_EDGES: [[usize; 4]; 6] = [
    [3, 2, 1, 0],
    [4, 5, 6, 7],
    [0, 9, 4, 8],
    [11, 6, 10, 2],
    [8, 7, 11, 3],
    [1, 10, 5, 9],
];

/// Triangles for every case, as triples of edge indices.
pub(crate) static TRIANGULATION: LazyLock<Vec<Vec<[u8; 3]>>> =
    LazyLock::new(|| (0..=u8::MAX).map(triangulate_case).collect());

/// Lower corner offset and axis (0 = x, 1 = y, 2 = z) of an edge.
pub(crate) fn edge_origin(edge: usize) -> ([usize; 3], usize) {
    let (a, b) = EDGES[edge];
    let (pa, pb) = (CORNERS[a], CORNERS[b]);
    let origin = [pa[0].min(pb[0]), pa[1].min(pb[1]), pa[2].min(pb[2])];
    let axis = (0..3).find(|&axis| pa[axis] != pb[axis]).unwrap_or(0);
    (origin, axis)
}

fn share_face(a: usize, b: usize) -> bool {
    FACE_EDGES
        .iter()
        .any(|edges| edges.contains(&a) && edges.contains(&b))
}

fn triangulate_case(case: u8) -> Vec<[u8; 3]> {
    let inside = |corner: usize| case & (1 << corner) != 0;

    // successor[e] is the edge the surface polygon visits after edge e
    let mut successor = [None::<usize>; 12];
    for (face, edges) in FACES.iter().zip(FACE_EDGES.iter()) {
        let crossings: Vec<(bool, usize)> = (0..4)
            .filter_map(|k| {
                let (a, b) = (face[k], face[(k + 1) % 4]);
                (inside(a) != inside(b)).then_some((inside(a), edges[k]))
            })
            .collect();

        for (j, &(leaving, edge)) in crossings.iter().enumerate() {
            if leaving {
                let previous = crossings[(j + crossings.len() - 1) % crossings.len()].1;
                successor[edge] = Some(previous);
            }
        }
    }

    let mut visited = [false; 12];
    let mut triangles = Vec::new();
    for start in 0..12 {
        if visited[start] || successor[start].is_none() {
            continue;
        }
        visited[start] = true;
        let mut polygon = vec![start];
        let mut current = start;
        while let Some(next) = successor[current] {
            if visited[next] {
                break;
            }
            visited[next] = true;
            polygon.push(next);
            current = next;
        }

        let n = polygon.len();
        let apex = (0..n)
            .find(|&r| {
                (2..n.saturating_sub(1)).all(|i| !share_face(polygon[r], polygon[(r + i) % n]))
            })
            .unwrap_or(0);
        polygon.rotate_left(apex);

        for i in 1..n.saturating_sub(1) {
            triangles.push([polygon[0] as u8, polygon[i + 1] as u8, polygon[i] as u8]);
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossed_edges(case: u8) -> usize {
        EDGES
            .iter()
            .filter(|&&(a, b)| (case >> a) & 1 != (case >> b) & 1)
            .count()
    }

    #[test]
    fn face_edges_match_face_corners() {
        for (face, edges) in FACES.iter().zip(FACE_EDGES.iter()) {
            for k in 0..4 {
                let (a, b) = EDGES[edges[k]];
                let (p, q) = (face[k], face[(k + 1) % 4]);
                assert!((a, b) == (p, q) || (a, b) == (q, p), "face {face:?} edge {k}");
            }
        }
    }

    #[test]
    fn trivial_cases_are_empty() {
        assert!(TRIANGULATION[0].is_empty());
        assert!(TRIANGULATION[255].is_empty());
    }

    #[test]
    fn single_corner_gives_one_triangle() {
        for corner in 0..8 {
            let case = 1u8 << corner;
            assert_eq!(TRIANGULATION[case as usize].len(), 1, "corner {corner}");
        }
    }

    #[test]
    fn every_crossed_edge_is_used() {
        for case in 0..=u8::MAX {
            let mut used = [false; 12];
            for triangle in &TRIANGULATION[case as usize] {
                for &edge in triangle {
                    used[edge as usize] = true;
                    let (a, b) = EDGES[edge as usize];
                    assert_ne!((case >> a) & 1, (case >> b) & 1, "case {case}");
                }
            }
            assert_eq!(
                used.iter().filter(|&&u| u).count(),
                crossed_edges(case),
                "case {case}"
            );
        }
    }

    #[test]
    fn complementary_cases_have_matching_size_up_to_ambiguity() {
        // Half-space cases (one face inside) are unambiguous: two triangles.
        assert_eq!(TRIANGULATION[0b0000_1111].len(), 2);
        assert_eq!(TRIANGULATION[0b1111_0000].len(), 2);
        // Alternating corners: four separated inside corners.
        assert_eq!(TRIANGULATION[0b1010_0101].len(), 4);
    }

    #[test]
    fn single_corner_normal_points_away_from_corner() {
        // Corner 0 inside: triangle edges are 0 (x axis), 3 (y axis) and 8 (z axis).
        let midpoint = |edge: u8| {
            let (origin, axis) = edge_origin(edge as usize);
            let mut p = origin.map(|c| c as f32);
            p[axis] += 0.5;
            p
        };
        let [a, b, c] = TRIANGULATION[1][0].map(midpoint);
        let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let normal = [
            ab[1] * ac[2] - ab[2] * ac[1],
            ab[2] * ac[0] - ab[0] * ac[2],
            ab[0] * ac[1] - ab[1] * ac[0],
        ];
        assert!(normal.iter().all(|&n| n > 0.0), "normal {normal:?}");
    }

    #[test]
    fn no_triangle_edge_is_repeated_inside_a_face() {
        for case in 0..=u8::MAX {
            let mut uses = std::collections::HashMap::new();
            for &[a, b, c] in &TRIANGULATION[case as usize] {
                for (p, q) in [(a, b), (b, c), (c, a)] {
                    *uses.entry((p.min(q), p.max(q))).or_insert(0) += 1;
                }
            }
            for (&(p, q), &count) in &uses {
                if share_face(p as usize, q as usize) {
                    assert_eq!(count, 1, "case {case} edge ({p}, {q})");
                }
            }
        }
    }

    #[test]
    fn edge_origins() {
        assert_eq!(edge_origin(0), ([0, 0, 0], 0));
        assert_eq!(edge_origin(1), ([1, 0, 0], 1));
        assert_eq!(edge_origin(6), ([0, 1, 1], 0));
        assert_eq!(edge_origin(10), ([1, 1, 0], 2));
    }
}
