use nalgebra::Vector3;

use super::gjk::{cso_support, ShapePose, Simplex, SupportPoint};
use crate::utils::constants::{EPA_MAX_ITERATIONS, EPA_TOLERANCE};

/// A contact produced by the narrow phase.
///
/// The normal is the outward normal of the closest polytope face, i.e. the
/// direction along which shape A must translate by `penetration` to resolve
/// the overlap is `-normal`.
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    pub point_a: Vector3<f32>,
    pub point_b: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub penetration: f32,
    pub tangent1: Vector3<f32>,
    pub tangent2: Vector3<f32>,
    pub body_a: usize,
    pub body_b: usize,
    pub collider_a: u32,
    pub collider_b: u32,
}

#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vector3<f32>,
    distance: f32,
}

impl Face {
    /// Build a face with outward winding; returns `None` when degenerate.
    fn new(i0: usize, i1: usize, i2: usize, vertices: &[SupportPoint]) -> Option<Self> {
        let a = vertices[i0].cso;
        let b = vertices[i1].cso;
        let c = vertices[i2].cso;

        let mut normal = (b - a).cross(&(c - a));
        let len = normal.norm();
        if len < 1e-10 {
            return None;
        }
        normal /= len;

        let mut indices = [i0, i1, i2];
        let mut distance = normal.dot(&a);
        if distance < 0.0 {
            // Flip so the normal points away from the origin.
            indices.swap(1, 2);
            normal = -normal;
            distance = -distance;
        }

        Some(Self {
            indices,
            normal,
            distance,
        })
    }

    fn can_see(&self, point: &Vector3<f32>, vertices: &[SupportPoint]) -> bool {
        self.normal.dot(&(point - vertices[self.indices[0]].cso)) > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge(usize, usize);

impl Edge {
    fn reversed(&self) -> Edge {
        Edge(self.1, self.0)
    }
}

/// Add an edge to the silhouette loop; a shared edge appears once from each
/// deleted face (with opposite winding) and cancels out.
fn toggle_edge(edge: Edge, loop_edges: &mut Vec<Edge>) {
    if let Some(pos) = loop_edges.iter().position(|e| *e == edge.reversed()) {
        loop_edges.swap_remove(pos);
    } else {
        loop_edges.push(edge);
    }
}

fn barycentric(
    p: &Vector3<f32>,
    a: &Vector3<f32>,
    b: &Vector3<f32>,
    c: &Vector3<f32>,
) -> Vector3<f32> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-12 {
        return Vector3::new(1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vector3::new(1.0 - v - w, v, w)
}

fn tangent_basis(normal: &Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    let tangent1 = if normal.x.abs() >= 0.577_35 {
        Vector3::new(normal.y, -normal.x, 0.0).normalize()
    } else {
        Vector3::new(0.0, normal.z, -normal.y).normalize()
    };
    let tangent2 = normal.cross(&tangent1);
    (tangent1, tangent2)
}

/// Expanding polytope algorithm: grow the GJK tetrahedron toward the CSO
/// boundary until the closest face stops moving, then read the contact off
/// that face. Returns `None` on degenerate input or when the iteration cap
/// is exceeded.
pub fn generate_contact(simplex: &Simplex, a: &ShapePose, b: &ShapePose) -> Option<Contact> {
    if simplex.len() < 4 {
        return None;
    }

    let mut vertices: Vec<SupportPoint> = simplex.points().to_vec();
    let mut faces = vec![
        Face::new(0, 1, 2, &vertices)?,
        Face::new(0, 2, 3, &vertices)?,
        Face::new(0, 3, 1, &vertices)?,
        Face::new(1, 3, 2, &vertices)?,
    ];

    for _ in 0..EPA_MAX_ITERATIONS {
        let closest = faces
            .iter()
            .min_by(|x, y| x.distance.total_cmp(&y.distance))
            .copied()?;

        let support = cso_support(a, b, &closest.normal);
        let growth = support.cso.dot(&closest.normal) - closest.distance;

        if growth < EPA_TOLERANCE {
            return Some(emit_contact(&closest, &vertices, a, b));
        }

        // Delete every face visible from the new point and stitch the
        // silhouette to it.
        let new_index = vertices.len();
        vertices.push(support);

        let mut loop_edges: Vec<Edge> = Vec::new();
        let mut kept = Vec::with_capacity(faces.len());
        for face in faces {
            if face.can_see(&support.cso, &vertices) {
                toggle_edge(Edge(face.indices[0], face.indices[1]), &mut loop_edges);
                toggle_edge(Edge(face.indices[1], face.indices[2]), &mut loop_edges);
                toggle_edge(Edge(face.indices[2], face.indices[0]), &mut loop_edges);
            } else {
                kept.push(face);
            }
        }

        for edge in loop_edges {
            if let Some(face) = Face::new(edge.0, edge.1, new_index, &vertices) {
                kept.push(face);
            }
        }
        if kept.is_empty() {
            return None;
        }
        faces = kept;
    }

    None
}

fn emit_contact(
    face: &Face,
    vertices: &[SupportPoint],
    a: &ShapePose,
    b: &ShapePose,
) -> Contact {
    let va = &vertices[face.indices[0]];
    let vb = &vertices[face.indices[1]];
    let vc = &vertices[face.indices[2]];

    // Closest point of the face plane to the origin, in barycentric form.
    let projection = face.normal * face.distance;
    let bary = barycentric(&projection, &va.cso, &vb.cso, &vc.cso);

    let point_a = bary.x * va.on_a + bary.y * vb.on_a + bary.z * vc.on_a;
    let point_b = bary.x * va.on_b + bary.y * vb.on_b + bary.z * vc.on_b;

    let (tangent1, tangent2) = tangent_basis(&face.normal);

    Contact {
        point_a,
        point_b,
        normal: face.normal,
        penetration: face.distance,
        tangent1,
        tangent2,
        body_a: a.collider.body,
        body_b: b.collider.body,
        collider_a: 0,
        collider_b: 0,
    }
}
