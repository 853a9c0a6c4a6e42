use nalgebra::{UnitQuaternion, Vector3};

use crate::physics::collider::Collider;
use crate::utils::constants::GJK_MAX_ITERATIONS;

/// A point on the configuration-space obstacle, with the world-space support
/// points on each shape cached for contact generation.
#[derive(Debug, Clone, Copy)]
pub struct SupportPoint {
    pub cso: Vector3<f32>,
    pub on_a: Vector3<f32>,
    pub on_b: Vector3<f32>,
}

/// A collider plus the pose of its owning body.
#[derive(Clone, Copy)]
pub struct ShapePose<'a> {
    pub collider: &'a Collider,
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl<'a> ShapePose<'a> {
    fn support(&self, world_dir: &Vector3<f32>) -> Vector3<f32> {
        self.collider
            .support_world(&self.position, &self.orientation, world_dir)
    }
}

/// Support of the Minkowski difference A - B in world direction `dir`.
pub fn cso_support(a: &ShapePose, b: &ShapePose, dir: &Vector3<f32>) -> SupportPoint {
    let on_a = a.support(dir);
    let on_b = b.support(&-dir);
    SupportPoint {
        cso: on_a - on_b,
        on_a,
        on_b,
    }
}

/// Working simplex of one to four CSO points. The most recently added point
/// is always the last one.
#[derive(Debug, Clone)]
pub struct Simplex {
    points: [SupportPoint; 4],
    size: usize,
}

impl Simplex {
    fn new(first: SupportPoint) -> Self {
        Self {
            points: [first; 4],
            size: 1,
        }
    }

    fn push(&mut self, point: SupportPoint) {
        debug_assert!(self.size < 4);
        self.points[self.size] = point;
        self.size += 1;
    }

    fn set2(&mut self, p0: SupportPoint, p1: SupportPoint) {
        self.points[0] = p0;
        self.points[1] = p1;
        self.size = 2;
    }

    fn set3(&mut self, p0: SupportPoint, p1: SupportPoint, p2: SupportPoint) {
        self.points[0] = p0;
        self.points[1] = p1;
        self.points[2] = p2;
        self.size = 3;
    }

    pub fn points(&self) -> &[SupportPoint] {
        &self.points[..self.size]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Reduce the simplex to the feature closest to the origin and pick the
    /// next search direction. Returns true once a tetrahedron encloses the
    /// origin.
    fn refine(&mut self, dir: &mut Vector3<f32>) -> bool {
        match self.size {
            2 => self.refine_line(dir),
            3 => self.refine_triangle(dir),
            4 => self.refine_tetrahedron(dir),
            _ => {
                *dir = -self.points[0].cso;
                false
            }
        }
    }

    fn refine_line(&mut self, dir: &mut Vector3<f32>) -> bool {
        let a = self.points[1];
        let b = self.points[0];
        let ab = b.cso - a.cso;
        let ao = -a.cso;

        if ab.dot(&ao) > 0.0 {
            *dir = ab.cross(&ao).cross(&ab);
        } else {
            self.points[0] = a;
            self.size = 1;
            *dir = ao;
        }
        false
    }

    fn refine_triangle(&mut self, dir: &mut Vector3<f32>) -> bool {
        let a = self.points[2];
        let b = self.points[1];
        let c = self.points[0];

        let ab = b.cso - a.cso;
        let ac = c.cso - a.cso;
        let ao = -a.cso;
        let abc = ab.cross(&ac);

        if abc.cross(&ac).dot(&ao) > 0.0 {
            if ac.dot(&ao) > 0.0 {
                // Closest to edge AC.
                self.set2(c, a);
                *dir = ac.cross(&ao).cross(&ac);
            } else {
                self.set2(b, a);
                return self.refine_line(dir);
            }
        } else if ab.cross(&abc).dot(&ao) > 0.0 {
            self.set2(b, a);
            return self.refine_line(dir);
        } else if abc.dot(&ao) > 0.0 {
            // Origin above the triangle plane.
            *dir = abc;
        } else {
            // Below: flip winding so the next point lands on the right side.
            self.set3(b, c, a);
            *dir = -abc;
        }
        false
    }

    fn refine_tetrahedron(&mut self, dir: &mut Vector3<f32>) -> bool {
        let a = self.points[3];
        let b = self.points[2];
        let c = self.points[1];
        let d = self.points[0];

        let ab = b.cso - a.cso;
        let ac = c.cso - a.cso;
        let ad = d.cso - a.cso;
        let ao = -a.cso;

        let abc = ab.cross(&ac);
        let acd = ac.cross(&ad);
        let adb = ad.cross(&ab);

        if abc.dot(&ao) > 0.0 {
            self.set3(c, b, a);
            return self.refine_triangle(dir);
        }
        if acd.dot(&ao) > 0.0 {
            self.set3(d, c, a);
            return self.refine_triangle(dir);
        }
        if adb.dot(&ao) > 0.0 {
            self.set3(b, d, a);
            return self.refine_triangle(dir);
        }

        // No face separates the origin from the interior.
        true
    }
}

/// GJK intersection test. Returns the enclosing tetrahedron when the shapes
/// overlap, `None` otherwise. Exceeding the iteration cap counts as no
/// intersection.
pub fn intersect(a: &ShapePose, b: &ShapePose) -> Option<Simplex> {
    let mut dir = Vector3::new(1.0, 0.0, 0.0);
    let first = cso_support(a, b, &dir);
    let mut simplex = Simplex::new(first);
    dir = -first.cso;

    for _ in 0..GJK_MAX_ITERATIONS {
        if dir.norm_squared() < 1e-12 {
            // Degenerate direction: the origin sits on the current feature.
            dir = Vector3::new(0.0, 0.0, 1.0);
        }

        let support = cso_support(a, b, &dir);
        if support.cso.dot(&dir) < 0.0 {
            return None;
        }

        simplex.push(support);
        if simplex.refine(&mut dir) {
            return Some(simplex);
        }
    }

    None
}
