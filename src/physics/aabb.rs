use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box given by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// An inverted box; the first `expand` sets a real region.
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f32::MAX),
            max: Vector3::repeat(-f32::MAX),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3<f32>>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand(p);
        }
        aabb
    }

    #[inline]
    pub fn center(&self) -> Vector3<f32> {
        0.5 * (self.min + self.max)
    }

    #[inline]
    pub fn extents(&self) -> Vector3<f32> {
        0.5 * (self.max - self.min)
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        let size = self.max - self.min;
        size.x * size.y * size.z
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn expand(&mut self, point: &Vector3<f32>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Grow by `margin` on every axis.
    pub fn inflated(&self, margin: f32) -> Aabb {
        let m = Vector3::repeat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    pub fn contains_point(&self, point: &Vector3<f32>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        other.min.x >= self.min.x
            && other.min.y >= self.min.y
            && other.min.z >= self.min.z
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
            && other.max.z <= self.max.z
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        if self.max.x < other.min.x || self.min.x > other.max.x {
            return false;
        }
        if self.max.y < other.min.y || self.min.y > other.max.y {
            return false;
        }
        if self.max.z < other.min.z || self.min.z > other.max.z {
            return false;
        }
        true
    }

    /// Slab test: the entry/exit parameters of a ray against this box, or
    /// `None` if the interval is empty. The entry parameter is clamped to
    /// zero so rays starting inside the box report the origin.
    pub fn ray_intersect(&self, origin: &Vector3<f32>, dir: &Vector3<f32>) -> Option<(f32, f32)> {
        let mut t_min: f32 = 0.0;
        let mut t_max = f32::MAX;

        for axis in 0..3 {
            let inv_d = 1.0 / dir[axis];
            let mut t0 = (self.min[axis] - origin[axis]) * inv_d;
            let mut t1 = (self.max[axis] - origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return None;
            }
        }

        Some((t_min, t_max))
    }
}
