use glam::{Affine3A, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
///
/// A default-constructed box is inverted (min > max) and treated as empty;
/// merging anything into it defines it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Inverted (empty) box.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_valid() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    pub fn merge_sphere(&mut self, center: Vec3, radius: f32) {
        self.min = self.min.min(center - Vec3::splat(radius));
        self.max = self.max.max(center + Vec3::splat(radius));
    }

    /// Returns the axis-aligned box enclosing this box under `transform`.
    #[must_use]
    pub fn transformed(&self, transform: &Affine3A) -> BoundingBox {
        if !self.is_valid() {
            return *self;
        }
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        let mut out = BoundingBox::empty();
        for corner in corners {
            out.merge_point(transform.transform_point3(corner));
        }
        out
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_defines_empty_box() {
        let mut b = BoundingBox::empty();
        assert!(!b.is_valid());
        b.merge_point(Vec3::ONE);
        b.merge_point(-Vec3::ONE);
        assert!(b.is_valid());
        assert_eq!(b.center(), Vec3::ZERO);
    }

    #[test]
    fn transformed_encloses_rotated_box() {
        let b = BoundingBox::new(-Vec3::ONE, Vec3::ONE);
        let t = Affine3A::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let out = b.transformed(&t);
        assert_eq!(out.center(), Vec3::new(5.0, 0.0, 0.0));
    }
}
