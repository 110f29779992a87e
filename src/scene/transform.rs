use glam::{Affine3A, Mat4, Quat, Vec3};

/// SRT transform with cached local and world matrices.
///
/// Dirty checking is shadow-state based: the public SRT fields are compared
/// against their last-seen copies in [`update_local_matrix`], so writes that
/// land on identical values cost nothing downstream. The world matrix carries
/// a version counter bumped on every actual change; consumers that cache
/// derived data (skin matrices) poll it instead of receiving callbacks.
///
/// [`update_local_matrix`]: Transform::update_local_matrix
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    last_position: Vec3,
    last_rotation: Quat,
    last_scale: Vec3,
    force_update: bool,
    version: u32,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,

            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_scale: Vec3::ONE,
            force_update: true,
            version: 0,
        }
    }

    pub fn set_srt(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
    }

    /// Recomputes the local matrix if the SRT fields changed since the last
    /// call. Returns whether a recompute happened.
    pub fn update_local_matrix(&mut self) -> bool {
        let changed = self.position != self.last_position
            || self.rotation != self.last_rotation
            || self.scale != self.last_scale
            || self.force_update;

        if changed {
            self.local_matrix =
                Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position);

            self.last_position = self.position;
            self.last_rotation = self.rotation;
            self.last_scale = self.scale;
            self.force_update = false;
        }

        changed
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    /// World matrix as `Mat4`, for GPU upload by the embedder.
    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    /// Written by the hierarchy update pass when the world matrix actually
    /// changed; bumps the change version.
    pub(crate) fn set_world_matrix(&mut self, matrix: Affine3A) {
        self.world_matrix = matrix;
        self.version = self.version.wrapping_add(1);
    }

    /// Monotonic (wrapping) world-matrix change counter.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Forces a local-matrix recompute on the next update.
    pub fn mark_dirty(&mut self) {
        self.force_update = true;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
