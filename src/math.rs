//! Math types for soundfield

pub use glam::{Quat, Vec3};

/// Position and orientation of a listener or sound source in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize();
        self.rotation = Quat::from_rotation_arc(-Vec3::Z, forward);
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_pose_faces_negative_z() {
        let pose = Pose::identity();
        assert!(pose.forward().abs_diff_eq(-Vec3::Z, 1e-6));
        assert!(pose.up().abs_diff_eq(Vec3::Y, 1e-6));
        assert!(pose.right().abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn test_look_at_turns_toward_target() {
        let mut pose = Pose::from_position(Vec3::ZERO);
        pose.look_at(Vec3::new(1.0, 0.0, 0.0));
        assert!(pose.forward().abs_diff_eq(Vec3::X, 1e-5));
    }
}
