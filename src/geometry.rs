//! Geometry primitives: positions, orientations, poses, and frame transforms.
//!
//! Wire types are plain serde structs; the rotation math goes through
//! [`nalgebra`]. Orientations are quaternions and must be unit-norm;
//! consumers reject non-normalized input instead of silently renormalizing.

use chrono::{DateTime, Utc};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance applied when checking that a quaternion has unit norm.
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Errors produced by geometry validation.
#[derive(Error, Debug)]
pub enum GeometryError {
    /// A quaternion's magnitude deviated from 1 beyond tolerance.
    #[error("orientation is not normalized (|q| = {norm})")]
    NotNormalized {
        /// The offending magnitude.
        norm: f64,
    },
}

/// A 3D position or translation, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Construct from components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Vec3) -> f64 {
        (self.to_na() - other.to_na()).norm()
    }

    pub(crate) fn to_na(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub(crate) fn from_na(v: Vector3<f64>) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

/// A quaternion orientation `(x, y, z, w)`.
///
/// Stored unnormalized as received; [`Quat::validate`] is the gate every
/// consumer runs before doing math with one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    /// X (i) component.
    pub x: f64,
    /// Y (j) component.
    pub y: f64,
    /// Z (k) component.
    pub z: f64,
    /// W (scalar) component.
    pub w: f64,
}

impl Quat {
    /// The identity rotation.
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Construct from components.
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Magnitude of the quaternion.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Reject quaternions whose magnitude deviates from 1 beyond
    /// [`UNIT_NORM_TOLERANCE`].
    pub fn validate(&self) -> Result<(), GeometryError> {
        let norm = self.norm();
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(GeometryError::NotNormalized { norm });
        }
        Ok(())
    }

    pub(crate) fn to_na(self) -> UnitQuaternion<f64> {
        // nalgebra's Quaternion::new takes (w, i, j, k)
        UnitQuaternion::from_quaternion(Quaternion::new(self.w, self.x, self.y, self.z))
    }

    pub(crate) fn from_na(q: UnitQuaternion<f64>) -> Self {
        Self {
            x: q.coords.x,
            y: q.coords.y,
            z: q.coords.z,
            w: q.coords.w,
        }
    }
}

/// A 3D position plus a unit-quaternion orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in the pose's reference frame.
    pub position: Vec3,
    /// Orientation in the pose's reference frame.
    pub orientation: Quat,
}

impl Pose {
    /// Construct from position and orientation.
    pub const fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Validate the orientation's unit norm.
    pub fn validate(&self) -> Result<(), GeometryError> {
        self.orientation.validate()
    }
}

/// A rigid transform mapping poses expressed in `child_frame` into
/// `parent_frame`, valid at or near `stamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    /// Frame the transform maps into.
    pub parent_frame: String,
    /// Frame the transform maps from.
    pub child_frame: String,
    /// Translation component, in meters.
    pub translation: Vec3,
    /// Rotation component.
    pub rotation: Quat,
    /// Time at which the transform was observed.
    pub stamp: DateTime<Utc>,
}

impl FrameTransform {
    /// Build a transform stamped now. Used for fixed offsets composed on the
    /// fly rather than looked up from the transform provider.
    pub fn fixed(
        parent_frame: impl Into<String>,
        child_frame: impl Into<String>,
        translation: Vec3,
        rotation: Quat,
    ) -> Self {
        Self {
            parent_frame: parent_frame.into(),
            child_frame: child_frame.into(),
            translation,
            rotation,
            stamp: Utc::now(),
        }
    }

    /// Compose a pose expressed in the child frame into the parent frame:
    /// `p' = R·p + t`, `q' = R·q`.
    pub fn transform_pose(&self, pose: &Pose) -> Pose {
        let rotation = self.rotation.to_na();
        let position = rotation.transform_vector(&pose.position.to_na()) + self.translation.to_na();
        let orientation = rotation * pose.orientation.to_na();
        Pose {
            position: Vec3::from_na(position),
            orientation: Quat::from_na(orientation),
        }
    }

    /// Age of the transform relative to `now`, in milliseconds.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.stamp).num_milliseconds()
    }

    /// The child frame's origin as a pose in the parent frame.
    pub fn origin_pose(&self) -> Pose {
        Pose {
            position: self.translation,
            orientation: self.rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < TOL, "expected {} ≈ {}", a, b);
    }

    #[test]
    fn identity_transform_preserves_pose() {
        let tf = FrameTransform::fixed("base", "child", Vec3::ZERO, Quat::IDENTITY);
        let pose = Pose::new(Vec3::new(0.1, 0.2, 0.3), Quat::IDENTITY);
        let out = tf.transform_pose(&pose);
        assert_eq!(out, pose);
    }

    #[test]
    fn translation_only_transform_offsets_position() {
        let tf = FrameTransform::fixed("base", "child", Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY);
        let out = tf.transform_pose(&Pose::new(Vec3::new(0.5, 0.0, -1.0), Quat::IDENTITY));
        assert_close(out.position.x, 1.5);
        assert_close(out.position.y, 2.0);
        assert_close(out.position.z, 2.0);
        assert_eq!(out.orientation, Quat::IDENTITY);
    }

    #[test]
    fn rotation_rotates_both_position_and_orientation() {
        // 180 degrees about Z
        let half_turn = Quat::new(0.0, 0.0, 1.0, 0.0);
        let tf = FrameTransform::fixed("base", "child", Vec3::ZERO, half_turn);
        let out = tf.transform_pose(&Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY));
        assert_close(out.position.x, -1.0);
        assert_close(out.position.y, 0.0);
        // orientation picks up the frame rotation
        assert_close(out.orientation.z.abs(), 1.0);
    }

    #[test]
    fn chained_composition_matches_sequential_application() {
        let first = FrameTransform::fixed(
            "base",
            "mid",
            Vec3::new(-0.23, 0.0, 0.02),
            Quat::IDENTITY,
        );
        let second = FrameTransform::fixed(
            "base",
            "target",
            Vec3::new(0.1, 0.2, 0.0),
            Quat::new(0.0, 0.0, 1.0, 0.0),
        );
        let pose = Pose::new(Vec3::new(0.01, -0.005, 0.17), Quat::IDENTITY);
        let out = second.transform_pose(&first.transform_pose(&pose));
        // first: (-0.22, -0.005, 0.19); second rotates 180 about Z then offsets
        assert_close(out.position.x, 0.1 + 0.22);
        assert_close(out.position.y, 0.2 + 0.005);
        assert_close(out.position.z, 0.19);
    }

    #[test]
    fn non_normalized_quaternion_is_rejected() {
        let q = Quat::new(0.0, 0.0, 0.0, 0.5);
        assert!(q.validate().is_err());
        assert!(Quat::IDENTITY.validate().is_ok());
    }

    #[test]
    fn age_is_measured_against_stamp() {
        let tf = FrameTransform::fixed("base", "child", Vec3::ZERO, Quat::IDENTITY);
        let later = tf.stamp + chrono::Duration::milliseconds(1500);
        assert_eq!(tf.age_ms(later), 1500);
    }
}
