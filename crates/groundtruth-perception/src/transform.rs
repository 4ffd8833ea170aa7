//! Frame Transformer.
//!
//! Converts an object's world-space pose, bounding size and motion into the
//! sensor's local frame.  The engine stores poses in a y-up, z-forward basis;
//! detections are reported in a z-up, x-forward sensor frame, so every output
//! goes through a fixed axis re-mapping.
//!
//! # Example
//!
//! ```rust
//! use groundtruth_perception::transform::{
//!     to_sensor_frame, MotionSources, ObjectObservation, Pose3D, Quaternion, Vec3,
//! };
//!
//! let sensor = Pose3D::identity();
//! let object = ObjectObservation {
//!     pose: Pose3D::new(Vec3::new(0.0, 0.0, 10.0), Quaternion::identity()),
//!     size: Vec3::new(2.0, 4.0, 1.5),
//!     forward: Vec3::forward(),
//!     motion: MotionSources::default(),
//! };
//!
//! let local = to_sensor_frame(&sensor, &object);
//! assert!((local.bbox.position.position.x - 10.0).abs() < 1e-5);
//! ```

use groundtruth_types::{BoundingBox3D, Orientation, Point, Pose, Twist, Vector3};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector in engine space (x right, y up, z forward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Engine forward axis (+z).
    pub fn forward() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `degrees` about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, degrees: f32) -> Self {
        let half = degrees.to_radians() * 0.5;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Build a rotation from Euler angles in degrees using the engine's
    /// composition order: `z` first, then `x`, then `y`.
    pub fn from_euler(x_deg: f32, y_deg: f32, z_deg: f32) -> Self {
        let qx = Self::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), x_deg);
        let qy = Self::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), y_deg);
        let qz = Self::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), z_deg);
        qy.mul(qx).mul(qz)
    }

    /// Decompose into Euler angles in degrees, inverse of
    /// [`Quaternion::from_euler`].  Each angle is normalised to `[0, 360)`.
    pub fn to_euler(self) -> Vec3 {
        let Self { w, x, y, z } = self;

        // Rotation matrix entries needed for the Y·X·Z factorisation.
        let r02 = 2.0 * (x * z + w * y);
        let r22 = 1.0 - 2.0 * (x * x + y * y);
        let r12 = 2.0 * (y * z - w * x);
        let r10 = 2.0 * (x * y + w * z);
        let r11 = 1.0 - 2.0 * (x * x + z * z);
        let r20 = 2.0 * (x * z - w * y);
        let r00 = 1.0 - 2.0 * (y * y + z * z);

        let sin_x = (-r12).clamp(-1.0, 1.0);
        let (ax, ay, az) = if sin_x.abs() < 0.999_999 {
            (sin_x.asin(), r02.atan2(r22), r10.atan2(r11))
        } else {
            // Gimbal lock: fold the roll into the yaw.
            (sin_x.asin(), (-r20).atan2(r00), 0.0)
        };

        Vec3::new(
            normalize_degrees(ax.to_degrees()),
            normalize_degrees(ay.to_degrees()),
            normalize_degrees(az.to_degrees()),
        )
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// World direction of this rotation's forward axis.
    pub fn forward(self) -> Vec3 {
        self.rotate(Vec3::forward())
    }
}

fn normalize_degrees(deg: f32) -> f32 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body pose in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3D {
    pub position: Vec3,
    pub rotation: Quaternion,
}

impl Pose3D {
    pub fn new(position: Vec3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Pose of a child mounted at `offset` (expressed in this pose's frame).
    pub fn compose(self, offset: Self) -> Self {
        let position = self.position.add(self.rotation.rotate(offset.position));
        Self::new(position, self.rotation.mul(offset.rotation))
    }

    /// Express a world-space point in this pose's local basis.
    pub fn inverse_transform_point(self, world: Vec3) -> Vec3 {
        self.rotation.conjugate().rotate(world.sub(self.position))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motion capabilities
// ────────────────────────────────────────────────────────────────────────────

/// Linear and angular velocity of a generic physics body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyMotion {
    pub linear: Vec3,
    /// Radians per second about each world axis.
    pub angular: Vec3,
}

/// The velocity capabilities an object happens to carry.
///
/// An AI-driven mover reports its own commanded velocity, which takes
/// priority over whatever the physics body says.  Objects with neither are
/// treated as static.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSources {
    pub agent_velocity: Option<Vec3>,
    pub rigid_body: Option<RigidBodyMotion>,
}

impl MotionSources {
    pub fn linear_velocity(&self) -> Vec3 {
        self.agent_velocity
            .or(self.rigid_body.map(|rb| rb.linear))
            .unwrap_or_else(Vec3::zero)
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.rigid_body
            .map(|rb| rb.angular)
            .unwrap_or_else(Vec3::zero)
    }
}

/// Everything the physics engine exposes about an observed object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectObservation {
    /// World pose of the bounding-volume centre.
    pub pose: Pose3D,
    /// World-axis bounding size (x width, y height, z depth).
    pub size: Vec3,
    /// World direction the object is heading.
    pub forward: Vec3,
    pub motion: MotionSources,
}

/// An observation re-expressed in the sensor frame, ready for a detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalState {
    pub bbox: BoundingBox3D,
    pub velocity: Twist,
}

// ────────────────────────────────────────────────────────────────────────────
// Transform
// ────────────────────────────────────────────────────────────────────────────

/// Express `object` relative to `sensor` in the sensor's z-up frame.
///
/// `sensor` is the pose of the mounted sensing frame; it supplies both the
/// origin and the rotation the object is measured against.
///
/// Pure: identical inputs always produce bit-identical output.
pub fn to_sensor_frame(sensor: &Pose3D, object: &ObjectObservation) -> LocalState {
    let local = sensor.inverse_transform_point(object.pose.position);
    let position = Point {
        x: local.z,
        y: -local.x,
        z: local.y,
    };

    let relative = sensor.rotation.conjugate().mul(object.pose.rotation);
    let angles = relative.to_euler();
    let roll = -angles.z;
    let pitch = -angles.x;
    let yaw = angles.y;
    let q = Quaternion::from_euler(pitch, roll, yaw);

    let size = Vector3 {
        x: object.size.x,
        y: object.size.z,
        z: object.size.y,
    };

    let speed = object.motion.linear_velocity().dot(object.forward);
    let yaw_rate = -object.motion.angular_velocity().y;

    LocalState {
        bbox: BoundingBox3D {
            position: Pose {
                position,
                orientation: Orientation {
                    x: q.x,
                    y: q.y,
                    z: q.z,
                    w: q.w,
                },
            },
            size,
        },
        velocity: Twist {
            linear: Vector3 {
                x: speed,
                y: 0.0,
                z: 0.0,
            },
            angular: Vector3 {
                x: 0.0,
                y: 0.0,
                z: yaw_rate,
            },
        },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_1_SQRT_2;

    fn static_object(position: Vec3, rotation: Quaternion) -> ObjectObservation {
        ObjectObservation {
            pose: Pose3D::new(position, rotation),
            size: Vec3::new(2.0, 4.0, 1.5),
            forward: rotation.forward(),
            motion: MotionSources::default(),
        }
    }

    fn yaw(deg: f32) -> Quaternion {
        Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), deg)
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let prod = q.mul(q.conjugate());
        assert!((prod.w - 1.0).abs() < 1e-5);
        assert!(prod.x.abs() < 1e-5);
        assert!(prod.y.abs() < 1e-5);
        assert!(prod.z.abs() < 1e-5);
    }

    #[test]
    fn euler_roundtrip_recovers_angles() {
        let q = Quaternion::from_euler(20.0, 130.0, 45.0);
        let e = q.to_euler();
        assert!((e.x - 20.0).abs() < 1e-3, "x={}", e.x);
        assert!((e.y - 130.0).abs() < 1e-3, "y={}", e.y);
        assert!((e.z - 45.0).abs() < 1e-3, "z={}", e.z);
    }

    #[test]
    fn euler_angles_are_normalised_positive() {
        let e = yaw(-90.0).to_euler();
        assert!((e.y - 270.0).abs() < 1e-3, "y={}", e.y);
        assert!(e.x >= 0.0 && e.x < 360.0);
        assert!(e.z >= 0.0 && e.z < 360.0);
    }

    #[test]
    fn forward_of_yawed_rotation() {
        let f = yaw(90.0).forward();
        assert!((f.x - 1.0).abs() < 1e-5);
        assert!(f.z.abs() < 1e-5);
    }

    // ── Pose3D ──────────────────────────────────────────────────────────────

    #[test]
    fn compose_applies_mount_offset_in_parent_frame() {
        let vehicle = Pose3D::new(Vec3::new(5.0, 0.0, 0.0), yaw(90.0));
        let mount = Pose3D::new(Vec3::new(0.0, 2.0, 1.0), Quaternion::identity());
        let sensor = vehicle.compose(mount);
        assert!((sensor.position.x - 6.0).abs() < 1e-5);
        assert!((sensor.position.y - 2.0).abs() < 1e-5);
        assert!(sensor.position.z.abs() < 1e-5);
    }

    // ── to_sensor_frame ─────────────────────────────────────────────────────

    #[test]
    fn object_ahead_maps_to_first_coordinate() {
        let sensor = Pose3D::identity();
        let object = static_object(Vec3::new(0.0, 0.0, 10.0), Quaternion::identity());
        let local = to_sensor_frame(&sensor, &object);

        let p = local.bbox.position.position;
        assert!((p.x - 10.0).abs() < 1e-5);
        assert!(p.y.abs() < 1e-5);
        assert!(p.z.abs() < 1e-5);

        let o = local.bbox.position.orientation;
        assert!((o.w - 1.0).abs() < 1e-5);
        assert!(o.x.abs() < 1e-5 && o.y.abs() < 1e-5 && o.z.abs() < 1e-5);

        assert_eq!(local.bbox.size, Vector3 { x: 2.0, y: 1.5, z: 4.0 });
        assert_eq!(local.velocity, Twist::default());
    }

    #[test]
    fn object_to_the_right_has_negative_lateral_offset() {
        let sensor = Pose3D::identity();
        let object = static_object(Vec3::new(3.0, 1.0, 0.0), Quaternion::identity());
        let p = to_sensor_frame(&sensor, &object).bbox.position.position;
        assert!(p.x.abs() < 1e-5);
        assert!((p.y + 3.0).abs() < 1e-5);
        assert!((p.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn position_is_expressed_in_rotated_sensor_basis() {
        // Sensor turned to face world +x; an object 10 m along +x is dead ahead.
        let sensor = Pose3D::new(Vec3::zero(), yaw(90.0));
        let object = static_object(Vec3::new(10.0, 0.0, 0.0), Quaternion::identity());
        let p = to_sensor_frame(&sensor, &object).bbox.position.position;
        assert!((p.x - 10.0).abs() < 1e-4, "x={}", p.x);
        assert!(p.y.abs() < 1e-4, "y={}", p.y);
    }

    #[test]
    fn engine_yaw_becomes_rotation_about_vertical_axis() {
        let sensor = Pose3D::identity();
        let object = static_object(Vec3::new(0.0, 0.0, 10.0), yaw(90.0));
        let o = to_sensor_frame(&sensor, &object).bbox.position.orientation;
        assert!((o.w - FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((o.z - FRAC_1_SQRT_2).abs() < 1e-5);
        assert!(o.x.abs() < 1e-5 && o.y.abs() < 1e-5);
    }

    #[test]
    fn negative_yaw_keeps_wrapped_quaternion_sign() {
        // -90 decomposes to 270, which re-encodes with a negative w.
        let sensor = Pose3D::identity();
        let object = static_object(Vec3::new(0.0, 0.0, 10.0), yaw(-90.0));
        let o = to_sensor_frame(&sensor, &object).bbox.position.orientation;
        assert!((o.w + FRAC_1_SQRT_2).abs() < 1e-4, "w={}", o.w);
        assert!((o.z - FRAC_1_SQRT_2).abs() < 1e-4, "z={}", o.z);
    }

    #[test]
    fn linear_velocity_is_speed_along_heading() {
        let sensor = Pose3D::identity();
        let mut object = static_object(Vec3::new(0.0, 0.0, 10.0), Quaternion::identity());
        object.motion.rigid_body = Some(RigidBodyMotion {
            linear: Vec3::new(3.0, 0.0, -4.0),
            angular: Vec3::new(0.1, 0.5, 0.2),
        });
        let v = to_sensor_frame(&sensor, &object).velocity;
        assert!((v.linear.x + 4.0).abs() < 1e-6);
        assert_eq!(v.linear.y, 0.0);
        assert_eq!(v.linear.z, 0.0);
        assert!((v.angular.z + 0.5).abs() < 1e-6);
        assert_eq!(v.angular.x, 0.0);
        assert_eq!(v.angular.y, 0.0);
    }

    #[test]
    fn agent_velocity_takes_priority_over_rigid_body() {
        let motion = MotionSources {
            agent_velocity: Some(Vec3::new(0.0, 0.0, 7.0)),
            rigid_body: Some(RigidBodyMotion {
                linear: Vec3::new(0.0, 0.0, 1.0),
                angular: Vec3::new(0.0, 0.3, 0.0),
            }),
        };
        assert_eq!(motion.linear_velocity(), Vec3::new(0.0, 0.0, 7.0));
        // Angular rate still comes from the physics body.
        assert_eq!(motion.angular_velocity(), Vec3::new(0.0, 0.3, 0.0));
    }

    #[test]
    fn agent_without_rigid_body_has_zero_yaw_rate() {
        let motion = MotionSources {
            agent_velocity: Some(Vec3::new(1.0, 0.0, 0.0)),
            rigid_body: None,
        };
        assert_eq!(motion.angular_velocity(), Vec3::zero());
    }

    #[test]
    fn transform_is_deterministic() {
        let sensor = Pose3D::new(Vec3::new(1.5, 0.3, -2.0), Quaternion::from_euler(3.0, 47.0, 1.0));
        let mut object = static_object(Vec3::new(12.0, 0.5, 8.0), Quaternion::from_euler(0.0, 211.0, 4.0));
        object.motion.rigid_body = Some(RigidBodyMotion {
            linear: Vec3::new(2.0, 0.0, 5.0),
            angular: Vec3::new(0.0, 0.25, 0.0),
        });
        let first = to_sensor_frame(&sensor, &object);
        for _ in 0..16 {
            let again = to_sensor_frame(&sensor, &object);
            assert_eq!(
                first.bbox.position.orientation.w.to_bits(),
                again.bbox.position.orientation.w.to_bits()
            );
            assert_eq!(first, again);
        }
    }
}
