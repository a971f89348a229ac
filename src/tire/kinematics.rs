// tire/kinematics.rs
//
// Wheel basis + slip decomposition in world space, plus the steering
// geometry. The Sample stage calls into this to refresh per-wheel contact
// frames before the force passes run.

use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;

use crate::registry::{VehicleState, WheelState};
use crate::terrain::TerrainSample;
use crate::tire::types::WheelId;

/// World-space velocity of a point rigidly attached to the body:
/// v(p) = v_com + w x (p - com)
#[inline]
pub fn point_velocity(
    linvel: Vector<Real>,
    angvel: Vector<Real>,
    com: Point<Real>,
    p: Point<Real>,
) -> Vector<Real> {
    let r = p.coords - com.coords;
    linvel + angvel.cross(&r)
}

/// Ackermann front-axle split: `base` is the bicycle-model steer angle at
/// the centerline; returns (left, right) wheel angles in radians.
pub fn ackermann_angles(base: f32, wheelbase: f32, track: f32) -> (f32, f32) {
    let eps = 1e-4;
    if base.abs() < eps {
        return (0.0, 0.0);
    }

    let sign = base.signum();
    let a = base.abs();

    // Turning radius of the centerline bicycle model.
    let r = wheelbase / a.tan();
    let r_in = (r - track * 0.5).max(0.01);
    let r_out = (r + track * 0.5).max(0.01);

    let inner = (wheelbase / r_in).atan() * sign;
    let outer = (wheelbase / r_out).atan() * sign;

    // Turning left (base > 0): left wheel is inside.
    if sign > 0.0 { (inner, outer) } else { (outer, inner) }
}

/// Per-wheel steer angle: ackermann-blended for the front axle, zero rear.
pub fn wheel_steer_angle(vehicle: &VehicleState, wheel_index: usize) -> f32 {
    let id = WheelId::from_index(wheel_index);
    if id.is_rear() {
        return 0.0;
    }
    let base = vehicle.steer_angle;
    let (left, right) =
        ackermann_angles(base, vehicle.profile.wheelbase, vehicle.profile.track_width);
    let blend = vehicle.profile.ackermann;
    let ack = if id == WheelId::FL { left } else { right };
    (1.0 - blend) * base + blend * ack
}

/// (forward, side) unit vectors for a wheel, projected onto the ground
/// plane. Side follows the right-hand rule with world up.
pub fn wheel_basis(
    rotation: &UnitQuaternion<Real>,
    steer_angle: f32,
) -> (Vector<Real>, Vector<Real>) {
    let up = vector![0.0, 1.0, 0.0];
    let steer_rot = UnitQuaternion::from_axis_angle(&Vector::y_axis(), steer_angle);
    let chassis_forward = rotation * vector![0.0, 0.0, -1.0];
    let steered = steer_rot * chassis_forward;

    let planar = steered - up * steered.dot(&up);
    let forward = if planar.magnitude() > 1e-6 {
        planar.normalize()
    } else {
        vector![0.0, 0.0, -1.0]
    };
    let side = forward.cross(&up).normalize();
    (forward, side)
}

/// Slip ratio estimate from torque demand versus traction capacity. A drive
/// surplus spins the wheel up (positive slip); a brake demand past the
/// traction limit walks the wheel toward lock (slip -> -1).
pub fn slip_ratio_estimate(
    wheel: &WheelState,
    vehicle: &VehicleState,
    terrain: &TerrainSample,
    normal_force: f32,
) -> f32 {
    let capacity = (terrain.friction * normal_force).max(1e-3);
    let radius = wheel.radius.max(1e-3);

    if wheel.powered && vehicle.throttle.abs() > 1e-3 {
        let demand =
            (vehicle.throttle * vehicle.profile.max_engine_torque).abs()
                / (super::longitudinal::DRIVEN_WHEELS * radius);
        let surplus = (demand - capacity).max(0.0);
        return (surplus / capacity).min(2.0) * vehicle.throttle.signum();
    }

    if vehicle.brake > 1e-3 && wheel.v_long.abs() > 0.5 {
        let demand = vehicle.brake * vehicle.profile.max_brake_torque / radius;
        if demand > capacity {
            let lock_fraction = ((demand - capacity) / capacity).clamp(0.0, 1.0);
            return -lock_fraction;
        }
    }

    // Free rolling: wheel surface speed tracks ground speed.
    let surface_speed = wheel.rpm * core::f32::consts::TAU * radius / 60.0;
    (surface_speed - wheel.v_long) / wheel.v_long.abs().max(0.5)
}

/// Slip angle from the contact-frame velocity decomposition, stable around
/// zero speed.
#[inline]
pub fn slip_angle(v_long: f32, v_lat: f32) -> f32 {
    v_lat.atan2(v_long.abs().max(0.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HAULER, RUNABOUT};
    use crate::registry::VehicleRegistry;
    use crate::terrain::TerrainType;
    use rapier3d::prelude::RigidBodyHandle;

    #[test]
    fn ackermann_inner_wheel_turns_tighter() {
        let (left, right) = ackermann_angles(0.4, 2.5, 1.5);
        assert!(left > right);
        let (left, right) = ackermann_angles(-0.4, 2.5, 1.5);
        assert!(right.abs() > left.abs());
    }

    #[test]
    fn wheel_basis_is_orthonormal_and_planar() {
        let rot = UnitQuaternion::from_axis_angle(&Vector::y_axis(), 0.7);
        let (forward, side) = wheel_basis(&rot, 0.3);
        assert!((forward.magnitude() - 1.0).abs() < 1e-5);
        assert!((side.magnitude() - 1.0).abs() < 1e-5);
        assert!(forward.dot(&side).abs() < 1e-5);
        assert!(forward.y.abs() < 1e-5);
    }

    #[test]
    fn point_velocity_adds_rotational_term() {
        let v = point_velocity(
            vector![1.0, 0.0, 0.0],
            vector![0.0, 1.0, 0.0],
            point![0.0, 0.0, 0.0],
            point![0.0, 0.0, -2.0],
        );
        // w x r = (0,1,0) x (0,0,-2) = (-2, 0, 0)
        assert!((v.x - (1.0 - 2.0)).abs() < 1e-6);
    }

    #[test]
    fn hard_braking_past_capacity_walks_toward_lock() {
        let mut reg = VehicleRegistry::new(1);
        let slot = reg.register(HAULER, RigidBodyHandle::invalid()).unwrap();
        let mut vehicle = reg.vehicle(slot).unwrap().clone();
        let mut wheel = reg.wheels(slot)[0].clone();

        vehicle.brake = 1.0;
        wheel.v_long = 15.0;
        let mud = crate::terrain::TerrainSample::from_type(TerrainType::Mud, 0.0);
        let fz = vehicle.mass * crate::config::GRAVITY / 4.0;

        let slip = slip_ratio_estimate(&wheel, &vehicle, &mud, fz);
        assert!(slip < -0.5);
    }

    #[test]
    fn moderate_throttle_on_road_stays_below_tc_threshold() {
        let mut reg = VehicleRegistry::new(1);
        let slot = reg.register(RUNABOUT, RigidBodyHandle::invalid()).unwrap();
        let mut vehicle = reg.vehicle(slot).unwrap().clone();
        let mut wheel = reg.wheels(slot)[2].clone();

        vehicle.throttle = 0.4;
        wheel.v_long = 10.0;
        wheel.rpm = wheel.v_long / (core::f32::consts::TAU * wheel.radius) * 60.0;
        let road = crate::terrain::TerrainSample::from_type(TerrainType::Road, 0.0);
        let fz = vehicle.mass * crate::config::GRAVITY / 4.0;

        let slip = slip_ratio_estimate(&wheel, &vehicle, &road, fz);
        assert!(slip.abs() < 0.15);
    }
}
