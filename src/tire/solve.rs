// tire/solve.rs
//
// Per-wheel entry point. Pure function of (wheel, vehicle, terrain, dt):
// suspension + longitudinal + lateral, with the friction circle enforced by
// scaling the combined planar force back onto the limit. The wheel pass runs
// this across all wheel slots in parallel, so nothing here may touch shared
// mutable state.

use rapier3d::prelude::*;

use crate::config::{GRAVITY, WHEELS_PER_VEHICLE};
use crate::registry::{VehicleState, WheelState};
use crate::terrain::TerrainSample;
use crate::tire::lateral::solve_lateral;
use crate::tire::longitudinal::solve_longitudinal;
use crate::tire::suspension::suspension_force;
use crate::tire::types::ForceOutput;

/// Even static weight distribution: Fz = m*g / 4. A load-transfer model can
/// replace this as long as the friction-circle clamp below survives.
#[inline]
pub fn wheel_normal_force(vehicle: &VehicleState) -> f32 {
    vehicle.mass * GRAVITY / WHEELS_PER_VEHICLE as f32
}

pub fn compute_wheel_force(
    wheel: &WheelState,
    vehicle: &VehicleState,
    terrain: &TerrainSample,
    dt: f32,
) -> ForceOutput {
    if !terrain.is_valid || !wheel.grounded {
        return ForceOutput::invalid();
    }

    let normal_force = wheel_normal_force(vehicle);
    let suspension = suspension_force(wheel, dt);

    let long = solve_longitudinal(wheel, vehicle, terrain, normal_force);
    let lateral = solve_lateral(wheel, vehicle, terrain, normal_force);

    let mut drive = long.drive;
    let mut brake = long.brake + long.rolling;
    let mut lat = lateral;

    // Friction circle: combined planar force never exceeds mu * Fz.
    let limit = terrain.friction * normal_force;
    let planar = ((drive + brake) * (drive + brake) + lat * lat).sqrt();
    if planar > limit {
        let scale = limit / planar;
        drive *= scale;
        brake *= scale;
        lat *= scale;
    }

    let up = vector![0.0, 1.0, 0.0];
    let force = wheel.forward * (drive + brake) + wheel.side * lat + up * suspension;

    // Torque about the vehicle COM from applying the force at the contact.
    let r = wheel.contact_point.coords - vehicle.com.coords;
    let torque = r.cross(&force);

    // Updated rotational state for animation: the contact surface speed
    // corrected by the current slip estimate.
    let surface_speed = wheel.v_long * (1.0 + wheel.slip_ratio);
    let rpm = surface_speed / (core::f32::consts::TAU * wheel.radius.max(1e-3)) * 60.0;

    ForceOutput {
        force,
        torque,
        rpm,
        valid: true,
        suspension_force: suspension,
        drive_force: drive,
        brake_force: brake,
        lateral_force: lat,
        forward: wheel.forward,
        side: wheel.side,
    }
}
