// tire/longitudinal.rs
//
// Engine + brake + rolling resistance along the wheel's forward direction.
// Forces are friction-clamped individually here; the combined clamp against
// the lateral component happens in solve.rs.

use crate::registry::{VehicleState, WheelState};
use crate::terrain::TerrainSample;

/// Driven wheels share the engine torque (rear axle in this design).
pub const DRIVEN_WHEELS: f32 = 2.0;

/// Below this ground speed brakes and rolling resistance shut off instead of
/// jittering the body around zero.
const SPEED_DEADZONE: f32 = 0.05;

pub struct LongitudinalResult {
    pub drive: f32,     // signed force along forward, N
    pub brake: f32,     // signed, opposes v_long
    pub rolling: f32,   // signed, opposes v_long
}

pub fn solve_longitudinal(
    wheel: &WheelState,
    vehicle: &VehicleState,
    terrain: &TerrainSample,
    normal_force: f32,
) -> LongitudinalResult {
    let traction_limit = terrain.friction * normal_force;

    // Engine torque reaches the ground scaled by surface friction: a spinning
    // wheel on mud simply cannot transmit the full torque.
    let drive = if wheel.powered {
        let force = vehicle.throttle * vehicle.profile.max_engine_torque * terrain.friction
            / (DRIVEN_WHEELS * wheel.radius.max(1e-3));
        force.clamp(-traction_limit, traction_limit)
    } else {
        0.0
    };

    let moving = wheel.v_long.abs() > SPEED_DEADZONE;
    let direction = -wheel.v_long.signum();

    // Brakes oppose the rolling direction, never push the vehicle forward.
    let brake = if moving && vehicle.brake > 0.0 {
        let demand = vehicle.brake * vehicle.profile.max_brake_torque / wheel.radius.max(1e-3);
        direction * demand.min(traction_limit)
    } else {
        0.0
    };

    let rolling = if moving {
        direction * terrain.rolling_resistance * normal_force
    } else {
        0.0
    };

    LongitudinalResult { drive, brake, rolling }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RUNABOUT;
    use crate::registry::VehicleRegistry;
    use crate::terrain::{TerrainSample, TerrainType};
    use rapier3d::prelude::RigidBodyHandle;

    fn rig() -> (VehicleState, WheelState) {
        let mut reg = VehicleRegistry::new(1);
        let slot = reg.register(RUNABOUT, RigidBodyHandle::invalid()).unwrap();
        let vehicle = reg.vehicle(slot).unwrap().clone();
        let wheel = reg.wheels(slot)[2].clone(); // rear, powered
        (vehicle, wheel)
    }

    fn fz(vehicle: &VehicleState) -> f32 {
        vehicle.mass * crate::config::GRAVITY / 4.0
    }

    #[test]
    fn road_transmits_more_drive_than_sand_at_same_throttle() {
        let (mut vehicle, mut wheel) = rig();
        vehicle.throttle = 1.0;
        wheel.v_long = 8.0;

        let road = TerrainSample::from_type(TerrainType::Road, 0.0);
        let sand = TerrainSample::from_type(TerrainType::Sand, 0.0);
        let n = fz(&vehicle);

        let on_road = solve_longitudinal(&wheel, &vehicle, &road, n);
        let on_sand = solve_longitudinal(&wheel, &vehicle, &sand, n);
        assert!(on_road.drive > on_sand.drive);
    }

    #[test]
    fn stationary_vehicle_produces_no_longitudinal_force() {
        let (mut vehicle, mut wheel) = rig();
        vehicle.throttle = 0.0;
        vehicle.brake = 0.0;
        wheel.v_long = 0.0;

        let road = TerrainSample::from_type(TerrainType::Road, 0.0);
        let out = solve_longitudinal(&wheel, &vehicle, &road, fz(&vehicle));
        assert_eq!(out.drive, 0.0);
        assert_eq!(out.brake, 0.0);
        assert_eq!(out.rolling, 0.0);
    }

    #[test]
    fn brake_opposes_motion_in_both_directions() {
        let (mut vehicle, mut wheel) = rig();
        vehicle.brake = 1.0;
        let road = TerrainSample::from_type(TerrainType::Road, 0.0);
        let n = fz(&vehicle);

        wheel.v_long = 10.0;
        assert!(solve_longitudinal(&wheel, &vehicle, &road, n).brake < 0.0);

        wheel.v_long = -10.0;
        assert!(solve_longitudinal(&wheel, &vehicle, &road, n).brake > 0.0);
    }

    #[test]
    fn unpowered_wheel_gets_no_drive() {
        let (mut vehicle, mut wheel) = rig();
        vehicle.throttle = 1.0;
        wheel.powered = false;
        wheel.v_long = 5.0;

        let road = TerrainSample::from_type(TerrainType::Road, 0.0);
        let out = solve_longitudinal(&wheel, &vehicle, &road, fz(&vehicle));
        assert_eq!(out.drive, 0.0);
    }
}
