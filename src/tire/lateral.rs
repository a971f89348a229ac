// tire/lateral.rs
//
// Linear cornering model: lateral force proportional to slip angle, with
// cornering stiffness scaling with surface friction and the usual Coulomb
// clamp. Good enough below the limit; past the limit the combined-slip
// scaling in solve.rs takes over.

use crate::registry::{VehicleState, WheelState};
use crate::terrain::TerrainSample;

#[inline]
pub fn cornering_stiffness(vehicle: &VehicleState, friction: f32) -> f32 {
    vehicle.profile.cornering_stiffness * friction
}

/// Signed lateral force (N) along the wheel's side direction.
pub fn solve_lateral(
    wheel: &WheelState,
    vehicle: &VehicleState,
    terrain: &TerrainSample,
    normal_force: f32,
) -> f32 {
    let limit = terrain.friction * normal_force;
    let force = -cornering_stiffness(vehicle, terrain.friction) * wheel.slip_angle;
    force.clamp(-limit, limit)
}
