// src/water.rs
//
// Buoyancy and drag for water vehicles, plus the sinking path for land
// vehicles that drive into a water volume. Submersion past the destruction
// depth for a sustained duration is a terminal state transition: the vehicle
// is flagged destroyed and the pipeline unregisters it after the tick.

use rapier3d::prelude::*;

use crate::config::{GRAVITY, WaterConfig};
use crate::registry::VehicleState;
use crate::tire::types::VehicleForce;

pub struct WaterPhysics {
    cfg: WaterConfig,
    wave_phase: f32,
}

impl WaterPhysics {
    pub fn new(cfg: WaterConfig) -> Self {
        Self {
            cfg,
            wave_phase: rand::random::<f32>() * core::f32::consts::TAU,
        }
    }

    /// Hull volume from mass and an assumed hull density well below water,
    /// so an intact hull always has positive reserve buoyancy.
    pub fn hull_volume(&self, mass: f32) -> f32 {
        mass / self.cfg.hull_density
    }

    /// Buoyancy + submerged drag + wave bobbing for a water vehicle.
    /// `depth` is how far the waterline sits above the hull bottom.
    pub fn buoyancy(&self, vehicle: &VehicleState, depth: f32, now: f64) -> VehicleForce {
        let mut out = VehicleForce::zero();
        if depth <= 0.0 {
            return out;
        }

        let hull_height = vehicle.profile.hull_height.max(1e-3);
        let submerged_fraction = (depth / hull_height).clamp(0.0, 1.0);
        let submerged_volume = self.hull_volume(vehicle.mass) * submerged_fraction;

        // F_b = V_sub * rho * g, straight up.
        let buoyancy = submerged_volume * self.cfg.density * GRAVITY;

        // Quadratic water resistance opposing velocity, scaled by how much
        // hull is actually in the water.
        let speed = vehicle.speed();
        let resistance = if speed > 1e-3 {
            let magnitude = 0.5
                * self.cfg.density
                * vehicle.profile.drag_coefficient
                * vehicle.profile.frontal_area
                * speed
                * speed
                * submerged_fraction;
            -vehicle.linvel.normalize() * magnitude
        } else {
            vector![0.0, 0.0, 0.0]
        };

        // Wave lift rides on top of the buoyancy term for visual bobbing.
        let wave = (self.cfg.wave_frequency * now as f32 + self.wave_phase).sin()
            * self.cfg.wave_amplitude
            * buoyancy
            * 0.5;

        out.force = vector![0.0, buoyancy + wave, 0.0] + resistance;
        out.valid = true;
        out
    }

    /// Land vehicle in a water volume: heavy linear drag plus a constant
    /// downward pull. Advances the submersion timer and reports whether the
    /// destruction threshold has been crossed.
    pub fn sinking(&self, vehicle: &mut VehicleState, depth: f32, dt: f32) -> VehicleForce {
        let mut out = VehicleForce::zero();
        if depth <= 0.0 {
            vehicle.submersion_timer = 0.0;
            vehicle.depth_below_water = 0.0;
            return out;
        }

        vehicle.depth_below_water = depth;
        if depth > self.cfg.destruction_depth {
            vehicle.submersion_timer += dt;
            if vehicle.submersion_timer >= self.cfg.destruction_time {
                vehicle.destroyed = true;
            }
        } else {
            vehicle.submersion_timer = 0.0;
        }

        out.force = -vehicle.linvel * (self.cfg.sink_drag * vehicle.mass * 0.1)
            + vector![0.0, -self.cfg.sink_force, 0.0];
        out.valid = true;
        out
    }
}
