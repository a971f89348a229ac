// src/config.rs
//
// Configuration surface for the simulation: global tuning constants plus
// named vehicle profiles. Everything here is plain data; nothing is read
// from the command line.

use serde::Serialize;

/// Global simulation tuning. One instance is injected into the pipeline at
/// construction and never mutated afterwards.
#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub max_vehicles: usize,        // arena capacity (wheels = 4x this)
    pub physics_hz: f32,            // fixed tick rate
    pub worker_threads: usize,      // 0 = let the pool pick

    // Stability-control thresholds and smoothing
    pub abs_threshold: f32,         // slip ratio above which ABS engages
    pub tc_threshold: f32,          // slip ratio above which TC engages
    pub esc_threshold: f32,         // body slip angle (radians)
    pub abs_floor: f32,             // brake multiplier target when engaged
    pub tc_floor: f32,              // drive multiplier target when engaged
    pub stability_rate: f32,        // multiplier approach rate (1/s)
    pub esc_gain: f32,              // yaw torque per radian of body slip

    // Terrain cache
    pub cache_window: f64,          // seconds a sample stays valid
    pub cache_prune_age: f64,       // seconds before an entry is dropped

    // Environment
    pub activity_transition: f32,   // seconds to ramp the activity modifier
    pub quiet_activity_level: f32,  // modifier value during quiet periods

    pub water: WaterConfig,
}

#[derive(Clone, Copy, Debug)]
pub struct WaterConfig {
    pub density: f32,               // kg/m^3
    pub hull_density: f32,          // kg/m^3, hull_volume = mass / hull_density
    pub wave_amplitude: f32,        // m
    pub wave_frequency: f32,        // rad/s
    pub sink_drag: f32,             // 1/s, extra linear drag while sinking
    pub sink_force: f32,            // N, constant downward pull while sinking
    pub destruction_depth: f32,     // m below surface
    pub destruction_time: f32,      // s sustained beyond depth
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_vehicles: 40,
            physics_hz: 60.0,
            worker_threads: 0,

            abs_threshold: 0.85,
            tc_threshold: 0.15,
            esc_threshold: 5.0_f32.to_radians(),
            abs_floor: 0.3,
            tc_floor: 0.5,
            stability_rate: 8.0,
            esc_gain: 2_200.0,

            cache_window: 1.0,
            cache_prune_age: 2.0,

            activity_transition: 3.0,
            quiet_activity_level: 0.4,

            water: WaterConfig::default(),
        }
    }
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            density: 1000.0,
            hull_density: 400.0,
            wave_amplitude: 0.18,
            wave_frequency: 1.4,
            sink_drag: 2.5,
            sink_force: 6_000.0,
            destruction_depth: 2.5,
            destruction_time: 4.0,
        }
    }
}

pub const GRAVITY: f32 = 9.81; // m/s^2
pub const WHEELS_PER_VEHICLE: usize = 4;
pub const AIR_DENSITY: f32 = 1.225; // kg/m^3

/// Per-vehicle parameter set. Stored by value on the registry entry so the
/// hot loops never chase a shared config reference.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct VehicleProfile {
    pub name: &'static str,
    pub mass: f32,                  // kg
    pub max_engine_torque: f32,     // N*m at the driven axle
    pub max_brake_torque: f32,      // N*m per wheel
    pub max_speed: f32,             // m/s
    pub linear_damping: f32,
    pub angular_damping: f32,

    // --- Geometry ---
    pub wheelbase: f32,             // m (front axle to rear axle)
    pub track_width: f32,           // m (left to right)
    pub max_steer_angle: f32,       // radians
    pub ackermann: f32,             // 0..1 blend (0 = parallel, 1 = full)
    pub frontal_area: f32,          // m^2
    pub drag_coefficient: f32,
    pub chassis_half_extents: [f32; 3],
    pub com_offset: [f32; 3],       // local offset from collider center
    pub hull_height: f32,           // m, vertical extent used for submersion

    // --- Wheels / suspension ---
    pub wheel_radius: f32,          // m
    pub wheel_width: f32,           // m
    pub suspension_travel: f32,     // m
    pub suspension_rest: f32,       // m
    pub spring_rate: f32,           // N/m
    pub damper_rate: f32,           // N*s/m
    pub cornering_stiffness: f32,   // N/rad at friction = 1.0

    pub is_water_vehicle: bool,
}

/// Spring/damper pair from static sag and damping ratio:
/// k = (m*g/4) / sag, c = 2*zeta*sqrt(k*m/4).
pub fn suspension_from_sag(vehicle_mass: f32, sag_m: f32, zeta: f32) -> (f32, f32) {
    let m = vehicle_mass / WHEELS_PER_VEHICLE as f32;
    let f_static = m * GRAVITY;
    let k = f_static / sag_m.max(1e-3);
    let c = 2.0 * zeta * (k * m).sqrt();
    (k, c)
}

/// Street car, rear wheel drive.
pub const RUNABOUT: VehicleProfile = VehicleProfile {
    name: "runabout",
    mass: 1350.0,
    max_engine_torque: 1_400.0,
    max_brake_torque: 2_600.0,
    max_speed: 55.0,
    linear_damping: 0.08,
    angular_damping: 0.6,

    wheelbase: 2.5,
    track_width: 1.5,
    max_steer_angle: 0.6,
    ackermann: 0.8,
    frontal_area: 2.2,
    drag_coefficient: 0.32,
    chassis_half_extents: [1.0, 0.35, 2.1],
    com_offset: [0.0, -0.15, 0.0],
    hull_height: 1.2,

    wheel_radius: 0.35,
    wheel_width: 0.22,
    suspension_travel: 0.4,
    suspension_rest: 0.5,
    spring_rate: 66_200.0,   // ~= suspension_from_sag(1350, 0.05, 0.9)
    damper_rate: 8_500.0,
    cornering_stiffness: 52_000.0,

    is_water_vehicle: false,
};

/// Heavy utility truck; softer assists, much higher brake torque.
pub const HAULER: VehicleProfile = VehicleProfile {
    name: "hauler",
    mass: 8_200.0,
    max_engine_torque: 6_800.0,
    max_brake_torque: 11_000.0,
    max_speed: 28.0,
    linear_damping: 0.25,
    angular_damping: 1.2,

    wheelbase: 4.1,
    track_width: 2.0,
    max_steer_angle: 0.45,
    ackermann: 0.7,
    frontal_area: 6.5,
    drag_coefficient: 0.7,
    chassis_half_extents: [1.1, 0.9, 3.4],
    com_offset: [0.0, -0.3, 0.0],
    hull_height: 2.4,

    wheel_radius: 0.55,
    wheel_width: 0.35,
    suspension_travel: 0.5,
    suspension_rest: 0.6,
    spring_rate: 310_000.0,
    damper_rate: 44_000.0,
    cornering_stiffness: 140_000.0,

    is_water_vehicle: false,
};

/// Small water craft. Wheel entries exist for arena uniformity but stay
/// airborne; buoyancy carries the hull.
pub const SKIFF: VehicleProfile = VehicleProfile {
    name: "skiff",
    mass: 900.0,
    max_engine_torque: 900.0,
    max_brake_torque: 0.0,
    max_speed: 20.0,
    linear_damping: 0.4,
    angular_damping: 1.5,

    wheelbase: 2.0,
    track_width: 1.2,
    max_steer_angle: 0.5,
    ackermann: 0.0,
    frontal_area: 1.8,
    drag_coefficient: 0.5,
    chassis_half_extents: [0.9, 0.4, 2.2],
    com_offset: [0.0, -0.2, 0.0],
    hull_height: 0.9,

    wheel_radius: 0.25,
    wheel_width: 0.15,
    suspension_travel: 0.2,
    suspension_rest: 0.25,
    spring_rate: 30_000.0,
    damper_rate: 3_500.0,
    cornering_stiffness: 18_000.0,

    is_water_vehicle: true,
};

impl VehicleProfile {
    pub fn by_name(name: &str) -> Option<&'static VehicleProfile> {
        match name {
            "runabout" => Some(&RUNABOUT),
            "hauler" => Some(&HAULER),
            "skiff" => Some(&SKIFF),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sag_derivation_matches_runabout_spring() {
        let (k, c) = suspension_from_sag(1350.0, 0.05, 0.9);
        assert!((k - RUNABOUT.spring_rate).abs() / RUNABOUT.spring_rate < 0.02);
        assert!(c > 0.0);
    }

    #[test]
    fn profiles_resolve_by_name() {
        assert!(VehicleProfile::by_name("skiff").unwrap().is_water_vehicle);
        assert!(VehicleProfile::by_name("submarine").is_none());
    }
}
