// src/stability.rs
//
// Driver-assist corrections applied after the raw force passes: ABS, traction
// control and electronic stability control. The per-vehicle multipliers are
// persisted on VehicleState and approach their targets at a bounded rate, so
// a correction fades in over several ticks instead of stepping the forces.
//
// `apply` is a pure rebuild from the stored wheel components plus the
// multiplier state: running it twice in one tick replaces the correction, it
// never stacks. The correction is scaled by the same force factor the
// vehicle pass applied, so it stays proportional to what actually reached
// the aggregate.

use rapier3d::prelude::*;

use crate::config::SimConfig;
use crate::registry::{VehicleState, WheelState};
use crate::tire::types::{ForceOutput, VehicleForce};

pub struct StabilityControl {
    pub abs_enabled: bool,
    pub tc_enabled: bool,
    pub esc_enabled: bool,

    abs_threshold: f32,
    tc_threshold: f32,
    esc_threshold: f32,
    abs_floor: f32,
    tc_floor: f32,
    rate: f32,
    esc_gain: f32,
}

/// ESC only acts above this speed; parking-lot yaw is left alone.
const ESC_MIN_SPEED: f32 = 3.0;

/// Inputs below this are treated as released pedals.
const PEDAL_DEADZONE: f32 = 0.1;

impl StabilityControl {
    pub fn new(cfg: &SimConfig) -> Self {
        Self {
            abs_enabled: true,
            tc_enabled: true,
            esc_enabled: true,
            abs_threshold: cfg.abs_threshold,
            tc_threshold: cfg.tc_threshold,
            esc_threshold: cfg.esc_threshold,
            abs_floor: cfg.abs_floor,
            tc_floor: cfg.tc_floor,
            rate: cfg.stability_rate,
            esc_gain: cfg.esc_gain,
        }
    }

    /// Move a multiplier toward its target by at most `rate * dt`.
    fn approach(&self, current: f32, target: f32, dt: f32) -> f32 {
        let step = (self.rate * dt).min(1.0);
        current + (target - current) * step
    }

    /// Body slip angle: velocity direction versus heading, in radians.
    pub fn body_slip_angle(vehicle: &VehicleState) -> f32 {
        let forward = vehicle.forward();
        let up = vector![0.0, 1.0, 0.0];
        let side = forward.cross(&up);
        let v_long = vehicle.linvel.dot(&forward);
        let v_lat = vehicle.linvel.dot(&side);
        v_lat.atan2(v_long.abs().max(0.5))
    }

    /// Update the persisted multipliers and rebuild the vehicle aggregate
    /// from the stored wheel components. `raw` is the vehicle-pass result
    /// before any assist correction; `force_scale` is the combined
    /// wet-surface/activity factor the vehicle pass already applied to the
    /// tire forces, so the correction delta shrinks by the same amount and
    /// can never overshoot the scaled aggregate.
    pub fn apply(
        &self,
        vehicle: &mut VehicleState,
        wheels: &[WheelState],
        outputs: &[ForceOutput],
        raw: &VehicleForce,
        force_scale: f32,
        dt: f32,
    ) -> VehicleForce {
        // --- multiplier targets from per-wheel slip ---
        let abs_engaged = self.abs_enabled
            && vehicle.brake > PEDAL_DEADZONE
            && wheels
                .iter()
                .any(|w| w.grounded && w.slip_ratio.abs() > self.abs_threshold);

        let tc_engaged = self.tc_enabled
            && vehicle.throttle.abs() > PEDAL_DEADZONE
            && wheels
                .iter()
                .any(|w| w.grounded && w.powered && w.slip_ratio.abs() > self.tc_threshold);

        let abs_target = if abs_engaged { self.abs_floor } else { 1.0 };
        let tc_target = if tc_engaged { self.tc_floor } else { 1.0 };

        vehicle.abs_multiplier = self.approach(vehicle.abs_multiplier, abs_target, dt);
        vehicle.tc_multiplier = self.approach(vehicle.tc_multiplier, tc_target, dt);

        // --- rebuild the longitudinal correction from stored components ---
        let mut corrected = *raw;
        for out in outputs.iter().filter(|o| o.valid) {
            let delta = out.drive_force * (vehicle.tc_multiplier - 1.0)
                + out.brake_force * (vehicle.abs_multiplier - 1.0);
            corrected.force += out.forward * (delta * force_scale);
        }

        // --- ESC: corrective yaw torque against body slip ---
        if self.esc_enabled && vehicle.speed() > ESC_MIN_SPEED {
            let beta = Self::body_slip_angle(vehicle);
            if beta.abs() > self.esc_threshold {
                let torque = -self.esc_gain * beta * (vehicle.mass / 1000.0);
                corrected.torque += vector![0.0, torque * force_scale, 0.0];
            }
        }

        corrected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RUNABOUT, SimConfig};
    use crate::registry::VehicleRegistry;
    use rapier3d::prelude::RigidBodyHandle;

    const DT: f32 = 1.0 / 60.0;

    fn rig() -> (StabilityControl, VehicleState, Vec<WheelState>, Vec<ForceOutput>) {
        let cfg = SimConfig::default();
        let sc = StabilityControl::new(&cfg);
        let mut reg = VehicleRegistry::new(1);
        let slot = reg.register(RUNABOUT, RigidBodyHandle::invalid()).unwrap();
        let vehicle = reg.vehicle(slot).unwrap().clone();
        let wheels: Vec<_> = reg.wheels(slot).to_vec();
        let outputs = vec![ForceOutput::invalid(); 4];
        (sc, vehicle, wheels, outputs)
    }

    fn braking_setup(
        vehicle: &mut VehicleState,
        wheels: &mut [WheelState],
        outputs: &mut [ForceOutput],
    ) {
        vehicle.brake = 1.0;
        for w in wheels.iter_mut() {
            w.grounded = true;
            w.slip_ratio = -0.95;
        }
        for o in outputs.iter_mut() {
            o.valid = true;
            o.brake_force = -2_000.0;
        }
    }

    #[test]
    fn abs_multiplier_moves_at_bounded_rate_toward_floor() {
        let (sc, mut vehicle, mut wheels, mut outputs) = rig();
        braking_setup(&mut vehicle, &mut wheels, &mut outputs);
        let raw = VehicleForce::zero();

        let mut prev = vehicle.abs_multiplier;
        for _ in 0..200 {
            sc.apply(&mut vehicle, &wheels, &outputs, &raw, 1.0, DT);
            let m = vehicle.abs_multiplier;
            assert!((m - prev).abs() <= sc.rate * DT + 1e-6);
            prev = m;
        }
        assert!((prev - 0.3).abs() < 0.02);
    }

    #[test]
    fn abs_never_steps_to_floor_in_one_tick() {
        let (sc, mut vehicle, mut wheels, mut outputs) = rig();
        braking_setup(&mut vehicle, &mut wheels, &mut outputs);
        sc.apply(&mut vehicle, &wheels, &outputs, &VehicleForce::zero(), 1.0, DT);
        assert!(vehicle.abs_multiplier > 0.8);
    }

    #[test]
    fn correction_replaces_instead_of_stacking() {
        let (sc, mut vehicle, mut wheels, mut outputs) = rig();
        braking_setup(&mut vehicle, &mut wheels, &mut outputs);
        vehicle.abs_multiplier = 0.3; // converged

        let raw = VehicleForce::zero();
        let once = sc.apply(&mut vehicle, &wheels, &outputs, &raw, 1.0, DT);
        let twice = sc.apply(&mut vehicle, &wheels, &outputs, &raw, 1.0, DT);
        assert!((once.force - twice.force).magnitude() < 1e-3);
    }

    #[test]
    fn scaled_aggregate_keeps_braking_sign_under_correction() {
        let (sc, mut vehicle, mut wheels, mut outputs) = rig();
        braking_setup(&mut vehicle, &mut wheels, &mut outputs);
        vehicle.abs_multiplier = 0.3; // converged
        let forward = outputs[0].forward;

        // Aggregate built the way the vehicle pass builds it during a quiet
        // period: the summed brake forces already carry the 0.4 modifier.
        let scale = 0.4;
        let brake_sum: f32 = outputs.iter().map(|o| o.brake_force).sum();
        let mut raw = VehicleForce::zero();
        raw.force = forward * (brake_sum * scale);
        raw.valid = true;

        let corrected = sc.apply(&mut vehicle, &wheels, &outputs, &raw, scale, DT);
        let long = corrected.force.dot(&forward);
        // Still decelerating, at exactly the scaled ABS-limited value.
        assert!(long < 0.0, "braking reversed into thrust: {long}");
        assert!((long - brake_sum * scale * 0.3).abs() < 1e-2);
    }

    #[test]
    fn tc_engages_only_on_powered_spinning_wheels() {
        let (sc, mut vehicle, mut wheels, outputs) = rig();
        vehicle.throttle = 1.0;
        // Only a front (unpowered) wheel slips: TC stays out.
        wheels[0].grounded = true;
        wheels[0].slip_ratio = 0.9;
        for _ in 0..200 {
            sc.apply(&mut vehicle, &wheels, &outputs, &VehicleForce::zero(), 1.0, DT);
        }
        assert!((vehicle.tc_multiplier - 1.0).abs() < 1e-3);

        // A rear (powered) wheel slips: TC ramps toward the floor.
        wheels[2].grounded = true;
        wheels[2].slip_ratio = 0.5;
        for _ in 0..200 {
            sc.apply(&mut vehicle, &wheels, &outputs, &VehicleForce::zero(), 1.0, DT);
        }
        assert!((vehicle.tc_multiplier - 0.5).abs() < 0.02);
    }

    #[test]
    fn esc_counters_body_slip_with_opposing_yaw_torque() {
        let (sc, mut vehicle, wheels, outputs) = rig();
        // Heading -Z, sliding to the left of travel: positive lateral drift.
        vehicle.linvel = vector![2.0, 0.0, -10.0];

        let out = sc.apply(&mut vehicle, &wheels, &outputs, &VehicleForce::zero(), 1.0, DT);
        let beta = StabilityControl::body_slip_angle(&vehicle);
        assert!(beta.abs() > 5.0_f32.to_radians());
        assert!(out.torque.y * beta < 0.0); // opposes the drift
    }
}
