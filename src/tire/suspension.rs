// tire/suspension.rs
//
// Spring/damper force for one wheel. The spring stiffens progressively near
// full travel so the chassis resists bottoming out; the damper works from
// the compression delta between ticks.

use crate::registry::WheelState;

/// Extra stiffness as compression approaches full travel. At ratio 1.0 the
/// spring is 3x its nominal rate.
const BOTTOM_OUT_GAIN: f32 = 2.0;

/// Rebound damping is clamped relative to the spring so the damper can never
/// yank the chassis down harder than the spring pushes up.
const DAMPER_CLAMP_RATIO: f32 = 0.6;

#[inline]
pub fn progressive_factor(compression_ratio: f32) -> f32 {
    let r = compression_ratio.clamp(0.0, 1.0);
    1.0 + BOTTOM_OUT_GAIN * r * r
}

/// Upward suspension force (N), never negative. `dt` converts the
/// compression delta into a damper velocity.
pub fn suspension_force(wheel: &WheelState, dt: f32) -> f32 {
    if !wheel.grounded || dt <= 0.0 {
        return 0.0;
    }

    let ratio = wheel.compression / wheel.suspension_travel.max(1e-4);
    let spring = wheel.spring_rate * wheel.compression * progressive_factor(ratio);

    let velocity = (wheel.compression - wheel.prev_compression) / dt;
    let damper = (wheel.damper_rate * velocity).clamp(-spring * DAMPER_CLAMP_RATIO, spring * DAMPER_CLAMP_RATIO);

    (spring + damper).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RUNABOUT;
    use crate::registry::VehicleRegistry;
    use rapier3d::prelude::RigidBodyHandle;

    fn wheel() -> WheelState {
        let mut reg = VehicleRegistry::new(1);
        let slot = reg.register(RUNABOUT, RigidBodyHandle::invalid()).unwrap();
        reg.wheels(slot)[0].clone()
    }

    #[test]
    fn spring_stiffens_near_full_travel() {
        let mut w = wheel();
        w.grounded = true;

        w.compression = 0.1;
        w.prev_compression = 0.1;
        let soft = suspension_force(&w, 1.0 / 60.0) / 0.1;

        w.compression = w.suspension_travel;
        w.prev_compression = w.suspension_travel;
        let hard = suspension_force(&w, 1.0 / 60.0) / w.suspension_travel;

        assert!(hard > soft * 1.5);
    }

    #[test]
    fn compression_velocity_adds_damping() {
        let mut w = wheel();
        w.grounded = true;
        w.compression = 0.1;
        w.prev_compression = 0.08;
        let compressing = suspension_force(&w, 1.0 / 60.0);

        w.prev_compression = 0.1;
        let steady = suspension_force(&w, 1.0 / 60.0);

        assert!(compressing > steady);
    }

    #[test]
    fn airborne_wheel_produces_no_force() {
        let mut w = wheel();
        w.grounded = false;
        w.compression = 0.2;
        assert_eq!(suspension_force(&w, 1.0 / 60.0), 0.0);
    }
}
