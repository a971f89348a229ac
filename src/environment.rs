// src/environment.rs
//
// Pull-based weather/time-of-day feed. External systems set wind, rain and
// the quiet-period flag; the pipeline calls `conditions()` once per tick.
// The activity modifier ramps linearly over the configured transition so a
// quiet period never snaps vehicle forces between two ticks.

use rapier3d::prelude::*;

#[derive(Clone, Copy, Debug)]
pub struct EnvironmentalConditions {
    pub wind: Vector<Real>,         // m/s, world space
    pub wind_speed: f32,
    pub rain_intensity: f32,        // 0..1
    pub temperature: f32,           // degrees C
    pub is_quiet_period: bool,
    pub activity_modifier: f32,     // (0..1], multiplicative on net forces
}

pub struct EnvironmentProvider {
    wind: Vector<Real>,
    rain_intensity: f32,
    temperature: f32,
    quiet_period: bool,
    modifier: f32,
    quiet_level: f32,
    transition: f32,                // seconds for a full 1.0 <-> quiet ramp
}

impl EnvironmentProvider {
    pub fn new(quiet_level: f32, transition: f32) -> Self {
        Self {
            wind: vector![0.0, 0.0, 0.0],
            rain_intensity: 0.0,
            temperature: 28.0,
            quiet_period: false,
            modifier: 1.0,
            quiet_level: quiet_level.clamp(0.05, 1.0),
            transition: transition.max(0.1),
        }
    }

    pub fn set_wind(&mut self, wind: Vector<Real>) {
        self.wind = wind;
    }

    pub fn set_rain(&mut self, intensity: f32) {
        self.rain_intensity = intensity.clamp(0.0, 1.0);
    }

    pub fn set_temperature(&mut self, celsius: f32) {
        self.temperature = celsius;
    }

    pub fn set_quiet_period(&mut self, quiet: bool) {
        self.quiet_period = quiet;
    }

    /// Advance the modifier ramp. Rate is fixed by the transition duration,
    /// so the value moves by at most `rate * dt` per call.
    pub fn update(&mut self, dt: f32) {
        let target = if self.quiet_period { self.quiet_level } else { 1.0 };
        let rate = (1.0 - self.quiet_level) / self.transition;
        let step = rate * dt;
        let delta = target - self.modifier;
        self.modifier += delta.clamp(-step, step);
    }

    pub fn conditions(&self) -> EnvironmentalConditions {
        EnvironmentalConditions {
            wind: self.wind,
            wind_speed: self.wind.magnitude(),
            rain_intensity: self.rain_intensity,
            temperature: self.temperature,
            is_quiet_period: self.quiet_period,
            activity_modifier: self.modifier,
        }
    }
}

impl EnvironmentalConditions {
    /// Wet surfaces lose grip; at full rain friction drops by 30%.
    pub fn friction_multiplier(&self) -> f32 {
        1.0 - 0.3 * self.rain_intensity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_ramps_without_discontinuity() {
        let mut env = EnvironmentProvider::new(0.4, 3.0);
        env.set_quiet_period(true);

        let rate = (1.0 - 0.4) / 3.0;
        let dt = 1.0 / 60.0;
        let mut prev = env.conditions().activity_modifier;
        for _ in 0..400 {
            env.update(dt);
            let m = env.conditions().activity_modifier;
            assert!((m - prev).abs() <= rate * dt + 1e-6);
            prev = m;
        }
        assert!((prev - 0.4).abs() < 1e-4);
    }

    #[test]
    fn modifier_returns_to_one_after_quiet_period() {
        let mut env = EnvironmentProvider::new(0.4, 3.0);
        env.set_quiet_period(true);
        for _ in 0..300 {
            env.update(1.0 / 60.0);
        }
        env.set_quiet_period(false);
        for _ in 0..300 {
            env.update(1.0 / 60.0);
        }
        assert!((env.conditions().activity_modifier - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rain_reduces_friction_multiplier() {
        let mut env = EnvironmentProvider::new(0.4, 3.0);
        env.set_rain(1.0);
        assert!((env.conditions().friction_multiplier() - 0.7).abs() < 1e-6);
        env.set_rain(0.0);
        assert!((env.conditions().friction_multiplier() - 1.0).abs() < 1e-6);
    }
}
