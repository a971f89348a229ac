// tire/types.rs

use core::fmt;
use rapier3d::prelude::*;

// ============================================
// Wheel identification
// ============================================

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WheelId {
    FL,
    FR,
    RL,
    RR,
}

impl WheelId {
    pub fn from_index(i: usize) -> Self {
        match i % 4 {
            0 => WheelId::FL,
            1 => WheelId::FR,
            2 => WheelId::RL,
            _ => WheelId::RR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, WheelId::RL | WheelId::RR)
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Per-wheel force output
// ============================================

/// Write-only output slot for one wheel in one tick. The scalar components
/// are kept alongside the assembled vectors so the stability pass can
/// rescale drive/brake contributions without re-deriving them.
#[derive(Clone, Copy, Debug)]
pub struct ForceOutput {
    pub force: Vector<Real>,        // world space, N
    pub torque: Vector<Real>,       // about the vehicle COM, N*m
    pub rpm: f32,
    pub valid: bool,

    pub suspension_force: f32,      // along world up
    pub drive_force: f32,           // signed, along `forward`
    pub brake_force: f32,           // signed, along `forward`
    pub lateral_force: f32,         // signed, along `side`
    pub forward: Vector<Real>,
    pub side: Vector<Real>,
}

impl ForceOutput {
    /// Zeroed, invalid output: airborne wheel or unusable terrain sample.
    pub fn invalid() -> Self {
        Self {
            force: vector![0.0, 0.0, 0.0],
            torque: vector![0.0, 0.0, 0.0],
            rpm: 0.0,
            valid: false,
            suspension_force: 0.0,
            drive_force: 0.0,
            brake_force: 0.0,
            lateral_force: 0.0,
            forward: vector![0.0, 0.0, -1.0],
            side: vector![1.0, 0.0, 0.0],
        }
    }

    /// Longitudinal magnitude after drive/brake/rolling are combined.
    pub fn longitudinal(&self) -> f32 {
        self.force.dot(&self.forward)
    }
}

impl Default for ForceOutput {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Whole-vehicle accumulator written by the vehicle pass.
#[derive(Clone, Copy, Debug)]
pub struct VehicleForce {
    pub force: Vector<Real>,
    pub torque: Vector<Real>,
    pub valid: bool,
}

impl VehicleForce {
    pub fn zero() -> Self {
        Self {
            force: vector![0.0, 0.0, 0.0],
            torque: vector![0.0, 0.0, 0.0],
            valid: false,
        }
    }
}

impl Default for VehicleForce {
    fn default() -> Self {
        Self::zero()
    }
}
