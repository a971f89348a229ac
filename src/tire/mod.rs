//! Wheel force model: suspension, longitudinal and lateral tire forces,
//! combined under a friction-circle limit. Pure math over registry state;
//! nothing in here touches rapier or the arena directly.

pub mod kinematics;
pub mod lateral;
pub mod longitudinal;
pub mod solve;
pub mod suspension;
pub mod types;

pub use solve::{compute_wheel_force, wheel_normal_force};
pub use types::{ForceOutput, WheelId};
