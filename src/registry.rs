// src/registry.rs
//
// Fixed-capacity arena for the simulated vehicle set. Slot indices are
// stable for a vehicle's lifetime; wheel storage is flat with
// `wheel slot = vehicle slot * 4 + wheel index`. The registry is the only
// owner of vehicle/wheel state — every other component gets a read view plus
// a write-only output slot.

use core::fmt;
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;

use crate::config::{VehicleProfile, WHEELS_PER_VEHICLE};
use crate::terrain::TerrainSample;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Registration beyond the configured maximum. Caller-visible, never
    /// fatal to the tick.
    CapacityExceeded { limit: usize },
    /// Slot is empty.
    StaleSlot { slot: usize },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::CapacityExceeded { limit } => {
                write!(f, "vehicle capacity exceeded (limit {limit})")
            }
            RegistryError::StaleSlot { slot } => write!(f, "stale vehicle slot {slot}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Per-vehicle simulation state, refreshed from the rigid body every tick.
#[derive(Clone, Debug)]
pub struct VehicleState {
    pub profile: VehicleProfile,
    pub body: RigidBodyHandle,

    pub position: Point<Real>,
    pub rotation: UnitQuaternion<Real>,
    pub linvel: Vector<Real>,
    pub angvel: Vector<Real>,
    pub com: Point<Real>,
    pub mass: f32,

    // Control inputs, fed by the external control layer before Sample.
    pub throttle: f32,              // -1..1
    pub brake: f32,                 // 0..1
    pub steer: f32,                 // -1..1
    pub steer_angle: f32,           // integrated, rate-limited (radians)

    pub is_water_vehicle: bool,

    // Persisted stability-control multiplier state (exponentially smoothed).
    pub abs_multiplier: f32,
    pub tc_multiplier: f32,

    // Submersion bookkeeping for the sinking -> destroyed transition.
    pub depth_below_water: f32,
    pub submersion_timer: f32,
    pub destroyed: bool,
}

impl VehicleState {
    fn new(profile: VehicleProfile, body: RigidBodyHandle) -> Self {
        Self {
            profile,
            body,
            position: point![0.0, 0.0, 0.0],
            rotation: UnitQuaternion::identity(),
            linvel: vector![0.0, 0.0, 0.0],
            angvel: vector![0.0, 0.0, 0.0],
            com: point![0.0, 0.0, 0.0],
            mass: profile.mass,
            throttle: 0.0,
            brake: 0.0,
            steer: 0.0,
            steer_angle: 0.0,
            is_water_vehicle: profile.is_water_vehicle,
            abs_multiplier: 1.0,
            tc_multiplier: 1.0,
            depth_below_water: 0.0,
            submersion_timer: 0.0,
            destroyed: false,
        }
    }

    /// Forward direction in world space (chassis -Z, like the colliders).
    pub fn forward(&self) -> Vector<Real> {
        self.rotation * vector![0.0, 0.0, -1.0]
    }

    pub fn speed(&self) -> f32 {
        self.linvel.magnitude()
    }
}

/// Per-wheel state. Exactly four per vehicle; slot index is stable.
#[derive(Clone, Debug)]
pub struct WheelState {
    pub offset: Point<Real>,        // mount position, chassis local
    pub radius: f32,
    pub width: f32,
    pub suspension_travel: f32,
    pub suspension_rest: f32,
    pub spring_rate: f32,
    pub damper_rate: f32,
    pub powered: bool,
    pub steered: bool,

    pub grounded: bool,
    pub compression: f32,
    pub prev_compression: f32,
    pub steer_angle: f32,
    pub rpm: f32,

    // Contact-frame velocities and slip, refreshed in Sample.
    pub v_long: f32,
    pub v_lat: f32,
    pub slip_angle: f32,
    pub slip_ratio: f32,
    pub forward: Vector<Real>,
    pub side: Vector<Real>,
    pub contact_point: Point<Real>,

    pub terrain: TerrainSample,
}

impl WheelState {
    fn new(profile: &VehicleProfile, index: usize) -> Self {
        let x = profile.track_width * 0.5 * if index % 2 == 0 { -1.0 } else { 1.0 };
        let z = profile.wheelbase * 0.5 * if index < 2 { -1.0 } else { 1.0 };
        Self {
            offset: point![x, -profile.chassis_half_extents[1], z],
            radius: profile.wheel_radius,
            width: profile.wheel_width,
            suspension_travel: profile.suspension_travel,
            suspension_rest: profile.suspension_rest,
            spring_rate: profile.spring_rate,
            damper_rate: profile.damper_rate,
            // Rear axle drives, front axle steers.
            powered: index >= 2,
            steered: index < 2,
            grounded: false,
            compression: 0.0,
            prev_compression: 0.0,
            steer_angle: 0.0,
            rpm: 0.0,
            v_long: 0.0,
            v_lat: 0.0,
            slip_angle: 0.0,
            slip_ratio: 0.0,
            forward: vector![0.0, 0.0, -1.0],
            side: vector![1.0, 0.0, 0.0],
            contact_point: point![0.0, 0.0, 0.0],
            terrain: TerrainSample::default(),
        }
    }
}

pub struct VehicleRegistry {
    capacity: usize,
    vehicles: Vec<Option<VehicleState>>,
    wheels: Vec<WheelState>,
    active: usize,
    pending_removals: Vec<usize>,
}

impl VehicleRegistry {
    pub fn new(capacity: usize) -> Self {
        let placeholder = WheelState::new(&crate::config::RUNABOUT, 0);
        Self {
            capacity,
            vehicles: vec![None; capacity],
            wheels: vec![placeholder; capacity * WHEELS_PER_VEHICLE],
            active: 0,
            pending_removals: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Claim a slot for a new vehicle. Fails when the arena is full; the
    /// caller decides what to do about it, the tick carries on regardless.
    pub fn register(
        &mut self,
        profile: VehicleProfile,
        body: RigidBodyHandle,
    ) -> Result<usize, RegistryError> {
        let slot = self
            .vehicles
            .iter()
            .position(|v| v.is_none())
            .ok_or(RegistryError::CapacityExceeded {
                limit: self.capacity,
            })?;

        self.vehicles[slot] = Some(VehicleState::new(profile, body));
        for i in 0..WHEELS_PER_VEHICLE {
            self.wheels[slot * WHEELS_PER_VEHICLE + i] = WheelState::new(&profile, i);
        }
        self.active += 1;
        Ok(slot)
    }

    /// Free a slot immediately. Only safe between ticks or after the batch
    /// passes have joined; mid-tick callers go through `defer_unregister`.
    pub fn unregister(&mut self, slot: usize) -> Result<VehicleState, RegistryError> {
        let state = self
            .vehicles
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or(RegistryError::StaleSlot { slot })?;
        self.active -= 1;
        Ok(state)
    }

    /// Queue a removal to be applied once the in-flight batch has joined.
    pub fn defer_unregister(&mut self, slot: usize) {
        if !self.pending_removals.contains(&slot) {
            self.pending_removals.push(slot);
        }
    }

    /// Apply queued removals. Called by the pipeline after Apply, never
    /// while a batch is in flight. Returns the freed states so the caller
    /// can tear down the rigid bodies.
    pub fn drain_pending(&mut self) -> Vec<(usize, VehicleState)> {
        let slots = std::mem::take(&mut self.pending_removals);
        slots
            .into_iter()
            .filter_map(|slot| self.unregister(slot).ok().map(|v| (slot, v)))
            .collect()
    }

    /// Occupied slot indices, in order. Empty slots are skipped; no
    /// compaction, so indices handed to outputs stay stable within a tick.
    pub fn active_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.vehicles
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|_| i))
    }

    pub fn vehicle(&self, slot: usize) -> Option<&VehicleState> {
        self.vehicles.get(slot).and_then(Option::as_ref)
    }

    pub fn vehicle_mut(&mut self, slot: usize) -> Option<&mut VehicleState> {
        self.vehicles.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn wheels(&self, slot: usize) -> &[WheelState] {
        let base = slot * WHEELS_PER_VEHICLE;
        &self.wheels[base..base + WHEELS_PER_VEHICLE]
    }

    pub fn wheels_mut(&mut self, slot: usize) -> &mut [WheelState] {
        let base = slot * WHEELS_PER_VEHICLE;
        &mut self.wheels[base..base + WHEELS_PER_VEHICLE]
    }

    /// Split borrow used by the Sample stage: one vehicle plus its wheels.
    pub fn vehicle_and_wheels_mut(
        &mut self,
        slot: usize,
    ) -> Option<(&mut VehicleState, &mut [WheelState])> {
        let base = slot * WHEELS_PER_VEHICLE;
        let vehicle = self.vehicles.get_mut(slot)?.as_mut()?;
        let wheels = &mut self.wheels[base..base + WHEELS_PER_VEHICLE];
        Some((vehicle, wheels))
    }

    /// Flat read view for the parallel wheel pass.
    pub fn wheel_slot(&self, wheel_index: usize) -> Option<(&VehicleState, &WheelState)> {
        let slot = wheel_index / WHEELS_PER_VEHICLE;
        let vehicle = self.vehicle(slot)?;
        Some((vehicle, &self.wheels[wheel_index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RUNABOUT, SKIFF};

    fn handle() -> RigidBodyHandle {
        RigidBodyHandle::invalid()
    }

    #[test]
    fn capacity_bound_is_enforced_and_slots_are_reusable() {
        let mut reg = VehicleRegistry::new(3);
        let a = reg.register(RUNABOUT, handle()).unwrap();
        let _b = reg.register(RUNABOUT, handle()).unwrap();
        let _c = reg.register(SKIFF, handle()).unwrap();

        assert!(matches!(
            reg.register(RUNABOUT, handle()),
            Err(RegistryError::CapacityExceeded { limit: 3 })
        ));

        reg.unregister(a).unwrap();
        let d = reg.register(RUNABOUT, handle()).unwrap();
        assert_eq!(d, a);
        assert_eq!(reg.active_count(), 3);
    }

    #[test]
    fn deferred_removal_applies_on_drain() {
        let mut reg = VehicleRegistry::new(2);
        let slot = reg.register(RUNABOUT, handle()).unwrap();
        reg.defer_unregister(slot);
        reg.defer_unregister(slot); // duplicate is a no-op
        assert_eq!(reg.active_count(), 1);

        let removed = reg.drain_pending();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, slot);
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn wheel_slots_are_stable_and_axle_roles_fixed() {
        let mut reg = VehicleRegistry::new(4);
        let slot = reg.register(RUNABOUT, handle()).unwrap();
        let wheels = reg.wheels(slot);
        assert_eq!(wheels.len(), WHEELS_PER_VEHICLE);
        assert!(wheels[0].steered && !wheels[0].powered);
        assert!(wheels[3].powered && !wheels[3].steered);
        assert!(wheels[0].offset.z < 0.0 && wheels[2].offset.z > 0.0);
    }
}
