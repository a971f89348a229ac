// src/pipeline.rs
//
// The per-tick orchestrator. One fixed-rate accumulator gates the tick;
// inside a tick the stages run strictly in order and every batch joins
// before the next stage starts:
//
//   Sample -> WheelPass -> VehiclePass -> WaterPass -> StabilityPass -> Apply
//
// Sample and the terrain raycasts stay on the owning thread (world geometry
// access is serialized); the wheel and vehicle passes fan out over the batch
// executor with one writer per output slot. Removals requested mid-tick are
// queued and drained after Apply so no in-flight batch ever observes a
// reused slot.

use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;
use std::collections::HashMap;
use std::time::Instant;

use crate::batch::BatchExecutor;
use crate::config::{AIR_DENSITY, GRAVITY, SimConfig, VehicleProfile, WHEELS_PER_VEHICLE};
use crate::environment::EnvironmentProvider;
use crate::registry::{RegistryError, VehicleRegistry};
use crate::stability::StabilityControl;
use crate::terrain::{TerrainSamplingCache, TerrainType, WaterRegion, WorldGeometry};
use crate::tire::types::{ForceOutput, VehicleForce};
use crate::tire::{self, kinematics};
use crate::water::WaterPhysics;

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

/// Steering rate limit, radians per second.
const MAX_STEER_RATE: f32 = 2.5;

/// Upper bound on catch-up ticks after a stalled frame; anything beyond
/// this is dropped rather than simulated in a burst.
const MAX_CATCHUP_TICKS: f32 = 5.0;

/// Counters published with every snapshot.
#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct Telemetry {
    pub tick: u64,
    pub active_vehicles: usize,
    pub avg_tick_ms: f32,
    pub activity_modifier: f32,
    pub parallel_batches: bool,
}

pub struct VehiclePhysicsPipeline {
    cfg: SimConfig,
    tick_interval: f32,
    accumulator: f32,
    sim_time: f64,

    // Rapier world: bodies, colliders, query plumbing.
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query_pipeline: QueryPipeline,

    // World-geometry annotations for the terrain query.
    surface_tags: HashMap<ColliderHandle, TerrainType>,
    water_regions: Vec<WaterRegion>,

    // Injected collaborators.
    registry: VehicleRegistry,
    terrain_cache: TerrainSamplingCache,
    environment: EnvironmentProvider,
    stability: StabilityControl,
    water: WaterPhysics,
    batch: BatchExecutor,

    // Write-only output slots, one per wheel / per vehicle, recomputed
    // every tick.
    wheel_outputs: Vec<ForceOutput>,
    vehicle_outputs: Vec<VehicleForce>,

    telemetry: Telemetry,
    initialized: bool,
}

impl VehiclePhysicsPipeline {
    pub fn new(
        cfg: SimConfig,
        registry: VehicleRegistry,
        terrain_cache: TerrainSamplingCache,
        environment: EnvironmentProvider,
    ) -> Self {
        let capacity = registry.capacity();
        let batch = BatchExecutor::new(cfg.worker_threads);
        let telemetry = Telemetry {
            parallel_batches: batch.is_parallel(),
            activity_modifier: 1.0,
            ..Telemetry::default()
        };

        Self {
            tick_interval: 1.0 / cfg.physics_hz,
            accumulator: 0.0,
            sim_time: 0.0,

            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),

            surface_tags: HashMap::new(),
            water_regions: Vec::new(),

            stability: StabilityControl::new(&cfg),
            water: WaterPhysics::new(cfg.water),
            batch,
            registry,
            terrain_cache,
            environment,

            wheel_outputs: vec![ForceOutput::invalid(); capacity * WHEELS_PER_VEHICLE],
            vehicle_outputs: vec![VehicleForce::zero(); capacity],

            telemetry,
            initialized: false,
            cfg,
        }
    }

    /// Build the static world geometry. Explicit startup call; there is no
    /// implicit hook into a host scene graph.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }

        // Base ground slab, road surface at y = 0.
        self.spawn_surface(
            point![0.0, -1.0, 0.0],
            vector![500.0, 1.0, 500.0],
            TerrainType::Road,
        );
        // Beach strip and a mud flat off the road.
        self.spawn_surface(
            point![80.0, -0.95, 0.0],
            vector![40.0, 1.0, 120.0],
            TerrainType::Sand,
        );
        self.spawn_surface(
            point![-80.0, -0.95, 40.0],
            vector![30.0, 1.0, 30.0],
            TerrainType::Mud,
        );
        // Lagoon: seabed collider below a tagged water volume.
        self.spawn_surface(
            point![160.0, -6.0, 0.0],
            vector![60.0, 1.0, 160.0],
            TerrainType::Rock,
        );
        self.water_regions.push(WaterRegion {
            min: point![100.0, -5.0, -160.0],
            max: point![220.0, 0.0, 160.0],
            surface_y: 0.0,
        });

        self.initialized = true;
        log::info!(
            "physics world ready: {} colliders, {} water region(s)",
            self.colliders.len(),
            self.water_regions.len()
        );
    }

    /// Explicit teardown: unregister everything and drop world geometry.
    pub fn shutdown(&mut self) {
        let slots: Vec<usize> = self.registry.active_slots().collect();
        for slot in slots {
            if let Ok(state) = self.registry.unregister(slot) {
                self.remove_body(state.body);
            }
        }
        self.initialized = false;
        log::info!("physics pipeline shut down");
    }

    fn spawn_surface(&mut self, center: Point<Real>, half_extents: Vector<Real>, tag: TerrainType) {
        let body = RigidBodyBuilder::fixed()
            .translation(center.coords)
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.0)
            .restitution(0.0)
            .build();
        let c = self
            .colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.surface_tags.insert(c, tag);
    }

    /// Create the rigid body for a vehicle and claim a registry slot.
    pub fn register_vehicle(
        &mut self,
        profile: VehicleProfile,
        position: [f32; 3],
    ) -> Result<usize, RegistryError> {
        let [hx, hy, hz] = profile.chassis_half_extents;
        let [cx, cy, cz] = profile.com_offset;
        let volume = 8.0 * hx * hy * hz;
        let density = profile.mass / volume;

        let body = RigidBodyBuilder::dynamic()
            .translation(vector![position[0], position[1], position[2]])
            .linear_damping(profile.linear_damping)
            .angular_damping(profile.angular_damping)
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![cx, cy, cz])
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .density(density)
            .friction(0.0) // tires provide all traction
            .restitution(0.0)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        match self.registry.register(profile, handle) {
            Ok(slot) => {
                log::info!("registered {} in slot {slot}", profile.name);
                Ok(slot)
            }
            Err(e) => {
                // Arena full: tear the body back down, report to the caller,
                // the tick carries on for everyone already registered.
                self.remove_body(handle);
                log::warn!("vehicle registration rejected: {e}");
                Err(e)
            }
        }
    }

    /// Queue a removal; applied after the current tick's batches have
    /// joined (or at the next tick boundary when called between ticks).
    pub fn unregister_vehicle(&mut self, slot: usize) {
        self.registry.defer_unregister(slot);
    }

    /// Free a slot right now. Only for callers that hold the pipeline
    /// between ticks; a respawn that must reclaim its old slot before
    /// re-registering goes through here instead of the deferral queue.
    pub fn release_vehicle(&mut self, slot: usize) {
        if let Ok(state) = self.registry.unregister(slot) {
            self.remove_body(state.body);
            log::info!("slot {slot} released");
        }
    }

    pub fn apply_input(&mut self, slot: usize, throttle: f32, brake: f32, steer: f32) {
        if let Some(v) = self.registry.vehicle_mut(slot) {
            v.throttle = throttle.clamp(-1.0, 1.0);
            v.brake = brake.clamp(0.0, 1.0);
            v.steer = steer.clamp(-1.0, 1.0);
        }
    }

    pub fn registry(&self) -> &VehicleRegistry {
        &self.registry
    }

    pub fn environment_mut(&mut self) -> &mut EnvironmentProvider {
        &mut self.environment
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    pub fn body_position(&self, slot: usize) -> Option<(Point<Real>, UnitQuaternion<Real>)> {
        let v = self.registry.vehicle(slot)?;
        let body = self.bodies.get(v.body)?;
        let iso = body.position();
        Some((iso.translation.vector.into(), iso.rotation))
    }

    /// Advance the accumulator and run as many fixed ticks as it covers.
    /// Time past the catch-up bound is discarded so a stalled frame never
    /// turns into a tick burst.
    pub fn update(&mut self, frame_dt: f32) {
        self.accumulator += frame_dt;
        let cap = self.tick_interval * MAX_CATCHUP_TICKS;
        if self.accumulator > cap {
            log::warn!(
                "dropping {:.0} ms of simulation backlog",
                (self.accumulator - cap) * 1000.0
            );
            self.accumulator = cap;
        }
        while self.accumulator >= self.tick_interval {
            self.accumulator -= self.tick_interval;
            self.tick(self.tick_interval);
        }
    }

    fn tick(&mut self, dt: f32) {
        let started = Instant::now();
        self.sim_time += dt as f64;
        let now = self.sim_time;

        self.environment.update(dt);
        let conditions = self.environment.conditions();

        self.stage_sample(dt, now);
        self.stage_wheel_pass(dt);
        self.stage_vehicle_pass(&conditions);
        self.stage_water_pass(dt, now);
        let force_scale = conditions.friction_multiplier() * conditions.activity_modifier;
        self.stage_stability_pass(force_scale, dt);
        self.stage_apply(dt);

        let elapsed_ms = started.elapsed().as_secs_f32() * 1000.0;
        self.telemetry.tick += 1;
        self.telemetry.active_vehicles = self.registry.active_count();
        self.telemetry.activity_modifier = conditions.activity_modifier;
        // Exponential moving average over ~1 s of ticks.
        let alpha = 1.0 / self.cfg.physics_hz;
        self.telemetry.avg_tick_ms += (elapsed_ms - self.telemetry.avg_tick_ms) * alpha;
    }

    // ------------------------------------------------------------------
    // Stage 1: refresh vehicle/wheel state from the authoritative bodies,
    // resolve terrain under every wheel. Owning thread only.
    // ------------------------------------------------------------------
    fn stage_sample(&mut self, dt: f32, now: f64) {
        self.query_pipeline.update(&self.colliders);

        let Self {
            registry,
            bodies,
            colliders,
            query_pipeline,
            surface_tags,
            water_regions,
            terrain_cache,
            ..
        } = self;

        let slots: Vec<usize> = registry.active_slots().collect();
        for slot in slots {
            let Some((vehicle, wheels)) = registry.vehicle_and_wheels_mut(slot) else {
                continue;
            };
            let Some(body) = bodies.get(vehicle.body) else {
                continue;
            };

            let iso = *body.position();
            vehicle.position = iso.translation.vector.into();
            vehicle.rotation = iso.rotation;
            vehicle.linvel = *body.linvel();
            vehicle.angvel = *body.angvel();
            vehicle.com = *body.center_of_mass();
            vehicle.mass = body.mass();

            // Speed-sensitive, rate-limited steering integration.
            let speed = vehicle.speed();
            let steer_scale = (1.0 - speed / 30.0).clamp(0.35, 1.0);
            let target = vehicle.steer * vehicle.profile.max_steer_angle * steer_scale;
            let step = (target - vehicle.steer_angle).clamp(-MAX_STEER_RATE * dt, MAX_STEER_RATE * dt);
            vehicle.steer_angle += step;

            // Hull submersion for the water pass.
            let hull_bottom = vehicle.position.y - vehicle.profile.chassis_half_extents[1];
            vehicle.depth_below_water = water_regions
                .iter()
                .filter(|r| r.contains_xz(vehicle.position))
                .map(|r| r.surface_y - hull_bottom)
                .fold(0.0, f32::max);

            let geometry = WorldGeometry {
                bodies,
                colliders,
                query_pipeline,
                surface_tags,
                water_regions,
                filter: QueryFilter::default().exclude_rigid_body(vehicle.body),
            };

            for (i, wheel) in wheels.iter_mut().enumerate() {
                wheel.steer_angle = kinematics::wheel_steer_angle(vehicle, i);
                let (forward, side) = kinematics::wheel_basis(&vehicle.rotation, wheel.steer_angle);
                wheel.forward = forward;
                wheel.side = side;

                // Suspension raycast straight down from just above the hub.
                let origin = iso * (wheel.offset + vector![0.0, wheel.radius + 0.02, 0.0]);
                let dir = vector![0.0, -1.0, 0.0];
                let max_dist = wheel.suspension_rest + wheel.suspension_travel + wheel.radius;
                let ray = Ray::new(origin, dir);

                wheel.prev_compression = wheel.compression;
                wheel.grounded = false;
                wheel.compression = 0.0;

                let hit = query_pipeline.cast_ray(
                    bodies,
                    colliders,
                    &ray,
                    max_dist,
                    true,
                    geometry.filter,
                );
                let contact = match hit {
                    Some((_, toi)) if toi > wheel.radius => {
                        let suspension_length = toi - wheel.radius;
                        let raw = wheel.suspension_rest - suspension_length;
                        wheel.compression = raw.clamp(0.0, wheel.suspension_travel);
                        wheel.grounded = wheel.compression > 0.0;
                        origin + dir * toi
                    }
                    _ => origin + dir * max_dist,
                };
                wheel.contact_point = contact;

                let point_vel =
                    kinematics::point_velocity(vehicle.linvel, vehicle.angvel, vehicle.com, contact);
                wheel.v_long = point_vel.dot(&forward);
                wheel.v_lat = point_vel.dot(&side);
                wheel.slip_angle = kinematics::slip_angle(wheel.v_long, wheel.v_lat);

                wheel.terrain = terrain_cache.sample(contact, &geometry, now);

                let fz = tire::wheel_normal_force(vehicle);
                wheel.slip_ratio =
                    kinematics::slip_ratio_estimate(wheel, vehicle, &wheel.terrain, fz);
            }
        }

        terrain_cache.prune(now);
    }

    // ------------------------------------------------------------------
    // Stage 2: raw per-wheel forces, embarrassingly parallel. One writer
    // per slot, read-only registry views.
    // ------------------------------------------------------------------
    fn stage_wheel_pass(&mut self, dt: f32) {
        let registry = &self.registry;
        self.batch.run(&mut self.wheel_outputs, |i, out| {
            *out = match registry.wheel_slot(i) {
                Some((vehicle, wheel)) if !vehicle.destroyed => {
                    tire::compute_wheel_force(wheel, vehicle, &wheel.terrain, dt)
                }
                _ => ForceOutput::invalid(),
            };
        });
    }

    // ------------------------------------------------------------------
    // Stage 3: per-vehicle aggregation, parallel over vehicles. Gravity
    // enters here (the rapier step runs with zero gravity), plus aero
    // drag, wind, the rain friction multiplier and the activity modifier.
    // ------------------------------------------------------------------
    fn stage_vehicle_pass(&mut self, conditions: &crate::environment::EnvironmentalConditions) {
        let registry = &self.registry;
        let wheel_outputs = &self.wheel_outputs;
        let env = *conditions;

        self.batch.run(&mut self.vehicle_outputs, |slot, out| {
            let Some(vehicle) = registry.vehicle(slot) else {
                *out = VehicleForce::zero();
                return;
            };
            if vehicle.destroyed {
                *out = VehicleForce::zero();
                return;
            }

            let mut force = vector![0.0, 0.0, 0.0];
            let mut torque = vector![0.0, 0.0, 0.0];
            let base = slot * WHEELS_PER_VEHICLE;
            for w in &wheel_outputs[base..base + WHEELS_PER_VEHICLE] {
                if w.valid {
                    force += w.force;
                    torque += w.torque;
                }
            }

            // Rain thins the tire contribution in the ground plane.
            let wet = env.friction_multiplier();
            force.x *= wet;
            force.z *= wet;

            force += vector![0.0, -vehicle.mass * GRAVITY, 0.0];

            let speed = vehicle.speed();
            if speed > 1e-3 {
                let drag = 0.5
                    * AIR_DENSITY
                    * vehicle.profile.drag_coefficient
                    * vehicle.profile.frontal_area
                    * speed
                    * speed;
                force -= vehicle.linvel.normalize() * drag;
            }
            if env.wind_speed > 1e-3 {
                force += env.wind
                    * (0.5
                        * AIR_DENSITY
                        * vehicle.profile.drag_coefficient
                        * vehicle.profile.frontal_area
                        * env.wind_speed);
            }

            out.force = force * env.activity_modifier;
            out.torque = torque * env.activity_modifier;
            out.valid = true;
        });
    }

    // ------------------------------------------------------------------
    // Stage 4: water vehicles get buoyancy/drag/waves and thrust; land
    // vehicles in a water volume sink and may cross into destruction.
    // Sequential: it mutates submersion timers.
    // ------------------------------------------------------------------
    fn stage_water_pass(&mut self, dt: f32, now: f64) {
        let slots: Vec<usize> = self.registry.active_slots().collect();
        for slot in slots {
            let Some(vehicle) = self.registry.vehicle_mut(slot) else {
                continue;
            };
            if vehicle.destroyed {
                continue;
            }
            let depth = vehicle.depth_below_water;

            if vehicle.is_water_vehicle {
                let contribution = self.water.buoyancy(vehicle, depth, now);
                if contribution.valid {
                    self.vehicle_outputs[slot].force += contribution.force;
                    self.vehicle_outputs[slot].torque += contribution.torque;

                    // Screw thrust and rudder yaw while the hull is wet.
                    let thrust = vehicle.throttle * vehicle.profile.max_engine_torque
                        / vehicle.profile.wheel_radius.max(1e-3)
                        * 0.5;
                    self.vehicle_outputs[slot].force += vehicle.forward() * thrust;
                    let rudder = -vehicle.steer * vehicle.speed().min(10.0) * vehicle.mass * 0.08;
                    self.vehicle_outputs[slot].torque += vector![0.0, rudder, 0.0];
                }
            } else if depth > 0.0 {
                let contribution = self.water.sinking(vehicle, depth, dt);
                if vehicle.destroyed {
                    log::info!("vehicle in slot {slot} lost to submersion");
                    self.registry.defer_unregister(slot);
                }
                self.vehicle_outputs[slot].force += contribution.force;
            } else {
                vehicle.submersion_timer = 0.0;
            }
        }
    }

    // ------------------------------------------------------------------
    // Stage 5: ABS / TC / ESC, sequential because it mutates persisted
    // multiplier state on each vehicle. `force_scale` is the wet/activity
    // factor the vehicle pass applied, so corrections shrink with it.
    // ------------------------------------------------------------------
    fn stage_stability_pass(&mut self, force_scale: f32, dt: f32) {
        let Self {
            registry,
            stability,
            wheel_outputs,
            vehicle_outputs,
            ..
        } = self;

        let slots: Vec<usize> = registry.active_slots().collect();
        for slot in slots {
            let Some((vehicle, wheels)) = registry.vehicle_and_wheels_mut(slot) else {
                continue;
            };
            if vehicle.destroyed {
                continue;
            }
            let base = slot * WHEELS_PER_VEHICLE;
            let outputs = &wheel_outputs[base..base + WHEELS_PER_VEHICLE];
            let raw = vehicle_outputs[slot];
            vehicle_outputs[slot] =
                stability.apply(vehicle, wheels, outputs, &raw, force_scale, dt);
        }
    }

    // ------------------------------------------------------------------
    // Stage 6: push impulses to the rigid bodies, advance rotational state
    // for animation, step the rapier world, drain queued removals.
    // ------------------------------------------------------------------
    fn stage_apply(&mut self, dt: f32) {
        let slots: Vec<usize> = self.registry.active_slots().collect();
        for slot in &slots {
            let slot = *slot;
            let Some((vehicle, wheels)) = self.registry.vehicle_and_wheels_mut(slot) else {
                continue;
            };
            let out = self.vehicle_outputs[slot];
            if out.valid {
                if let Some(body) = self.bodies.get_mut(vehicle.body) {
                    body.apply_impulse(out.force * dt, true);
                    body.apply_torque_impulse(out.torque * dt, true);
                }
            }

            let base = slot * WHEELS_PER_VEHICLE;
            for (wheel, wout) in wheels.iter_mut().zip(&self.wheel_outputs[base..base + WHEELS_PER_VEHICLE]) {
                if wout.valid {
                    wheel.rpm = wout.rpm;
                }
            }
        }

        // Gravity is injected in the vehicle pass; the integrator runs dry.
        let gravity = vector![0.0, 0.0, 0.0];
        let hooks = ();
        let mut events = ();
        self.pipeline.step(
            &gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &mut events,
            &hooks,
        );

        // Keep runaway bodies from escaping to absurd coordinates.
        for (_, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !pos.x.is_finite()
                || !pos.y.is_finite()
                || !pos.z.is_finite()
                || pos.x.abs() > 1_000.0
                || pos.y.abs() > 1_000.0
                || pos.z.abs() > 1_000.0;
            if bad {
                body.set_translation(vector![0.0, 1.0, 0.0], true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                log::warn!("reset runaway body to spawn height");
            }
        }

        // Batches have joined; queued removals are now safe to apply.
        for (slot, state) in self.registry.drain_pending() {
            self.remove_body(state.body);
            log::info!("slot {slot} released");
        }
    }

    fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RUNABOUT, SKIFF, SimConfig};

    fn pipeline() -> VehiclePhysicsPipeline {
        let cfg = SimConfig::default();
        let registry = VehicleRegistry::new(cfg.max_vehicles);
        let cache = TerrainSamplingCache::new(cfg.cache_window, cfg.cache_prune_age);
        let env = EnvironmentProvider::new(cfg.quiet_activity_level, cfg.activity_transition);
        let mut p = VehiclePhysicsPipeline::new(cfg, registry, cache, env);
        p.initialize();
        p
    }

    fn run_seconds(p: &mut VehiclePhysicsPipeline, seconds: f32) {
        let dt = 1.0 / 60.0;
        let ticks = (seconds / dt).round() as usize;
        for _ in 0..ticks {
            p.update(dt);
        }
    }

    #[test]
    fn settled_vehicle_stays_grounded_and_bounded() {
        let mut p = pipeline();
        let slot = p.register_vehicle(RUNABOUT, [0.0, 1.3, 0.0]).unwrap();
        run_seconds(&mut p, 3.0);

        let (pos, _) = p.body_position(slot).unwrap();
        assert!(pos.y.is_finite() && pos.y > -0.5 && pos.y < 2.5);
        let grounded = p.registry().wheels(slot).iter().filter(|w| w.grounded).count();
        assert!(grounded >= 2, "expected settled wheels, got {grounded}");
    }

    #[test]
    fn throttle_moves_the_vehicle_forward() {
        let mut p = pipeline();
        let slot = p.register_vehicle(RUNABOUT, [0.0, 1.3, 0.0]).unwrap();
        run_seconds(&mut p, 2.0); // settle
        let (start, _) = p.body_position(slot).unwrap();

        p.apply_input(slot, 1.0, 0.0, 0.0);
        for _ in 0..240 {
            p.apply_input(slot, 1.0, 0.0, 0.0);
            p.update(1.0 / 60.0);
        }
        let (end, _) = p.body_position(slot).unwrap();
        // Chassis forward is -Z.
        assert!(end.z < start.z - 1.0, "start {} end {}", start.z, end.z);
    }

    #[test]
    fn capacity_rejection_does_not_disturb_running_vehicles() {
        let cfg = SimConfig {
            max_vehicles: 2,
            ..SimConfig::default()
        };
        let registry = VehicleRegistry::new(cfg.max_vehicles);
        let cache = TerrainSamplingCache::new(cfg.cache_window, cfg.cache_prune_age);
        let env = EnvironmentProvider::new(cfg.quiet_activity_level, cfg.activity_transition);
        let mut p = VehiclePhysicsPipeline::new(cfg, registry, cache, env);
        p.initialize();

        p.register_vehicle(RUNABOUT, [0.0, 1.3, 0.0]).unwrap();
        p.register_vehicle(RUNABOUT, [6.0, 1.3, 0.0]).unwrap();
        assert!(matches!(
            p.register_vehicle(RUNABOUT, [12.0, 1.3, 0.0]),
            Err(RegistryError::CapacityExceeded { .. })
        ));

        run_seconds(&mut p, 1.0);
        assert_eq!(p.telemetry().active_vehicles, 2);
    }

    #[test]
    fn water_vehicle_floats_in_the_lagoon() {
        let mut p = pipeline();
        let slot = p.register_vehicle(SKIFF, [160.0, 0.5, 0.0]).unwrap();
        run_seconds(&mut p, 6.0);

        let (pos, _) = p.body_position(slot).unwrap();
        // Floats near the surface instead of resting on the seabed at -5.
        assert!(pos.y > -2.0, "skiff sank to {}", pos.y);
        assert!(p.registry().vehicle(slot).is_some());
    }

    #[test]
    fn submerged_land_vehicle_is_destroyed_and_removed() {
        let mut p = pipeline();
        // Drop a car straight into the lagoon.
        let slot = p.register_vehicle(RUNABOUT, [160.0, -3.0, 0.0]).unwrap();
        run_seconds(&mut p, 8.0);

        assert!(p.registry().vehicle(slot).is_none(), "car should be gone");
        assert_eq!(p.telemetry().active_vehicles, 0);
    }

    #[test]
    fn deferred_unregister_applies_after_the_tick() {
        let mut p = pipeline();
        let slot = p.register_vehicle(RUNABOUT, [0.0, 1.3, 0.0]).unwrap();
        p.unregister_vehicle(slot);
        assert!(p.registry().vehicle(slot).is_some()); // still queued
        p.update(1.0 / 60.0);
        assert!(p.registry().vehicle(slot).is_none());
    }

    #[test]
    fn released_slot_is_immediately_reusable() {
        let cfg = SimConfig {
            max_vehicles: 1,
            ..SimConfig::default()
        };
        let registry = VehicleRegistry::new(cfg.max_vehicles);
        let cache = TerrainSamplingCache::new(cfg.cache_window, cfg.cache_prune_age);
        let env = EnvironmentProvider::new(cfg.quiet_activity_level, cfg.activity_transition);
        let mut p = VehiclePhysicsPipeline::new(cfg, registry, cache, env);
        p.initialize();

        let slot = p.register_vehicle(RUNABOUT, [0.0, 1.3, 0.0]).unwrap();
        // Respawn against a full arena, without a tick in between.
        p.release_vehicle(slot);
        let again = p.register_vehicle(RUNABOUT, [5.0, 1.3, 0.0]).unwrap();
        assert_eq!(again, slot);
        assert_eq!(p.registry().active_count(), 1);
    }

    #[test]
    fn stalled_frame_runs_a_bounded_number_of_ticks() {
        let mut p = pipeline();
        p.update(10.0); // multi-second stall
        assert!(p.telemetry().tick <= 5, "tick burst: {}", p.telemetry().tick);
        assert!(p.telemetry().tick >= 1);
    }

    #[test]
    fn telemetry_tracks_ticks_and_modifier() {
        let mut p = pipeline();
        p.environment_mut().set_quiet_period(true);
        run_seconds(&mut p, 1.0);

        let t = p.telemetry();
        assert_eq!(t.tick, 60);
        assert!(t.activity_modifier < 1.0);
        assert!(t.avg_tick_ms >= 0.0);
    }
}
