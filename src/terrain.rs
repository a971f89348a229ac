// src/terrain.rs
//
// Surface classification under each wheel. A raycast into world geometry is
// comparatively expensive and serialized on the owning thread, so results are
// memoized on a quantized grid for a short window. A miss (wheel hanging over
// a hole in the geometry) silently degrades to the road profile instead of
// surfacing an error; the tick must never stall on terrain.

use rapier3d::prelude::*;
use std::collections::HashMap;

/// Surface classification attached to world geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainType {
    Road,
    Sand,
    Grass,
    Mud,
    Rock,
    Coral,
    Water,
}

impl TerrainType {
    /// (friction, rolling resistance, sink depth) per surface.
    pub fn surface_profile(self) -> (f32, f32, f32) {
        match self {
            TerrainType::Road => (0.85, 0.015, 0.0),
            TerrainType::Sand => (0.65, 0.08, 0.06),
            TerrainType::Grass => (0.7, 0.045, 0.02),
            TerrainType::Mud => (0.45, 0.12, 0.12),
            TerrainType::Rock => (0.8, 0.02, 0.0),
            TerrainType::Coral => (0.6, 0.06, 0.03),
            TerrainType::Water => (0.2, 0.2, 0.5),
        }
    }
}

/// One cached surface lookup. Copied freely; wheel slots keep the sample they
/// last saw so the wheel pass never touches the cache.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainSample {
    pub terrain: TerrainType,
    pub friction: f32,
    pub rolling_resistance: f32,
    pub sink_depth: f32,
    pub is_valid: bool,
    pub sampled_at: f64,
}

impl TerrainSample {
    pub fn from_type(terrain: TerrainType, now: f64) -> Self {
        let (friction, rolling_resistance, sink_depth) = terrain.surface_profile();
        Self {
            terrain,
            friction,
            rolling_resistance,
            sink_depth,
            is_valid: true,
            sampled_at: now,
        }
    }

    /// Default profile when geometry has nothing to say.
    pub fn road_default(now: f64) -> Self {
        Self::from_type(TerrainType::Road, now)
    }
}

impl Default for TerrainSample {
    fn default() -> Self {
        Self::road_default(0.0)
    }
}

pub struct GroundHit {
    pub point: Point<Real>,
    pub surface: TerrainType,
}

/// Seam to the world-geometry service. The pipeline hands the cache a
/// per-tick borrow of its rapier sets through this trait; tests hand it a
/// canned table.
pub trait GroundQuery {
    /// Downward query from above `position`.
    fn query_ground(&self, position: Point<Real>) -> Option<GroundHit>;

    /// Water-volume overlap check. Water wins over any raycast result.
    fn query_water_volume(&self, position: Point<Real>) -> bool;
}

/// Axis-aligned water region with a surface height.
#[derive(Clone, Copy, Debug)]
pub struct WaterRegion {
    pub min: Point<Real>,
    pub max: Point<Real>,
    pub surface_y: Real,
}

impl WaterRegion {
    pub fn contains(&self, p: Point<Real>) -> bool {
        self.contains_xz(p) && p.y <= self.surface_y
    }

    /// Footprint test ignoring depth, for callers that compare against
    /// `surface_y` themselves.
    pub fn contains_xz(&self, p: Point<Real>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.z >= self.min.z && p.z <= self.max.z
    }
}

/// Rapier-backed ground query. Borrows the pipeline's sets for one tick;
/// never stored.
pub struct WorldGeometry<'a> {
    pub bodies: &'a RigidBodySet,
    pub colliders: &'a ColliderSet,
    pub query_pipeline: &'a QueryPipeline,
    pub surface_tags: &'a HashMap<ColliderHandle, TerrainType>,
    pub water_regions: &'a [WaterRegion],
    pub filter: QueryFilter<'a>,
}

const RAY_START_HEIGHT: Real = 4.0;
const RAY_MAX_DIST: Real = 60.0;

impl GroundQuery for WorldGeometry<'_> {
    fn query_ground(&self, position: Point<Real>) -> Option<GroundHit> {
        let origin = point![position.x, position.y + RAY_START_HEIGHT, position.z];
        let ray = Ray::new(origin, vector![0.0, -1.0, 0.0]);

        let (handle, toi) = self.query_pipeline.cast_ray(
            self.bodies,
            self.colliders,
            &ray,
            RAY_MAX_DIST,
            true,
            self.filter,
        )?;

        let surface = self
            .surface_tags
            .get(&handle)
            .copied()
            .unwrap_or(TerrainType::Road);

        Some(GroundHit {
            point: origin + ray.dir * toi,
            surface,
        })
    }

    fn query_water_volume(&self, position: Point<Real>) -> bool {
        self.water_regions.iter().any(|r| r.contains(position))
    }
}

/// Quantized, time-windowed memo over `GroundQuery`. Owned and mutated by
/// the simulation thread only.
pub struct TerrainSamplingCache {
    entries: HashMap<(i32, i32, i32), TerrainSample>,
    window: f64,
    prune_age: f64,
    last_prune: f64,
}

const CELL_SIZE: Real = 1.0;

fn cache_key(p: Point<Real>) -> (i32, i32, i32) {
    (
        (p.x / CELL_SIZE).floor() as i32,
        (p.y / CELL_SIZE).floor() as i32,
        (p.z / CELL_SIZE).floor() as i32,
    )
}

impl TerrainSamplingCache {
    pub fn new(window: f64, prune_age: f64) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            prune_age,
            last_prune: 0.0,
        }
    }

    /// Surface at `position`. Re-queries only when the cached entry is older
    /// than the validity window.
    pub fn sample(&mut self, position: Point<Real>, world: &dyn GroundQuery, now: f64) -> TerrainSample {
        let key = cache_key(position);
        if let Some(hit) = self.entries.get(&key) {
            if now - hit.sampled_at <= self.window {
                return *hit;
            }
        }

        let sample = if world.query_water_volume(position) {
            TerrainSample::from_type(TerrainType::Water, now)
        } else {
            match world.query_ground(position) {
                Some(hit) => TerrainSample::from_type(hit.surface, now),
                None => TerrainSample::road_default(now),
            }
        };

        self.entries.insert(key, sample);
        sample
    }

    /// Drop entries older than the prune age. Cheap enough to run once per
    /// second rather than every tick.
    pub fn prune(&mut self, now: f64) {
        if now - self.last_prune < 1.0 {
            return;
        }
        self.last_prune = now;
        let prune_age = self.prune_age;
        self.entries.retain(|_, s| now - s.sampled_at <= prune_age);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Canned query that counts calls and can change its answer.
    struct FakeWorld {
        surface: Cell<TerrainType>,
        water: bool,
        hits: bool,
        calls: Cell<usize>,
    }

    impl FakeWorld {
        fn new(surface: TerrainType) -> Self {
            Self {
                surface: Cell::new(surface),
                water: false,
                hits: true,
                calls: Cell::new(0),
            }
        }
    }

    impl GroundQuery for FakeWorld {
        fn query_ground(&self, position: Point<Real>) -> Option<GroundHit> {
            self.calls.set(self.calls.get() + 1);
            self.hits.then(|| GroundHit {
                point: point![position.x, 0.0, position.z],
                surface: self.surface.get(),
            })
        }

        fn query_water_volume(&self, _position: Point<Real>) -> bool {
            self.water
        }
    }

    #[test]
    fn repeated_samples_within_window_are_identical_and_cached() {
        let world = FakeWorld::new(TerrainType::Sand);
        let mut cache = TerrainSamplingCache::new(1.0, 2.0);

        let a = cache.sample(point![3.2, 0.5, -7.9], &world, 0.0);
        let b = cache.sample(point![3.4, 0.5, -7.8], &world, 0.5);
        assert_eq!(a, b);
        assert_eq!(world.calls.get(), 1);
    }

    #[test]
    fn expired_entry_requeries_and_may_change() {
        let world = FakeWorld::new(TerrainType::Road);
        let mut cache = TerrainSamplingCache::new(1.0, 2.0);

        let a = cache.sample(point![0.0, 0.0, 0.0], &world, 0.0);
        world.surface.set(TerrainType::Mud);
        let b = cache.sample(point![0.0, 0.0, 0.0], &world, 1.5);
        assert_eq!(a.terrain, TerrainType::Road);
        assert_eq!(b.terrain, TerrainType::Mud);
        assert_eq!(world.calls.get(), 2);
    }

    #[test]
    fn miss_degrades_to_valid_road_profile() {
        let mut world = FakeWorld::new(TerrainType::Sand);
        world.hits = false;
        let mut cache = TerrainSamplingCache::new(1.0, 2.0);

        let s = cache.sample(point![10.0, 2.0, 10.0], &world, 0.0);
        assert!(s.is_valid);
        assert_eq!(s.terrain, TerrainType::Road);
    }

    #[test]
    fn water_overlap_wins_over_raycast() {
        let mut world = FakeWorld::new(TerrainType::Rock);
        world.water = true;
        let mut cache = TerrainSamplingCache::new(1.0, 2.0);

        let s = cache.sample(point![0.0, -1.0, 0.0], &world, 0.0);
        assert_eq!(s.terrain, TerrainType::Water);
        assert_eq!(world.calls.get(), 0);
    }

    #[test]
    fn prune_drops_old_entries() {
        let world = FakeWorld::new(TerrainType::Grass);
        let mut cache = TerrainSamplingCache::new(1.0, 2.0);

        cache.sample(point![0.0, 0.0, 0.0], &world, 0.0);
        cache.sample(point![50.0, 0.0, 50.0], &world, 3.0);
        cache.prune(3.5);
        assert_eq!(cache.len(), 1);
    }
}
