mod batch;
mod config;
mod environment;
mod net;
mod pipeline;
mod registry;
mod stability;
mod state;
mod terrain;
mod tire;
mod water;

use crate::config::SimConfig;
use crate::environment::EnvironmentProvider;
use crate::net::start_websocket_server;
use crate::pipeline::VehiclePhysicsPipeline;
use crate::registry::VehicleRegistry;
use crate::state::SharedServerState;
use crate::terrain::TerrainSamplingCache;

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::{Duration, interval};

#[tokio::main]
async fn main() {
    env_logger::init();
    log::info!("starting vehicle physics server");

    let cfg = SimConfig::default();
    let registry = VehicleRegistry::new(cfg.max_vehicles);
    let cache = TerrainSamplingCache::new(cfg.cache_window, cfg.cache_prune_age);
    let environment = EnvironmentProvider::new(cfg.quiet_activity_level, cfg.activity_transition);

    let mut engine = VehiclePhysicsPipeline::new(cfg, registry, cache, environment);
    engine.initialize();

    let state = Arc::new(Mutex::new(SharedServerState::new()));
    let pipeline = Arc::new(Mutex::new(engine));

    tokio::spawn(start_websocket_server(
        Arc::clone(&state),
        Arc::clone(&pipeline),
    ));

    // ~60 Hz frame loop; the pipeline's accumulator turns the measured
    // frame time into fixed ticks.
    let mut ticker = interval(Duration::from_millis(16));
    let mut last_frame = Instant::now();

    loop {
        ticker.tick().await;
        let frame_dt = last_frame.elapsed().as_secs_f32();
        last_frame = Instant::now();

        let mut phys = pipeline.lock().await;
        let mut game = state.lock().await;

        // Feed the latest client inputs into the registry slots.
        for session in game.sessions.values() {
            if let (Some(slot), Some(axes)) = (session.slot, session.last_input) {
                phys.apply_input(slot, axes.throttle, axes.brake, axes.steer);
            }
        }

        phys.update(frame_dt);

        game.reconcile(&phys);
        game.broadcast_snapshot(&phys);
    }
}
