// src/state.rs
//
// Session bookkeeping for connected clients plus snapshot broadcast. The
// physics pipeline owns all simulation state; this layer only maps session
// ids to registry slots and serializes what the bodies look like now.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::pipeline::{Telemetry, VehiclePhysicsPipeline};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlAxes {
    pub throttle: f32,
    pub brake: f32,
    pub steer: f32,
}

pub struct Session {
    pub id: String,
    pub slot: Option<usize>,
    pub tx: UnboundedSender<String>,
    pub last_input: Option<ControlAxes>,
}

#[derive(Serialize)]
pub struct VehicleSnapshot {
    pub id: String,
    pub profile: &'static str,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub qw: f32,
    pub speed: f32,
    pub wheel_rpm: [f32; 4],
}

#[derive(Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub vehicles: Vec<VehicleSnapshot>,
    pub telemetry: Telemetry,
}

pub struct SharedServerState {
    pub clients: Vec<UnboundedSender<String>>,
    pub sessions: HashMap<String, Session>,
}

impl SharedServerState {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) {
        self.clients.push(tx);
    }

    pub fn add_session(&mut self, id: String, tx: UnboundedSender<String>) {
        self.sessions.insert(
            id.clone(),
            Session {
                id,
                slot: None,
                tx,
                last_input: None,
            },
        );
    }

    pub fn update_input(&mut self, id: &str, axes: ControlAxes) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.last_input = Some(axes);
        }
    }

    /// Drop a session, returning the slot that still needs unregistering.
    pub fn remove_session(&mut self, id: &str) -> Option<usize> {
        let session = self.sessions.remove(id)?;
        self.clients.retain(|c| !c.same_channel(&session.tx));
        session.slot
    }

    /// Reconcile sessions against the registry: a vehicle the pipeline
    /// destroyed (deep submersion) leaves its session slotless, and the
    /// client is told so it can request a respawn.
    pub fn reconcile(&mut self, pipeline: &VehiclePhysicsPipeline) {
        for session in self.sessions.values_mut() {
            if let Some(slot) = session.slot {
                if pipeline.registry().vehicle(slot).is_none() {
                    session.slot = None;
                    session.last_input = None;
                    let _ = session.tx.send(r#"{"type":"vehicle_lost"}"#.to_string());
                }
            }
        }
    }

    /// Build and send a snapshot of every live vehicle to all clients.
    pub fn broadcast_snapshot(&self, pipeline: &VehiclePhysicsPipeline) {
        let mut vehicles = Vec::with_capacity(self.sessions.len());

        for session in self.sessions.values() {
            let Some(slot) = session.slot else { continue };
            let Some(vehicle) = pipeline.registry().vehicle(slot) else {
                continue;
            };
            let Some((pos, rot)) = pipeline.body_position(slot) else {
                continue;
            };

            let wheels = pipeline.registry().wheels(slot);
            let mut wheel_rpm = [0.0f32; 4];
            for (i, w) in wheels.iter().enumerate() {
                wheel_rpm[i] = w.rpm;
            }

            vehicles.push(VehicleSnapshot {
                id: session.id.clone(),
                profile: vehicle.profile.name,
                x: pos.x,
                y: pos.y,
                z: pos.z,
                qx: rot.i,
                qy: rot.j,
                qz: rot.k,
                qw: rot.w,
                speed: vehicle.speed(),
                wheel_rpm,
            });
        }

        let snapshot = Snapshot {
            tick: pipeline.telemetry().tick,
            vehicles,
            telemetry: pipeline.telemetry(),
        };
        let json = match serde_json::to_string(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                log::error!("snapshot serialization failed: {e}");
                return;
            }
        };

        for tx in &self.clients {
            let _ = tx.send(json.clone());
        }
    }
}
