// src/net.rs
//
// WebSocket front end. One task per connection: a send loop fed by an
// unbounded channel plus a receive loop that parses input/spawn messages.
// Vehicle registration happens against the shared pipeline; a full arena is
// reported back to the client and the connection stays up so it can retry.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::config::{RUNABOUT, VehicleProfile};
use crate::pipeline::VehiclePhysicsPipeline;
use crate::state::{ControlAxes, SharedServerState};

#[derive(Debug)]
struct ClientMessage {
    msg_type: String,
    throttle: f32,
    brake: f32,
    steer: f32,
    profile: Option<String>,
}

impl ClientMessage {
    fn from_json(txt: &str) -> Option<Self> {
        let v = serde_json::from_str::<serde_json::Value>(txt).ok()?;

        Some(ClientMessage {
            msg_type: v.get("type")?.as_str()?.to_string(),
            throttle: v.get("throttle").and_then(|x| x.as_f64()).unwrap_or(0.0) as f32,
            brake: v.get("brake").and_then(|x| x.as_f64()).unwrap_or(0.0) as f32,
            steer: v.get("steer").and_then(|x| x.as_f64()).unwrap_or(0.0) as f32,
            profile: v
                .get("profile")
                .and_then(|x| x.as_str())
                .map(str::to_string),
        })
    }
}

fn spawn_position(profile: &VehicleProfile, slot_hint: usize) -> [f32; 3] {
    if profile.is_water_vehicle {
        // Inside the lagoon, staggered along the shore.
        [160.0, 0.5, -40.0 + slot_hint as f32 * 8.0]
    } else {
        [slot_hint as f32 * 6.0 - 60.0, 1.3, 40.0]
    }
}

/// Register a vehicle for a session, reporting capacity refusal to the
/// client instead of dropping the connection.
async fn spawn_vehicle(
    state: &Arc<Mutex<SharedServerState>>,
    pipeline: &Arc<Mutex<VehiclePhysicsPipeline>>,
    session_id: &str,
    profile_name: Option<&str>,
    tx: &mpsc::UnboundedSender<String>,
) {
    let profile = profile_name
        .and_then(VehicleProfile::by_name)
        .copied()
        .unwrap_or(RUNABOUT);

    let mut phys = pipeline.lock().await;
    let hint = phys.registry().active_count();
    let result = phys.register_vehicle(profile, spawn_position(&profile, hint));
    drop(phys);

    match result {
        Ok(slot) => {
            let mut game = state.lock().await;
            if let Some(session) = game.sessions.get_mut(session_id) {
                session.slot = Some(slot);
            }
            let _ = tx.send(format!(
                r#"{{"type":"spawned","slot":{slot},"profile":"{}"}}"#,
                profile.name
            ));
        }
        Err(e) => {
            let _ = tx.send(format!(r#"{{"type":"error","error":"{e}"}}"#));
        }
    }
}

pub async fn start_websocket_server(
    state: Arc<Mutex<SharedServerState>>,
    pipeline: Arc<Mutex<VehiclePhysicsPipeline>>,
) {
    let listener = match TcpListener::bind("0.0.0.0:9001").await {
        Ok(l) => l,
        Err(e) => {
            log::error!("failed to bind websocket port: {e}");
            return;
        }
    };
    log::info!("websocket listening on ws://0.0.0.0:9001");

    loop {
        let raw = match listener.accept().await {
            Ok((raw, _)) => raw,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        let state_clone = Arc::clone(&state);
        let pipeline_clone = Arc::clone(&pipeline);

        tokio::spawn(async move {
            let ws = match accept_async(raw).await {
                Ok(ws) => ws,
                Err(e) => {
                    log::warn!("websocket handshake failed: {e}");
                    return;
                }
            };
            let (mut write, mut read) = ws.split();

            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            let session_id = Uuid::new_v4().to_string();

            {
                let mut game = state_clone.lock().await;
                game.register_client(tx.clone());
                game.add_session(session_id.clone(), tx.clone());
            }

            // Send loop: snapshots and direct replies share one channel.
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if write.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
            });

            log::info!("client connected: {session_id}");
            let _ = tx.send(format!(
                r#"{{"type":"welcome","session_id":"{session_id}"}}"#
            ));

            // Default vehicle on connect; clients can respawn as another
            // profile later.
            spawn_vehicle(&state_clone, &pipeline_clone, &session_id, None, &tx).await;

            while let Some(msg) = read.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(_) => break,
                };
                if !msg.is_text() {
                    continue;
                }
                let text = match msg.to_text() {
                    Ok(t) => t,
                    Err(_) => continue,
                };

                if text.contains("\"type\":\"ping\"") {
                    let _ = tx.send("{\"type\":\"pong\"}".into());
                    continue;
                }

                let parsed = match ClientMessage::from_json(text) {
                    Some(v) => v,
                    None => continue,
                };

                match parsed.msg_type.as_str() {
                    "input" => {
                        let axes = ControlAxes {
                            throttle: parsed.throttle,
                            brake: parsed.brake,
                            steer: parsed.steer,
                        };
                        let mut game = state_clone.lock().await;
                        game.update_input(&session_id, axes);
                    }
                    "spawn" => {
                        // Release the current vehicle first, then claim a
                        // fresh slot with the requested profile.
                        let old_slot = {
                            let mut game = state_clone.lock().await;
                            game.sessions
                                .get_mut(&session_id)
                                .and_then(|s| s.slot.take())
                        };
                        // Immediate release, not a deferred one: the new
                        // registration below must see the slot free, and
                        // holding the pipeline lock keeps us between ticks.
                        if let Some(slot) = old_slot {
                            pipeline_clone.lock().await.release_vehicle(slot);
                        }
                        spawn_vehicle(
                            &state_clone,
                            &pipeline_clone,
                            &session_id,
                            parsed.profile.as_deref(),
                            &tx,
                        )
                        .await;
                    }
                    other => {
                        log::debug!("ignoring message type {other:?}");
                    }
                }
            }

            log::info!("client disconnected: {session_id}");
            let slot = {
                let mut game = state_clone.lock().await;
                game.remove_session(&session_id)
            };
            if let Some(slot) = slot {
                pipeline_clone.lock().await.unregister_vehicle(slot);
            }
        });
    }
}
