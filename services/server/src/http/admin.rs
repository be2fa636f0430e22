//! Read-only operational visibility endpoints (SPEC_FULL §6 SUPPLEMENT).
//! Not part of the wire protocol — these exist for operators, not clients.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct NamespaceSummary {
    name: String,
    socket_count: usize,
}

/// `GET <path>admin/namespaces`: every namespace created so far and its
/// live local socket count.
pub async fn list_namespaces(State(state): State<AppState>) -> Json<Vec<NamespaceSummary>> {
    let summaries = state
        .registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let ns = state.registry.get(&name)?;
            Some(NamespaceSummary {
                socket_count: ns.socket_count(),
                name,
            })
        })
        .collect();
    Json(summaries)
}

#[derive(Serialize)]
pub struct RoomMembers {
    room_to_sockets: HashMap<String, Vec<String>>,
}

/// `GET <path>admin/rooms/:nsp`: the room membership index for one
/// namespace, rebuilt from each local socket's own room set.
pub async fn list_room_members(
    State(state): State<AppState>,
    Path(nsp): Path<String>,
) -> Json<RoomMembers> {
    let nsp = format!("/{}", nsp.trim_start_matches('/'));
    let Some(ns) = state.registry.get(&nsp) else {
        return Json(RoomMembers {
            room_to_sockets: HashMap::new(),
        });
    };

    let mut room_to_sockets: HashMap<String, Vec<String>> = HashMap::new();
    for socket in ns.sockets() {
        for room in socket.rooms() {
            room_to_sockets.entry(room).or_default().push(socket.id.clone());
        }
    }
    Json(RoomMembers { room_to_sockets })
}
