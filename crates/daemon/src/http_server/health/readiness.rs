use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use time::OffsetDateTime;

use crate::ServiceState;

pub async fn healthz() -> impl IntoResponse {
    (http::StatusCode::OK, "ok")
}

/// Per-relationship rotation status. Generations and timestamps only —
/// nothing here may carry secret material.
#[derive(Debug, Serialize)]
pub struct ReadyzResponse {
    pub relationships: Vec<RelationshipStatus>,
}

#[derive(Debug, Serialize)]
pub struct RelationshipStatus {
    pub id: String,
    pub alias: String,
    pub role: String,
    pub generation: u64,
    pub round_in_flight: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_commit: Option<OffsetDateTime>,
}

pub async fn readyz(State(state): State<ServiceState>) -> impl IntoResponse {
    let mut relationships: Vec<RelationshipStatus> = state
        .relationships()
        .map(|handle| {
            let descriptor = handle.relationship.descriptor();
            RelationshipStatus {
                id: descriptor.id.to_string(),
                alias: descriptor.alias.clone(),
                role: descriptor.role.to_string(),
                generation: handle.relationship.generation(),
                round_in_flight: handle.relationship.round_in_flight(),
                last_commit: handle.relationship.committed_at(),
            }
        })
        .collect();
    relationships.sort_by(|a, b| a.id.cmp(&b.id));

    Json(ReadyzResponse { relationships })
}
