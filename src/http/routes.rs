//! HTTP route definitions

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::replay::{verify, verify_trace, Verification};
use crate::game::snapshot::MatchSnapshot;
use crate::game::validator::RejectionStats;
use crate::game::{
    EngineConfig, GameMatch, GameMode, HmacAuthenticator, InputLog, MatchExport, MatchSetup,
    PlayerId, Roster, StateHash,
};
use crate::util::time::{match_length, uptime_secs};
use crate::ws::handler::ws_handler;

/// Upper bound for any request, replays included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/matches", post(create_match_handler))
        .route("/matches/:id", get(match_status_handler))
        .route("/matches/:id/log", get(match_log_handler))
        .route("/matches/:id/cancel", post(cancel_match_handler))
        .route("/verify", post(verify_handler))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    finished_matches: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        finished_matches: state.match_registry.finished_matches(),
    })
}

// ============================================================================
// Match lifecycle endpoints
// ============================================================================

#[derive(Deserialize)]
pub struct CreateMatchRequest {
    #[serde(with = "hex::serde")]
    pub seed: Vec<u8>,
    pub home: Roster,
    pub away: Roster,
    #[serde(default)]
    pub mode: GameMode,
    pub duration_ticks: Option<u64>,
    /// Hex-encoded HMAC key per player id
    #[serde(default)]
    pub player_keys: BTreeMap<PlayerId, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMatchResponse {
    pub match_id: Uuid,
    pub duration_ticks: u64,
    pub expected_duration_secs: u64,
    pub ws_url: String,
}

impl CreateMatchRequest {
    /// Setup and authenticator for a new match, with server-side defaults
    /// filled in
    pub fn into_setup(
        self,
        default_duration: Option<u64>,
        lookahead: Option<u64>,
    ) -> Result<(MatchSetup, HmacAuthenticator), ApiError> {
        let mut config = EngineConfig::for_mode(self.mode);
        if let Some(duration) = self.duration_ticks.or(default_duration) {
            config.duration_ticks = duration;
        }
        if let Some(lookahead) = lookahead {
            config.lookahead_ticks = lookahead;
        }

        let mut authenticator = HmacAuthenticator::default();
        for (player_id, key) in self.player_keys {
            if !(1..=22).contains(&player_id.0) {
                return Err(ApiError::BadRequest(format!("unknown player id {player_id}")));
            }
            let key = hex::decode(key.trim())
                .map_err(|e| ApiError::BadRequest(format!("key for player {player_id}: {e}")))?;
            authenticator.insert(player_id, key);
        }

        let setup = MatchSetup {
            match_id: Uuid::new_v4(),
            seed: self.seed,
            home: self.home,
            away: self.away,
            config,
        };
        Ok((setup, authenticator))
    }
}

async fn create_match_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<(StatusCode, Json<CreateMatchResponse>), ApiError> {
    let (setup, authenticator) =
        req.into_setup(state.config.default_duration_ticks, state.config.input_lookahead)?;
    let duration_ticks = setup.config.duration_ticks;

    let (game_match, handle) = GameMatch::new(setup, authenticator)?;
    let match_id = handle.id;
    state.match_registry.spawn(game_match, handle);

    info!(match_id = %match_id, duration_ticks, "Match created");

    Ok((
        StatusCode::CREATED,
        Json(CreateMatchResponse {
            match_id,
            duration_ticks,
            expected_duration_secs: match_length(duration_ticks).as_secs(),
            ws_url: format!("/ws?match_id={match_id}"),
        }),
    ))
}

#[derive(Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum MatchStatusResponse {
    Running(MatchSnapshot),
    Finished {
        export: MatchExport,
        rejections: RejectionStats,
    },
}

async fn match_status_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchStatusResponse>, ApiError> {
    if let Some(handle) = state.match_registry.get(&id) {
        return Ok(Json(MatchStatusResponse::Running(handle.status())));
    }
    let finished = state
        .match_registry
        .finished(&id)
        .ok_or_else(|| ApiError::NotFound(format!("match {id}")))?;
    Ok(Json(MatchStatusResponse::Finished {
        export: finished.export.clone(),
        rejections: finished.rejections.clone(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchLogResponse {
    pub setup: MatchSetup,
    pub log: InputLog,
    pub final_tick: u64,
    pub final_state_hash: StateHash,
}

async fn match_log_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchLogResponse>, ApiError> {
    if let Some(finished) = state.match_registry.finished(&id) {
        return Ok(Json(MatchLogResponse {
            setup: finished.setup.clone(),
            log: finished.log.clone(),
            final_tick: finished.export.final_tick,
            final_state_hash: finished.export.final_state_hash,
        }));
    }
    if state.match_registry.get(&id).is_some() {
        return Err(ApiError::Conflict(format!("match {id} is still running")));
    }
    Err(ApiError::NotFound(format!("match {id}")))
}

async fn cancel_match_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let handle = state
        .match_registry
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("no running match {id}")))?;
    handle.cancel();
    info!(match_id = %id, "Match cancellation requested");
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Verification endpoint
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub setup: MatchSetup,
    pub log: InputLog,
    pub through_tick: Option<u64>,
    pub reference_hash: Option<StateHash>,
    pub reference_trace: Option<Vec<StateHash>>,
}

/// Run the requested replay, refusing anything longer than `max_ticks`.
/// Pure; safe on any thread.
pub fn run_verification(req: VerifyRequest, max_ticks: u64) -> Result<Verification, ApiError> {
    let requested = [
        req.setup.config.duration_ticks,
        req.through_tick.map_or(0, |t| t.saturating_add(1)),
        req.reference_trace.as_ref().map_or(0, |t| t.len() as u64),
    ];
    if requested.iter().any(|ticks| *ticks > max_ticks) {
        return Err(ApiError::BadRequest(format!(
            "replays are limited to {max_ticks} ticks"
        )));
    }

    match (req.reference_trace, req.reference_hash, req.through_tick) {
        (Some(trace), _, _) => Ok(verify_trace(&req.setup, &req.log, &trace)?),
        (None, Some(hash), Some(tick)) => Ok(verify(&req.setup, &req.log, tick, &hash)?),
        (None, Some(_), None) => Err(ApiError::BadRequest(
            "reference_hash requires through_tick".to_string(),
        )),
        (None, None, _) => Err(ApiError::BadRequest(
            "one of reference_hash or reference_trace is required".to_string(),
        )),
    }
}

async fn verify_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Verification>, ApiError> {
    let match_id = req.setup.match_id;
    let max_ticks = state.config.max_replay_ticks;
    let verification = tokio::task::spawn_blocking(move || run_verification(req, max_ticks))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    if !verification.is_match() {
        warn!(match_id = %match_id, ?verification, "Verification mismatch");
    }
    Ok(Json(verification))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::game::world::SetupError> for ApiError {
    fn from(err: crate::game::world::SetupError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(duration: Option<u64>) -> CreateMatchRequest {
        CreateMatchRequest {
            seed: b"route".to_vec(),
            home: Roster::uniform(50),
            away: Roster::uniform(50),
            mode: GameMode::Standard,
            duration_ticks: duration,
            player_keys: BTreeMap::from([(PlayerId(10), "0a0b".to_string())]),
        }
    }

    #[test]
    fn request_duration_beats_server_default() {
        let (setup, auth) = request(Some(120)).into_setup(Some(600), Some(3)).expect("valid");
        assert_eq!(setup.config.duration_ticks, 120);
        assert_eq!(setup.config.lookahead_ticks, 3);
        assert!(auth.knows(PlayerId(10)));

        let (setup, _) = request(None).into_setup(Some(600), None).expect("valid");
        assert_eq!(setup.config.duration_ticks, 600);
    }

    #[test]
    fn bad_keys_are_rejected() {
        let mut req = request(None);
        req.player_keys.insert(PlayerId(30), "00".to_string());
        assert!(matches!(req.into_setup(None, None), Err(ApiError::BadRequest(_))));

        let mut req = request(None);
        req.player_keys.insert(PlayerId(3), "zz".to_string());
        assert!(matches!(req.into_setup(None, None), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn create_request_parses_string_keyed_player_map() {
        let raw = serde_json::json!({
            "seed": "00ff",
            "home": vec![serde_json::json!({"pace": 50, "strength": 50, "accuracy": 50, "dribbling": 50}); 11],
            "away": vec![serde_json::json!({"pace": 50, "strength": 50, "accuracy": 50, "dribbling": 50}); 11],
            "mode": "arcade",
            "player_keys": {"7": "abcd"}
        });
        let req: CreateMatchRequest = serde_json::from_value(raw).expect("valid request");
        assert_eq!(req.seed, vec![0x00, 0xff]);
        assert_eq!(req.mode, GameMode::Arcade);
        assert!(req.player_keys.contains_key(&PlayerId(7)));
    }

    #[test]
    fn verification_needs_a_reference() {
        let (setup, _) = request(Some(10)).into_setup(None, None).expect("valid");
        let req = VerifyRequest {
            setup,
            log: InputLog::new(),
            through_tick: None,
            reference_hash: None,
            reference_trace: None,
        };
        assert!(matches!(run_verification(req, 1_000), Err(ApiError::BadRequest(_))));
    }

    fn verify_request(duration: u64, through_tick: u64) -> VerifyRequest {
        let (setup, _) = request(Some(duration)).into_setup(None, None).expect("valid");
        VerifyRequest {
            setup,
            log: InputLog::new(),
            through_tick: Some(through_tick),
            reference_hash: Some(StateHash::default()),
            reference_trace: None,
        }
    }

    #[test]
    fn oversized_replays_are_refused_before_running() {
        assert!(matches!(
            run_verification(verify_request(1_000_000, 10), 1_000),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            run_verification(verify_request(100, 1_000), 1_000),
            Err(ApiError::BadRequest(_))
        ));

        let mut req = verify_request(100, 10);
        req.reference_hash = None;
        req.reference_trace = Some(vec![StateHash::default(); 1_001]);
        assert!(matches!(run_verification(req, 1_000), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn replay_within_the_limit_runs() {
        let verification = run_verification(verify_request(100, 10), 1_000).expect("runs");
        assert_eq!(
            verification,
            Verification::Mismatch {
                first_diverging_tick: None
            }
        );
    }
}
