use crate::{error::RuntimeError, traits::Control};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use stampede_core::{BehaviorError, ControlError, RunConfig, RunStatus};
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument, warn};

/// Response body of `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStarted {
    pub run_id: String,
}

pub(crate) async fn server_task(port: u16, control: Arc<dyn Control>) -> Result<(), RuntimeError> {
    let app = router(control);

    let socket_addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    debug!("Axum server starting up on {socket_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

pub(crate) fn router(control: Arc<dyn Control>) -> Router {
    let state = ServerState { control };

    Router::new()
        .route("/run", post(run))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .with_state(Arc::new(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

struct ServerState {
    control: Arc<dyn Control>,
}

#[derive(Error, Debug)]
#[error(transparent)]
struct HandlerError(#[from] ControlError);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::AlreadyRunning => StatusCode::CONFLICT,
            ControlError::NoActiveRun | ControlError::Behavior(BehaviorError::NotRegistered(_)) => {
                StatusCode::NOT_FOUND
            }
            ControlError::Compile(_) | ControlError::Behavior(_) => StatusCode::BAD_REQUEST,
            ControlError::PoisonData | ControlError::Execution(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        warn!("Rejected control request: {}", self.0);
        (status, self.0.to_string()).into_response()
    }
}

#[instrument(skip_all, fields(behavior = %config.behavior))]
async fn run(
    State(state): State<Arc<ServerState>>,
    Json(config): Json<RunConfig>,
) -> Result<Json<RunStarted>, HandlerError> {
    let run_id = state.control.run_scenario(config)?;
    Ok(Json(RunStarted { run_id }))
}

#[instrument(skip_all)]
async fn stop(State(state): State<Arc<ServerState>>) -> Result<StatusCode, HandlerError> {
    state.control.stop_execution()?;
    Ok(StatusCode::OK)
}

async fn status(State(state): State<Arc<ServerState>>) -> Result<Json<RunStatus>, HandlerError> {
    Ok(Json(state.control.status()?))
}
