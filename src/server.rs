use crate::conflicts::{self, NameDirectory};
use crate::data::{Conflict, Diagnostic};
use crate::error::SolveError;
use crate::loader::{self, RawSnapshot};
use crate::commit::ScheduleDiff;
use crate::solver;
use axum::{routing::post, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct GenerateResponse {
    diff: ScheduleDiff,
    assigned_subjects: usize,
    sessions: usize,
    diagnostics: Vec<Diagnostic>,
}

fn error_status(err: &SolveError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    match err {
        SolveError::InputInvalid(_) => StatusCode::BAD_REQUEST,
        e if e.is_infeasible() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn generate_handler(
    Json(raw): Json<RawSnapshot>,
) -> Result<Json<GenerateResponse>, (axum::http::StatusCode, String)> {
    let mut diagnostics = Vec::new();
    match solver::solve(&raw, &mut diagnostics) {
        Ok(outcome) => Ok(Json(GenerateResponse {
            diff: outcome.diff,
            assigned_subjects: outcome.assigned_subjects,
            sessions: outcome.sessions,
            diagnostics,
        })),
        Err(e) => Err((error_status(&e), e.to_string())),
    }
}

async fn conflicts_handler(
    Json(raw): Json<RawSnapshot>,
) -> Result<Json<Vec<Conflict>>, (axum::http::StatusCode, String)> {
    let rows = loader::committed_rows(&raw).map_err(|e| (error_status(&e), e.to_string()))?;
    let names = NameDirectory::from_raw(&raw);
    Ok(Json(conflicts::detect(&rows, &names)))
}

pub async fn run_server(bind: &str) {
    let app = Router::new()
        .route("/v1/schedule/generate", post(generate_handler))
        .route("/v1/schedule/conflicts", post(conflicts_handler));

    let listener = tokio::net::TcpListener::bind(bind).await.unwrap();

    println!("Server running at http://{}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
