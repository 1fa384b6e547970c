use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::seq::IndexedRandom;
use runlib::errors::JobError;
use runlib::{JobTable, PollOutcome, ToolConfig};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub table: Arc<JobTable>,
    pub tool: ToolConfig,
    pub examples: PathBuf,
}

impl AppState {
    pub fn new(tool: ToolConfig, examples: PathBuf) -> Self {
        Self {
            table: Arc::new(JobTable::new()),
            tool,
            examples,
        }
    }
}

/// Wire shape of a poll response. The same payload carries execution
/// failures (structured or raw diagnostics) and unknown-pid errors.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PollReply {
    Running { output: String },
    Success { output: String },
    Error { message: Value },
}

impl From<PollOutcome> for PollReply {
    fn from(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Running { output } => PollReply::Running { output },
            PollOutcome::Succeeded { output } => PollReply::Success { output },
            PollOutcome::Failed { diagnostics } => PollReply::Error {
                message: diagnostics,
            },
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(random_example))
        .route("/run", post(run))
        .route("/poll/{pid}", get(poll))
        .route("/examples", get(list_examples))
        .route("/examples/{name}", get(get_example))
        .with_state(state)
}

async fn run(State(state): State<AppState>, code: String) -> Response {
    log::info!("user code:\n{}", code);
    match state.table.submit(&state.tool, &code) {
        Ok(pid) => Json(json!({ "pid": pid })).into_response(),
        Err(err) => {
            log::error!("submission failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn poll(State(state): State<AppState>, Path(pid): Path<u32>) -> Response {
    match state.table.poll(pid).await {
        Ok(outcome) => Json(PollReply::from(outcome)).into_response(),
        Err(err @ JobError::UnknownProcess) => Json(PollReply::Error {
            message: Value::String(err.to_string()),
        })
        .into_response(),
        Err(err) => {
            log::error!("poll of process {} failed: {}", pid, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PollReply::Error {
                    message: Value::String(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn list_examples(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(example_names(&state.examples))
}

async fn get_example(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if name.contains('/') || name.contains("..") {
        return StatusCode::NOT_FOUND.into_response();
    }
    match tokio::fs::read_to_string(state.examples.join(&name)).await {
        Ok(code) => code.into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn random_example(State(state): State<AppState>) -> Response {
    let names = example_names(&state.examples);
    let Some(name) = names.choose(&mut rand::rng()) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "no examples available" })),
        )
            .into_response();
    };
    match tokio::fs::read_to_string(state.examples.join(name)).await {
        Ok(code) => Json(json!({ "example": name, "code": code })).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": err.to_string() })),
        )
            .into_response(),
    }
}

fn example_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "ic"))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect(),
        Err(err) => {
            log::error!("reading examples dir {}: {}", dir.display(), err);
            Vec::new()
        }
    };
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    /// App state backed by a stand-in compiler that hands the scratch
    /// file to /bin/sh, plus one example file.
    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().expect("tempdir");
        let binary = dir.path().join("icarus");
        fs::write(&binary, "#!/bin/sh\nshift 3\nexec /bin/sh \"$1\"\n").expect("write tool");
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).expect("chmod tool");
        let stdlib = dir.path().join("stdlib");
        fs::create_dir(&stdlib).expect("mkdir stdlib");
        let examples = dir.path().join("examples");
        fs::create_dir(&examples).expect("mkdir examples");
        fs::write(examples.join("hello.ic"), "print(\"hello\")\n").expect("write example");
        let state = AppState::new(ToolConfig::new(binary, stdlib), examples);
        (dir, state)
    }

    async fn request(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
        (status, value)
    }

    async fn submit(app: &Router, code: &str) -> u32 {
        let (status, body) = request(app, Method::POST, "/run", code).await;
        assert_eq!(status, StatusCode::OK, "run failed: {}", body);
        body["pid"].as_u64().expect("pid in run reply") as u32
    }

    /// Poll until terminal, returning (combined output, terminal body).
    async fn poll_to_terminal(app: &Router, pid: u32) -> (String, Value) {
        let uri = format!("/poll/{}", pid);
        let mut combined = String::new();
        for _ in 0..500 {
            let (status, body) = request(app, Method::GET, &uri, "").await;
            assert_eq!(status, StatusCode::OK);
            match body["status"].as_str() {
                Some("running") => {
                    combined.push_str(body["output"].as_str().unwrap_or_default());
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                _ => return (combined, body),
            }
        }
        panic!("process {} never reached a terminal state", pid);
    }

    #[tokio::test]
    async fn run_then_poll_to_success() {
        let (_dir, state) = test_state();
        let app = router(state);
        let pid = submit(&app, "echo 42\n").await;

        let (mut combined, terminal) = poll_to_terminal(&app, pid).await;
        assert_eq!(terminal["status"], "success");
        combined.push_str(terminal["output"].as_str().unwrap_or_default());
        assert_eq!(combined, "42\n");

        // the terminal report was final
        let (status, body) = request(&app, Method::GET, &format!("/poll/{}", pid), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "No such process");
    }

    #[tokio::test]
    async fn poll_of_unknown_pid_is_an_error_payload() {
        let (_dir, state) = test_state();
        let app = router(state);
        let (status, body) = request(&app, Method::GET, "/poll/999999", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "No such process");
    }

    #[tokio::test]
    async fn failing_run_reports_structured_diagnostics() {
        let (_dir, state) = test_state();
        let app = router(state);
        let pid = submit(&app, "printf '{\"errors\":[\"type mismatch\"]}'\nexit 1\n").await;
        let (_, terminal) = poll_to_terminal(&app, pid).await;
        assert_eq!(terminal["status"], "error");
        assert_eq!(terminal["message"], json!({ "errors": ["type mismatch"] }));
    }

    #[tokio::test]
    async fn failing_run_falls_back_to_raw_text() {
        let (_dir, state) = test_state();
        let app = router(state);
        let pid = submit(&app, "printf 'oops'\nexit 1\n").await;
        let (_, terminal) = poll_to_terminal(&app, pid).await;
        assert_eq!(terminal["status"], "error");
        assert_eq!(terminal["message"], "oops");
    }

    #[tokio::test]
    async fn launch_failure_is_a_structured_500() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = AppState::new(
            ToolConfig::new("/no/such/binary", "/no/such/stdlib"),
            dir.path().to_path_buf(),
        );
        let app = router(state);
        let (status, body) = request(&app, Method::POST, "/run", "echo 42\n").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("/no/such/binary"));
    }

    #[tokio::test]
    async fn examples_are_listed_and_served() {
        let (_dir, state) = test_state();
        let app = router(state);

        let (status, body) = request(&app, Method::GET, "/examples", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["hello.ic"]));

        let (status, body) = request(&app, Method::GET, "/examples/hello.ic", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "print(\"hello\")\n");

        let (status, _) = request(&app, Method::GET, "/examples/missing.ic", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn index_serves_a_random_example() {
        let (_dir, state) = test_state();
        let app = router(state);
        let (status, body) = request(&app, Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["example"], "hello.ic");
        assert_eq!(body["code"], "print(\"hello\")\n");
    }
}
