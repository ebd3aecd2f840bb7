// HTTP route handlers for the Arbiter API

use arbiter_common::types::{ExecuteRequest, JudgeRequest};
use arbiter_engine::JudgeError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::metrics::{
    self, InFlight, EXECUTE_REQUESTS, JUDGES_IN_FLIGHT, JUDGE_DURATION, JUDGE_REQUESTS,
    REJECTED_REQUESTS,
};
use crate::AppState;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// Take a judge slot or answer 503
fn acquire_slot(state: &AppState, request_id: Uuid) -> Result<OwnedSemaphorePermit, Response> {
    state.gate.clone().try_acquire_owned().map_err(|_| {
        REJECTED_REQUESTS.with_label_values(&["busy"]).inc();
        warn!(request_id = %request_id, "All judge slots busy");
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Too many concurrent judge requests",
        )
    })
}

/// POST /judge - Judge a submission synchronously
pub async fn judge_submission(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JudgeRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            REJECTED_REQUESTS.with_label_values(&["malformed"]).inc();
            warn!(request_id = %request_id, error = %rejection.body_text(), "Malformed judge request");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let _permit = match acquire_slot(&state, request_id) {
        Ok(permit) => permit,
        Err(response) => return response,
    };

    let language = request.language.to_string();
    let _in_flight = InFlight::start(&JUDGES_IN_FLIGHT);
    let timer = JUDGE_DURATION
        .with_label_values(&[language.as_str()])
        .start_timer();

    let span = info_span!("judge_request", request_id = %request_id);
    match state.judge.judge(&request).instrument(span).await {
        Ok(report) => {
            timer.observe_duration();
            JUDGE_REQUESTS
                .with_label_values(&[language.as_str(), report.verdict.as_str()])
                .inc();
            info!(
                request_id = %request_id,
                verdict = %report.verdict,
                passed = report.passed_count,
                total = report.total_count,
                "Judge request complete"
            );
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(JudgeError::InvalidRequest(reason)) => {
            timer.stop_and_discard();
            REJECTED_REQUESTS.with_label_values(&["invalid"]).inc();
            warn!(request_id = %request_id, reason = %reason, "Rejected judge request");
            error_response(StatusCode::BAD_REQUEST, reason)
        }
    }
}

/// POST /execute - Run a snippet with no entry function
///
/// Errors raised by the snippet are part of the 200 response body.
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            REJECTED_REQUESTS.with_label_values(&["malformed"]).inc();
            warn!(request_id = %request_id, error = %rejection.body_text(), "Malformed execute request");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let _permit = match acquire_slot(&state, request_id) {
        Ok(permit) => permit,
        Err(response) => return response,
    };

    let language = request.language.to_string();
    let _in_flight = InFlight::start(&JUDGES_IN_FLIGHT);

    let span = info_span!("execute_request", request_id = %request_id);
    match state.judge.execute(&request).instrument(span).await {
        Ok(report) => {
            let outcome = if report.timed_out {
                "timeout"
            } else if report.succeeded() {
                "ok"
            } else {
                "error"
            };
            EXECUTE_REQUESTS
                .with_label_values(&[language.as_str(), outcome])
                .inc();
            info!(
                request_id = %request_id,
                outcome,
                runtime_ms = report.runtime_ms,
                "Execute request complete"
            );
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(JudgeError::InvalidRequest(reason)) => {
            REJECTED_REQUESTS.with_label_values(&["invalid"]).inc();
            warn!(request_id = %request_id, reason = %reason, "Rejected execute request");
            error_response(StatusCode::BAD_REQUEST, reason)
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub language: String,
    pub command: String,
    pub args: Vec<String>,
}

/// GET /languages - Configured languages and their runtimes
pub async fn list_languages(State(state): State<Arc<AppState>>) -> Json<Vec<LanguageInfo>> {
    let languages = state
        .judge
        .languages()
        .into_iter()
        .filter_map(|language| {
            state.config.runtime(language).map(|runtime| LanguageInfo {
                language: language.to_string(),
                command: runtime.command.clone(),
                args: runtime.args.clone(),
            })
        })
        .collect();

    Json(languages)
}

/// GET /metrics - Prometheus exposition
pub async fn metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::config::EngineConfig;
    use arbiter_common::types::{
        ErrorPhase, ExecutionLimits, ExecutionResult, JudgeMode, Language, TestCase,
        TestCaseKind,
    };
    use arbiter_engine::normalizer::Value;
    use arbiter_engine::{ExecutionBackend, Judge};
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    /// Backend that echoes the first argument back as the return value
    struct EchoBackend;

    #[async_trait]
    impl ExecutionBackend for EchoBackend {
        fn supports(&self, language: Language) -> bool {
            language == Language::Python
        }

        async fn execute(
            &self,
            _language: Language,
            _code: &str,
            _function_name: &str,
            args: &[Value],
            _limits: &ExecutionLimits,
        ) -> ExecutionResult {
            let echoed = args
                .first()
                .map(|value| value.to_json().to_string())
                .unwrap_or_default();
            ExecutionResult {
                return_value: Some(echoed),
                runtime_ms: 1.0,
                ..Default::default()
            }
        }

        async fn run_script(
            &self,
            _language: Language,
            code: &str,
            _limits: &ExecutionLimits,
        ) -> ExecutionResult {
            match code.strip_prefix("raise ") {
                Some(message) => ExecutionResult::failure(ErrorPhase::Runtime, message),
                None => ExecutionResult {
                    return_value: Some(String::new()),
                    stdout: vec![code.to_string()],
                    runtime_ms: 1.0,
                    ..Default::default()
                },
            }
        }
    }

    fn make_state(slots: usize) -> Arc<AppState> {
        let config = EngineConfig::default();
        Arc::new(AppState {
            judge: Judge::with_backend(Arc::new(EchoBackend), &config),
            config,
            gate: Arc::new(Semaphore::new(slots)),
        })
    }

    fn make_request(language: Language) -> JudgeRequest {
        JudgeRequest {
            code: "def echo(x):\n    return x\n".to_string(),
            language,
            function_name: "echo".to_string(),
            test_cases: vec![
                TestCase {
                    input: "5".to_string(),
                    expected_output: "5".to_string(),
                    kind: TestCaseKind::Run,
                },
                TestCase {
                    input: "6".to_string(),
                    expected_output: "7".to_string(),
                    kind: TestCaseKind::Submit,
                },
            ],
            mode: JudgeMode::Run,
            time_limit_ms: 1000,
            memory_limit_kb: 1024,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_judge_returns_report() {
        let response =
            judge_submission(State(make_state(1)), Ok(Json(make_request(Language::Python)))).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["verdict"], "Wrong Answer");
        assert_eq!(body["passedCount"], 1);
        assert_eq!(body["totalCount"], 2);
        assert_eq!(body["outcomes"][0]["producedOutput"], "5");
        assert_eq!(body["outcomes"][1]["kind"], "submit");
    }

    #[tokio::test]
    async fn test_invalid_request_is_bad_request() {
        let response = judge_submission(
            State(make_state(1)),
            Ok(Json(make_request(Language::JavaScript))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("javascript"));
    }

    #[tokio::test]
    async fn test_busy_gate_is_service_unavailable() {
        let response =
            judge_submission(State(make_state(0)), Ok(Json(make_request(Language::Python)))).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    fn make_execute(code: &str, language: Language) -> ExecuteRequest {
        ExecuteRequest {
            code: code.to_string(),
            language,
            time_limit_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_execute_returns_printed_output() {
        let response = execute_code(
            State(make_state(1)),
            Ok(Json(make_execute("print('hi')", Language::Python))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"], "print('hi')");
        assert_eq!(body["stdout"][0], "print('hi')");
        assert_eq!(body["error"], serde_json::Value::Null);
        assert_eq!(body["timedOut"], false);
    }

    #[tokio::test]
    async fn test_execute_error_is_part_of_report() {
        let response = execute_code(
            State(make_state(1)),
            Ok(Json(make_execute("raise NameError: name 'x' is not defined", Language::Python))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"], serde_json::Value::Null);
        assert_eq!(body["error"], "NameError: name 'x' is not defined");
    }

    #[tokio::test]
    async fn test_execute_validation_and_gate() {
        let unsupported = execute_code(
            State(make_state(1)),
            Ok(Json(make_execute("console.log(1)", Language::JavaScript))),
        )
        .await;
        assert_eq!(unsupported.status(), StatusCode::BAD_REQUEST);

        let busy = execute_code(
            State(make_state(0)),
            Ok(Json(make_execute("print(1)", Language::Python))),
        )
        .await;
        assert_eq!(busy.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_languages_lists_backend_languages() {
        let Json(languages) = list_languages(State(make_state(1))).await;

        assert_eq!(languages.len(), 1);
        assert_eq!(languages[0].language, "python");
        assert_eq!(languages[0].command, "python3");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = metrics().await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
