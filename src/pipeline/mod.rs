//! The echo pipeline
//!
//! Every request that is not an admin endpoint runs these stages in order,
//! each of which may answer the request and stop the rest:
//!
//! 1. count the request and record it in history
//! 2. resolve directives (request header, else process default)
//! 3. sleep for the selected delay, if any
//! 4. inject a forced status, a simulated error or a chaos failure
//! 5. serve the path's scenario, if one is installed
//! 6. render the echo response

use crate::chaos::FaultInjector;
use crate::delay;
use crate::directive::ResolvedDirectives;
use crate::middleware::{HttpRequest, HttpResponse, RequestContext};
use crate::render::EchoRenderer;
use crate::replay::RequestRecord;
use crate::state::AppState;
use std::sync::Arc;
use tracing::debug;

pub struct EchoPipeline {
    state: Arc<AppState>,
    injector: FaultInjector,
}

impl EchoPipeline {
    pub fn new(state: Arc<AppState>) -> Self {
        let injector = FaultInjector::new(state.rng.clone(), state.metrics.clone());
        Self { state, injector }
    }

    pub async fn handle(&self, request: HttpRequest, ctx: RequestContext) -> HttpResponse {
        let state = &self.state;
        let count = state.next_request_count();

        if state.history.is_enabled() {
            state.history.record(RequestRecord::capture(&request));
        }

        let directives = ResolvedDirectives::resolve(request.headers(), &state.defaults);

        if let Some(slept) = delay::simulate(&directives, state.rng.as_ref()).await {
            debug!(
                request_id = %ctx.request_id,
                delay_ms = slept.as_millis() as u64,
                "Applied delay"
            );
        }

        if let Some(response) = self.injector.intercept(&directives, &request, &ctx).await {
            return response;
        }

        if let Some(response) = state
            .scenarios
            .respond(&request, &ctx, state.rng.as_ref())
            .await
        {
            return response;
        }

        EchoRenderer {
            defaults: &state.defaults,
            rng: state.rng.as_ref(),
            identity: &state.identity,
        }
        .render(&request, &ctx, &directives, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::rng::ScriptedRng;
    use crate::scenario::{ScenarioDefinition, ScenarioResponse};
    use bytes::Bytes;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;

    fn pipeline(rng: ScriptedRng) -> (Arc<AppState>, EchoPipeline) {
        let state = Arc::new(
            AppState::new(Config::default())
                .unwrap()
                .with_rng(Arc::new(rng)),
        );
        (state.clone(), EchoPipeline::new(state))
    }

    fn post(path: &str, id: &'static str) -> http::request::Builder {
        Request::builder().method("POST").uri(path).header("x-request-id", id)
    }

    async fn body_of(response: HttpResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_plain_echo_counts_and_records() {
        let (state, pipeline) = pipeline(ScriptedRng::new([]));
        let request = post("/echo", "r1").body(Bytes::from_static(b"hello")).unwrap();

        let response = pipeline.handle(request, RequestContext::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-echo-request-count"], "1");
        assert_eq!(body_of(response).await, Bytes::from_static(b"hello"));

        assert_eq!(state.request_count(), 1);
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history.find("r1").unwrap().body, b"hello");
    }

    #[tokio::test]
    async fn test_fault_wins_over_scenario() {
        let (state, pipeline) = pipeline(ScriptedRng::new([]));
        state
            .scenarios
            .install(vec![ScenarioDefinition {
                path: "/roll".to_string(),
                responses: vec![ScenarioResponse {
                    status: 202,
                    delay: None,
                    body: "scripted".to_string(),
                }],
            }])
            .unwrap();

        let request = post("/roll", "a")
            .header("x-echo-error", "unavailable")
            .body(Bytes::new())
            .unwrap();
        let response = pipeline.handle(request, RequestContext::new()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        // the scenario cursor did not move
        assert_eq!(state.scenarios.cursor("/roll"), Some(0));

        let request = post("/roll", "b").body(Bytes::new()).unwrap();
        let response = pipeline.handle(request, RequestContext::new()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_of(response).await, Bytes::from_static(b"scripted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_runs_before_response() {
        let (_state, pipeline) = pipeline(ScriptedRng::new([]));
        let request = post("/slow", "d")
            .header("x-echo-delay", "250")
            .body(Bytes::from_static(b"x"))
            .unwrap();

        let start = tokio::time::Instant::now();
        let response = pipeline.handle(request, RequestContext::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_history_disabled() {
        let mut config = Config::default();
        config.history.size = 0;
        let state = Arc::new(AppState::new(config).unwrap());
        let pipeline = EchoPipeline::new(state.clone());

        let request = post("/x", "h").body(Bytes::new()).unwrap();
        pipeline.handle(request, RequestContext::new()).await;
        assert!(state.history.is_empty());
        assert_eq!(state.request_count(), 1);
    }
}
