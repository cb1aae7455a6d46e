//! The assembled request path: middleware chain in front of the router

use crate::admin::AdminRouter;
use crate::error::Result;
use crate::middleware::{
    create_middleware, HttpRequest, HttpResponse, MiddlewareChain, RequestContext,
};
use crate::render::error_response;
use crate::replay::LocalResponder;
use crate::state::AppState;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{error, info};

/// One server instance's request path
pub struct App {
    state: Arc<AppState>,
    chain: MiddlewareChain,
}

impl App {
    /// Build the chain for `state`. The router keeps a weak handle back to
    /// the app so self-replay goes through the whole chain again.
    pub fn new(state: Arc<AppState>) -> Arc<Self> {
        Arc::new_cyclic(|app: &Weak<App>| {
            let middlewares = create_middleware(&state.config, state.metrics.clone());
            info!(
                "Middleware chain: {}",
                middlewares
                    .iter()
                    .map(|m| m.name())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
            let local: Weak<dyn LocalResponder> = app.clone();
            let router = AdminRouter::new(state.clone(), local);
            App {
                chain: MiddlewareChain::new(middlewares, Arc::new(router)),
                state,
            }
        })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run a request through the chain. Errors that escape the chain are
    /// turned into plain-text responses.
    pub async fn dispatch(&self, request: HttpRequest, ctx: RequestContext) -> HttpResponse {
        match self.chain.execute(request, ctx).await {
            Ok(response) => response,
            Err(e) => {
                error!("Request failed: {}", e);
                error_response(&e)
            }
        }
    }
}

#[async_trait]
impl LocalResponder for App {
    async fn respond(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse> {
        Ok(self.dispatch(request, ctx).await)
    }
}
