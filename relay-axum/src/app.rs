use std::future::Future;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use relay_context::RelayContext;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::RelayState;

/// Router plus the context it serves.
pub struct RelayApp {
    pub ctx: Arc<RelayContext>,
    pub state: RelayState,
    pub router: Router<()>,
}

impl RelayApp {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        let state = RelayState::new(Arc::clone(&ctx));
        let router = router(state.clone());
        Self { ctx, state, router }
    }

    /// Serve until `shutdown` resolves, then shut the context down.
    pub async fn listen<A, F>(self, addr: A, shutdown: F) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("http server stopped, shutting down relay context");
        self.ctx.shutdown().await;
        Ok(())
    }
}

pub fn router(state: RelayState) -> Router<()> {
    Router::new()
        .route("/send-email", post(handlers::send_email))
        .route("/read-messages", get(handlers::read_messages))
        .route("/mark-read", post(handlers::mark_read))
        .route("/config", get(handlers::get_config))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

async fn track_requests(State(state): State<RelayState>, req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    state.metrics.record(res.status().is_server_error());
    res
}
