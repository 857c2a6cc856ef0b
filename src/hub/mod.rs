//! The hub process: REST ingress, socket fan-out and the self-driven
//! analysis loop.

pub mod analysis;
pub mod consensus;
pub mod routes;
pub mod state;
pub mod ws;

use crate::advisor::Advisor;
use crate::config::Settings;
use crate::error::{DuckError, Result};
use crate::market::PriceService;
use analysis::AnalysisEngine;
use state::HubState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct HubContext {
    pub state: Arc<HubState>,
    pub analysis: Arc<AnalysisEngine>,
}

/// Run the hub until the process is terminated.
pub async fn run(settings: Settings) -> Result<()> {
    let state = Arc::new(HubState::new());
    let price = Arc::new(PriceService::new(&settings, None)?);
    let advisor = Advisor::from_key(settings.advisor_api_key.as_deref()).map(Arc::new);
    if advisor.is_some() {
        info!("advisor enabled");
    }
    let analysis = Arc::new(AnalysisEngine::new(state.clone(), price, advisor));

    // The configured token is the focal token from boot; clients can
    // repoint it with `token:analyze`.
    let focal = settings.token_key();
    if focal != format!("{:#x}", alloy::primitives::Address::ZERO) {
        analysis.clone().start_loop(&focal).await;
    }

    let ctx = HubContext {
        state: state.clone(),
        analysis,
    };
    let app = routes::create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.hub_port));
    info!(%addr, "hub listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(crate::shutdown::wait_for_signal())
        .await
        .map_err(|e| DuckError::Internal(format!("hub server error: {e}")))?;

    info!("hub stopped");
    Ok(())
}
