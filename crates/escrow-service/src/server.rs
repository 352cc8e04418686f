//! HTTP server for the escrow ledger API.

use axum::{
	routing::{get, post},
	Router,
};
use escrow_config::ApiConfig;
use escrow_core::OrderLedger;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::apis::order;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub ledger: Arc<OrderLedger>,
}

/// Builds the API router under `/api`.
pub fn router(ledger: Arc<OrderLedger>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(order::place_order))
				.route("/orders/confirm", post(order::confirm_order))
				.route("/orders/cancel", post(order::cancel_order))
				.route("/orders/{customer}", get(order::get_order))
				.route("/balance", get(order::get_balance))
				.route("/custody", get(order::get_custody)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
		.with_state(AppState { ledger })
}

/// Serves the API until Ctrl+C.
pub async fn start_server(
	api_config: ApiConfig,
	ledger: Arc<OrderLedger>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(ledger);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Escrow API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
		})
		.await?;

	Ok(())
}
