//! Order endpoints.
//!
//! Every mutating endpoint acts on behalf of the caller named in the
//! `x-customer-id` header. Ledger errors are mapped onto HTTP statuses by
//! category.

use axum::{
	extract::{rejection::JsonRejection, FromRequestParts, Path, State},
	http::request::Parts,
	response::Json,
};
use escrow_core::{ErrorKind, LedgerError};
use escrow_types::{
	APIError, BalanceResponse, CustodyResponse, CustomerId, Order, OrderResponse,
	PlaceOrderRequest,
};

use crate::server::AppState;

/// Header carrying the caller's identity.
pub const CALLER_HEADER: &str = "x-customer-id";

/// The authenticated caller of a request.
pub struct Caller(pub CustomerId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		parts
			.headers
			.get(CALLER_HEADER)
			.and_then(|value| value.to_str().ok())
			.filter(|value| !value.is_empty())
			.map(|value| Caller(CustomerId::from(value)))
			.ok_or_else(|| APIError::BadRequest {
				error_type: "MISSING_CALLER".to_string(),
				message: format!("missing or invalid {} header", CALLER_HEADER),
			})
	}
}

/// Maps a ledger error onto its HTTP category.
///
/// Internal failures are logged here and reported without detail.
pub fn to_api_error(err: LedgerError) -> APIError {
	match err.kind() {
		ErrorKind::Validation => APIError::BadRequest {
			error_type: "INVALID_ORDER".to_string(),
			message: err.to_string(),
		},
		ErrorKind::StateConflict => APIError::Conflict {
			error_type: "ORDER_CONFLICT".to_string(),
			message: err.to_string(),
		},
		ErrorKind::Transfer => APIError::BadGateway {
			error_type: "REFUND_FAILED".to_string(),
			message: err.to_string(),
		},
		ErrorKind::Internal => {
			tracing::error!(error = %err, "Ledger operation failed");
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message: "internal error".to_string(),
			}
		},
	}
}

/// Handles POST /api/orders.
///
/// A missing name or address reaches the ledger as empty. Bodies that fail to
/// parse at all are rejected as invalid orders.
pub async fn place_order(
	State(state): State<AppState>,
	Caller(caller): Caller,
	request: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, APIError> {
	let Json(request) = request.map_err(|rejection| APIError::BadRequest {
		error_type: "INVALID_ORDER".to_string(),
		message: rejection.body_text(),
	})?;
	let order = state
		.ledger
		.place_order(&caller, request.into())
		.await
		.map_err(to_api_error)?;
	Ok(Json(OrderResponse::new(caller, order)))
}

/// Handles POST /api/orders/confirm.
pub async fn confirm_order(
	State(state): State<AppState>,
	Caller(caller): Caller,
) -> Result<Json<OrderResponse>, APIError> {
	let order = state
		.ledger
		.confirm_order(&caller)
		.await
		.map_err(to_api_error)?;
	Ok(Json(OrderResponse::new(caller, order)))
}

/// Handles POST /api/orders/cancel.
///
/// Responds with the now empty order.
pub async fn cancel_order(
	State(state): State<AppState>,
	Caller(caller): Caller,
) -> Result<Json<OrderResponse>, APIError> {
	state
		.ledger
		.cancel_order(&caller)
		.await
		.map_err(to_api_error)?;
	Ok(Json(OrderResponse::new(caller, Order::default())))
}

/// Handles GET /api/orders/{customer}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(customer): Path<String>,
) -> Result<Json<OrderResponse>, APIError> {
	let customer = CustomerId::from(customer);
	let order = state
		.ledger
		.order_pair(&customer)
		.await
		.map_err(to_api_error)?;
	Ok(Json(OrderResponse::new(customer, order)))
}

/// Handles GET /api/balance.
pub async fn get_balance(
	State(state): State<AppState>,
	Caller(caller): Caller,
) -> Result<Json<BalanceResponse>, APIError> {
	let balance = state
		.ledger
		.get_balance(&caller)
		.await
		.map_err(to_api_error)?;
	Ok(Json(BalanceResponse {
		customer: caller,
		balance,
	}))
}

/// Handles GET /api/custody.
pub async fn get_custody(
	State(state): State<AppState>,
) -> Result<Json<CustodyResponse>, APIError> {
	let total = state.ledger.total_custody().await.map_err(to_api_error)?;
	Ok(Json(CustodyResponse {
		total,
		price: state.ledger.price(),
	}))
}
