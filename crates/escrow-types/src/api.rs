//! API types for the ledger HTTP API.
//!
//! Request bodies use camelCase field names to match the public order view.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Amount, CustomerId, NewOrder, Order, OrderStatus};

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
	#[serde(default)]
	pub customer_name: String,
	#[serde(default)]
	pub shipping_address: String,
	pub payment: Amount,
}

impl From<PlaceOrderRequest> for NewOrder {
	fn from(req: PlaceOrderRequest) -> Self {
		NewOrder::new(req.customer_name, req.shipping_address, req.payment)
	}
}

/// The order view returned by every order endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
	pub customer: CustomerId,
	pub status: OrderStatus,
	#[serde(flatten)]
	pub order: Order,
}

impl OrderResponse {
	pub fn new(customer: CustomerId, order: Order) -> Self {
		Self {
			customer,
			status: order.status(),
			order,
		}
	}
}

/// Response of `GET /api/balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
	pub customer: CustomerId,
	pub balance: Amount,
}

/// Response of `GET /api/custody`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyResponse {
	pub total: Amount,
	pub price: Amount,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Stable machine-readable error code.
	pub error: String,
	/// Human-readable message.
	pub message: String,
}

/// API error with its HTTP status category.
#[derive(Debug, Clone)]
pub enum APIError {
	/// Malformed input (400).
	BadRequest { error_type: String, message: String },
	/// Operation conflicts with the current order state (409).
	Conflict { error_type: String, message: String },
	/// A downstream transfer was rejected (502).
	BadGateway { error_type: String, message: String },
	/// Anything else (500).
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Conflict { .. } => 409,
			APIError::BadGateway { .. } => 502,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			APIError::BadRequest { error_type, message }
			| APIError::Conflict { error_type, message }
			| APIError::BadGateway { error_type, message }
			| APIError::InternalServerError { error_type, message } => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::BadGateway { message, .. } => write!(f, "Bad Gateway: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_order_response_flattens_order() {
		let response = OrderResponse::new(
			CustomerId::from("alex"),
			Order::placed("Alex", "123 Main St"),
		);
		let json = serde_json::to_value(&response).unwrap();
		assert_eq!(json["customer"], "alex");
		assert_eq!(json["status"], "placed");
		assert_eq!(json["customerName"], "Alex");
		assert_eq!(json["isValid"], true);
	}

	#[test]
	fn test_place_order_request_deserializes() {
		let req: PlaceOrderRequest = serde_json::from_str(
			r#"{"customerName":"Alex","shippingAddress":"123 Main St","payment":10}"#,
		)
		.unwrap();
		let order: NewOrder = req.into();
		assert_eq!(order.payment, Amount::new(10));
	}
}
