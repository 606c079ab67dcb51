use axum::{
	Json, Router,
	extract::{State, rejection::JsonRejection},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};

use kin_service::{Error as ServiceError, IdentifyRequest, IdentifyResponse};

use crate::state::AppState;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(index))
		.route("/health", get(health))
		.route("/identify", post(identify))
		.with_state(state)
}

async fn index() -> Json<Value> {
	Json(json!({ "message": "Send a POST request to /identify to resolve a contact." }))
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn identify(
	State(state): State<AppState>,
	payload: Result<Json<IdentifyRequest>, JsonRejection>,
) -> Result<Json<IdentifyResponse>, ApiError> {
	let Json(payload) = payload.map_err(|rejection| {
		json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text(), None)
	})?;
	let response = state.service.identify(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } => json_error(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				message,
				Some(vec!["$.email".to_string(), "$.phoneNumber".to_string()]),
			),
			ServiceError::Conflict { .. } => {
				tracing::warn!(error = %err, "Identify request kept conflicting.");

				json_error(
					StatusCode::SERVICE_UNAVAILABLE,
					"conflict",
					"Concurrent update. Retry the request.",
					None,
				)
			},
			ServiceError::NotFound { .. }
			| ServiceError::Storage { .. }
			| ServiceError::Transaction { .. } => {
				tracing::error!(error = %err, "Identify request failed.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					INTERNAL_ERROR_MESSAGE,
					None,
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
