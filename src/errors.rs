use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A validation failure pinned to one line item of a receipt request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineItemError {
    pub line_item_id: Uuid,
    pub reason: String,
}

impl LineItemError {
    pub fn new(line_item_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            line_item_id,
            reason: reason.into(),
        }
    }
}

/// Error body returned by every endpoint. `kind` is the machine-readable
/// taxonomy tag; `line_errors` is populated for per-line validation failures.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Bad Request", "Conflict")
    pub error: String,
    /// Machine-readable error kind
    pub kind: String,
    /// Human-readable error description
    pub message: String,
    /// Per-line validation failures, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_errors: Option<Vec<LineItemError>>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        line_errors: Vec<LineItemError>,
    },

    #[error("Line item {line_item_id} requires a positive purchase and selling price")]
    MissingPrice { line_item_id: Uuid },

    #[error("SKU {0} already exists")]
    DuplicateSku(String),

    #[error("Payment of {attempted} would exceed the order grand total of {grand_total}")]
    Overpayment {
        attempted: Decimal,
        grand_total: Decimal,
    },

    #[error("Order {order_id} is {status} and accepts no further receipts")]
    TerminalState { order_id: Uuid, status: String },

    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Shorthand for a validation failure that is not tied to a line item.
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            line_errors: Vec::new(),
        }
    }

    /// Machine-readable taxonomy tag carried in every error response.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "persistence_error",
            Self::NotFound(_) => "not_found",
            Self::Validation { .. } => "validation_error",
            Self::MissingPrice { .. } => "missing_price",
            Self::DuplicateSku(_) => "duplicate_sku",
            Self::Overpayment { .. } => "overpayment",
            Self::TerminalState { .. } => "terminal_state",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation { .. } | Self::MissingPrice { .. } | Self::DuplicateSku(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Overpayment { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TerminalState { .. } | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
        }
    }

    /// Message suitable for HTTP responses. Infrastructure errors return a
    /// generic message so implementation details do not leak to callers.
    pub fn response_message(&self) -> String {
        match self {
            Self::Database(_) => "Database error".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn line_errors(&self) -> Option<Vec<LineItemError>> {
        match self {
            Self::Validation { line_errors, .. } if !line_errors.is_empty() => {
                Some(line_errors.clone())
            }
            Self::MissingPrice { line_item_id } => Some(vec![LineItemError::new(
                *line_item_id,
                "new product requires positive purchase and selling prices",
            )]),
            _ => None,
        }
    }

    /// Transient persistence errors are worth one transparent retry; business
    /// rule failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification(_)
                | Self::Database(sea_orm::error::DbErr::ConnectionAcquire(_))
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            kind: self.kind().to_string(),
            message: self.response_message(),
            line_errors: self.line_errors(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

/// Handler-level error wrapper for failures that never reach the services.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Service(err) => err.into_response(),
            ApiError::Validation(msg) => ServiceError::validation(msg).into_response(),
            ApiError::NotFound(msg) => ServiceError::NotFound(msg).into_response(),
        }
    }
}
