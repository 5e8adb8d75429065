use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use lokapay_engine::PaymentEngineError;
use payment_gateways::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("Authentication failed. {0}")]
    Unauthorized(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("The payment provider could not be reached. {0}")]
    GatewayUnavailable(String),
    #[error("The payment provider rejected the request. {0}")]
    UpstreamRejected(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// Gateway failures surface on the internal API with the HTTP class the caller can act on:
/// bad requests are the caller's to fix, provider outages are retryable, and signature
/// problems never reach this mapping on callback routes (those always acknowledge).
impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Configuration(s) => Self::ConfigurationError(s),
            GatewayError::Validation(s) => Self::ValidationError(s),
            GatewayError::UnsupportedMethod(..) => Self::ValidationError(e.to_string()),
            GatewayError::SignatureInvalid(_) | GatewayError::TimestampStale(_) => Self::Unauthorized(e.to_string()),
            GatewayError::GatewayUnavailable(s) => Self::GatewayUnavailable(s),
            GatewayError::UpstreamRejected { .. } | GatewayError::Protocol(_) => Self::UpstreamRejected(e.to_string()),
        }
    }
}

impl From<PaymentEngineError> for ServerError {
    fn from(e: PaymentEngineError) -> Self {
        match e {
            PaymentEngineError::TransactionNotFound(_) => Self::NoRecordFound(e.to_string()),
            PaymentEngineError::DeliveryNotFound(_) => Self::NoRecordFound(e.to_string()),
            PaymentEngineError::BadAmount(s) => Self::ValidationError(s),
            _ => Self::BackendError(e.to_string()),
        }
    }
}
