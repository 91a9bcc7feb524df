use actix_web::http::StatusCode;
use serde::Serialize;
use snafu::Snafu;

/// Error body shape expected by AWS SQS clients speaking the JSON protocol.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "__type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Queue {queue} does not exist"))]
    QueueNotFound { queue: String },

    #[snafu(display("Queue {queue} already exists"))]
    QueueAlreadyExists { queue: String },

    #[snafu(display("Message {id} does not exist"))]
    MessageNotFound { id: u64 },

    #[snafu(display("Invalid parameter: {message}"))]
    InvalidParameter { message: String },

    #[snafu(display("Unknown operation: {target}"))]
    UnknownOperation { target: String },

    #[snafu(display("Missing Authorization header"))]
    MissingAuthHeader,

    #[snafu(display("Malformed Authorization header: {message}"))]
    MalformedAuthHeader { message: String },

    #[snafu(display("Only AWS Signature Version 4 is supported"))]
    UnsupportedSignatureVersion,

    #[snafu(display("The request signature we calculated does not match the signature you provided"))]
    SignatureMismatch,

    #[snafu(display("Access key {key_id} not found"))]
    UnknownAccessKey { key_id: String },

    #[snafu(display("Missing header {header}"))]
    MissingHeader { header: String },

    #[snafu(display("Invalid header {header}"))]
    InvalidHeader { header: String },

    #[snafu(display("Error returned from database"))]
    Sqlx {
        #[snafu(source)]
        source: sqlx::Error,
    },

    #[snafu(display("Error running migrations"))]
    Migration {
        #[snafu(source)]
        source: sqlx::migrate::MigrateError,
    },

    #[snafu(display("Internal server error"))]
    Internal {
        #[snafu(source(false))]
        source: Option<eyre::Report>,
    },
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Sqlx { source }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::Migration { source }
    }
}

impl From<eyre::Report> for Error {
    fn from(source: eyre::Report) -> Self {
        Self::Internal {
            source: Some(source),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::InvalidParameter {
            message: format!("malformed request body: {source}"),
        }
    }
}

impl Error {
    pub fn internal(e: impl Into<eyre::Report>) -> Self {
        Self::Internal {
            source: Some(e.into()),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue: queue.into(),
        }
    }

    /// The error code AWS clients dispatch on, without the service prefix.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueueNotFound { .. } => "QueueDoesNotExist",
            Self::QueueAlreadyExists { .. } => "QueueAlreadyExists",
            Self::MessageNotFound { .. } => "MessageNotFound",
            Self::InvalidParameter { .. }
            | Self::MissingHeader { .. }
            | Self::InvalidHeader { .. } => "InvalidParameterValue",
            Self::UnknownOperation { .. } => "UnknownOperation",
            Self::MissingAuthHeader => "MissingAuthHeader",
            Self::MalformedAuthHeader { .. } => "MalformedAuthHeader",
            Self::UnsupportedSignatureVersion => "UnsupportedSignatureVersion",
            Self::SignatureMismatch => "SignatureDoesNotMatch",
            Self::UnknownAccessKey { .. } => "UnknownAccessKey",
            Self::Sqlx { .. } | Self::Migration { .. } | Self::Internal { .. } => "InternalFailure",
        }
    }
}

impl actix_web::ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::QueueNotFound { .. }
            | Self::QueueAlreadyExists { .. }
            | Self::MessageNotFound { .. }
            | Self::InvalidParameter { .. }
            | Self::UnknownOperation { .. }
            | Self::MissingHeader { .. }
            | Self::InvalidHeader { .. } => StatusCode::BAD_REQUEST,

            Self::MissingAuthHeader
            | Self::MalformedAuthHeader { .. }
            | Self::UnsupportedSignatureVersion
            | Self::SignatureMismatch
            | Self::UnknownAccessKey { .. } => StatusCode::FORBIDDEN,

            Self::Sqlx { .. } | Self::Migration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{self:?}");
        }

        actix_web::HttpResponse::build(self.status_code()).json(ErrorBody {
            kind: format!("com.amazonaws.sqs#{}", self.code()),
            message: self.to_string(),
        })
    }
}
