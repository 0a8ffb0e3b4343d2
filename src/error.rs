use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use evlog::meta;
use thiserror::Error;

use crate::runtime::get_logger;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Template(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();

        if status.is_server_error() {
            get_logger().error("Error occurred in request handler.", meta! {
                "Status" => status,
                "Error" => message,
            });
        }

        (status, message).into_response()
    }
}
