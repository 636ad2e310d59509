use axum::extract::FromRequest;

use crate::errors::AppError;

/// `Json` body whose rejections render as `{"error": ...}`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
