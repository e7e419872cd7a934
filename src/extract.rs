use axum::extract::FromRequest;

use crate::error::AppError;

/// `Json` whose rejections come back in the standard error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
