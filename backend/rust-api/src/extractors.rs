use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};

use crate::handlers::ApiError;

/// `Json` whose rejections use the API's `{"message", "status"}` error body.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| AppJson(value))
            .map_err(|rejection: JsonRejection| {
                tracing::warn!("Rejected JSON body: {}", rejection.body_text());
                ApiError::bad_request(format!(
                    "Failed to parse JSON request body: {}",
                    rejection.body_text()
                ))
            })
    }
}
