use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;
mod stream;

pub use auth::{AdminToken, AuthUser};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .merge(routes::notifications())
        .merge(routes::realtime())
        .merge(routes::push());

    Router::new()
        .merge(routes::health())
        .nest("/v1", v1)
        .with_state(state)
}
