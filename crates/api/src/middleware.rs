use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use mekgoro_core::ActorId;

use crate::app::errors;
use crate::context::ActorContext;

/// Header carrying the acting user's name.
pub const ACTOR_HEADER: &str = "x-actor";

pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let actor = extract_actor(req.headers()).map(str::to_owned).ok_or_else(|| {
        errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "X-Actor header is required",
        )
    })?;

    req.extensions_mut()
        .insert(ActorContext::new(ActorId::new(actor)));

    Ok(next.run(req).await)
}

fn extract_actor(headers: &HeaderMap) -> Option<&str> {
    let actor = headers.get(ACTOR_HEADER)?.to_str().ok()?.trim();
    (!actor.is_empty()).then_some(actor)
}
