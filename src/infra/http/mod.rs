//! Public HTTP surface: every GET path goes through the dispatcher.

mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{Uri, header::CONTENT_TYPE},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
};

pub use middleware::RequestContext;

use crate::{
    application::{
        dispatch::{Dispatcher, normalize_path},
        error::HttpError,
    },
    presentation::views::render_not_found_response,
};

use middleware::{log_responses, set_request_context};

pub fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(serve_path))
        .route("/{*path}", get(serve_path))
        .with_state(dispatcher)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}

async fn serve_path(State(dispatcher): State<Arc<Dispatcher>>, uri: Uri) -> Response {
    let raw = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |path_and_query| path_and_query.as_str());

    match dispatcher.dispatch(raw).await {
        Ok(Some(rendered)) => {
            ([(CONTENT_TYPE, rendered.kind.mime())], rendered.body).into_response()
        }
        Ok(None) => render_not_found_response(dispatcher.site_view(), normalize_path(raw)),
        Err(err) => HttpError::from(err).into_response(),
    }
}
