//! HTTP server exposing the guild context store and navigator

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    ContextError, ContextNavigator, GuildContext, MessageContext, NavigationContext, PollOutcome,
    SearchOptions, SearchResult, TierReport, DEFAULT_SEARCH_LIMIT,
};

/// Search request body
#[derive(Debug, Deserialize)]
pub struct SearchRequestHttp {
    pub query: String,
    pub channel_id: Option<String>,
    pub category_id: Option<String>,
    pub author_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub guilds: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, details: Option<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details,
        }),
    )
}

fn context_error(e: ContextError) -> ApiError {
    match e {
        ContextError::UnknownGuild(_) => {
            api_error(StatusCode::NOT_FOUND, "Unknown guild", Some(e.to_string()))
        }
        ContextError::UnknownChannel { .. } => {
            api_error(StatusCode::NOT_FOUND, "Unknown channel", Some(e.to_string()))
        }
        ContextError::Search(ref source) => {
            error!("Message search failed: {:?}", source);
            api_error(
                StatusCode::BAD_GATEWAY,
                "Message search failed",
                Some(format!("{:#}", source)),
            )
        }
    }
}

async fn health_handler(State(nav): State<Arc<ContextNavigator>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "fumble-context".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        guilds: nav.store().guild_ids().len(),
    })
}

async fn record_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Json(message): Json<MessageContext>,
) -> StatusCode {
    nav.store().record_message(message);
    StatusCode::ACCEPTED
}

async fn poll_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Path(guild_id): Path<String>,
) -> Json<PollOutcome> {
    info!("Poll requested for guild {}", guild_id);
    Json(nav.store().poll_guild(&guild_id).await)
}

async fn maintenance_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Path(guild_id): Path<String>,
) -> Result<Json<TierReport>, ApiError> {
    nav.store()
        .run_tier_maintenance(&guild_id)
        .map(Json)
        .ok_or_else(|| context_error(ContextError::UnknownGuild(guild_id)))
}

async fn guild_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Path(guild_id): Path<String>,
) -> Result<Json<GuildContext>, ApiError> {
    nav.store()
        .get_guild_context(&guild_id)
        .map(Json)
        .ok_or_else(|| context_error(ContextError::UnknownGuild(guild_id)))
}

fn unknown_channel(guild_id: String, channel_id: String) -> ApiError {
    context_error(ContextError::UnknownChannel {
        guild_id,
        channel_id,
    })
}

async fn navigation_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Path((guild_id, channel_id)): Path<(String, String)>,
) -> Result<Json<NavigationContext>, ApiError> {
    nav.get_navigation_context(&guild_id, &channel_id)
        .map(Json)
        .ok_or_else(|| unknown_channel(guild_id, channel_id))
}

async fn ai_context_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Path((guild_id, channel_id)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let text = nav.build_context_for_ai(&guild_id, &channel_id);
    if text.is_empty() {
        return Err(unknown_channel(guild_id, channel_id));
    }
    Ok(text)
}

async fn search_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Path(guild_id): Path<String>,
    Json(req): Json<SearchRequestHttp>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    info!("Search in guild {}: '{}'", guild_id, req.query);
    let options = SearchOptions {
        channel_id: req.channel_id,
        category_id: req.category_id,
        author_id: req.author_id,
        limit: req.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    };
    nav.search_guild(&guild_id, &req.query, &options)
        .await
        .map(Json)
        .map_err(context_error)
}

async fn user_messages_handler(
    State(nav): State<Arc<ContextNavigator>>,
    Path((guild_id, user_id)): Path<(String, String)>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    nav.find_user_messages(&guild_id, &user_id, limit)
        .await
        .map(Json)
        .map_err(context_error)
}

/// Create and configure the HTTP router
pub fn create_router(navigator: Arc<ContextNavigator>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/messages", post(record_handler))
        .route("/guilds/:guild_id", get(guild_handler))
        .route("/guilds/:guild_id/poll", post(poll_handler))
        .route("/guilds/:guild_id/maintenance", post(maintenance_handler))
        .route("/guilds/:guild_id/search", post(search_handler))
        .route(
            "/guilds/:guild_id/channels/:channel_id/navigation",
            get(navigation_handler),
        )
        .route(
            "/guilds/:guild_id/channels/:channel_id/ai-context",
            get(ai_context_handler),
        )
        .route(
            "/guilds/:guild_id/users/:user_id/messages",
            get(user_messages_handler),
        )
        .with_state(navigator)
}

/// Run the HTTP server
pub async fn run_server(navigator: Arc<ContextNavigator>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting fumble-context server on {}", addr);

    let app = create_router(navigator);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ContextManagerConfig, GuildContextStore, GuildSnapshot, StaticChannelSource,
        StoreMessageIndex,
    };
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<ContextNavigator>) {
        let source = Arc::new(StaticChannelSource::new());
        source.set_guild(
            "g1",
            GuildSnapshot {
                guild_name: Some("Dungeon Crawlers".to_string()),
                ..Default::default()
            },
        );
        let config = ContextManagerConfig {
            auto_poll: false,
            ..Default::default()
        };
        let store = GuildContextStore::new(config, source);
        let index = Arc::new(StoreMessageIndex::new(store.clone()));
        let navigator = Arc::new(ContextNavigator::new(store, index));
        (create_router(navigator.clone()), navigator)
    }

    fn message_json(id: &str, content: &str) -> String {
        serde_json::json!({
            "id": id,
            "guild_id": "g1",
            "channel_id": "c1",
            "author_id": "u1",
            "author_username": "bard",
            "content": content,
            "created_at": Utc::now(),
        })
        .to_string()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_record_then_search() {
        let (app, navigator) = test_app();
        let req = Request::builder()
            .method("POST")
            .uri("/messages")
            .header("content-type", "application/json")
            .body(Body::from(message_json("m1", "Inspiration dice for everyone")))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(navigator.store().get_guild_context("g1").is_some());

        let req = Request::builder()
            .method("POST")
            .uri("/guilds/g1/search")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query":"inspiration"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["channel_name"], "unknown-c1");
    }

    #[tokio::test]
    async fn test_unknown_navigation_is_404() {
        let (app, _) = test_app();
        let req = Request::builder()
            .uri("/guilds/nope/channels/c1/navigation")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_poll_endpoint_reports_outcome() {
        let (app, navigator) = test_app();
        let req = Request::builder()
            .method("POST")
            .uri("/guilds/g1/poll")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "completed");

        let guild = navigator.store().get_guild_context("g1").unwrap();
        assert_eq!(guild.name, "Dungeon Crawlers");
    }
}
