#![forbid(unsafe_code)]

//! Axum server exposing the video-sharing REST API.
//!
//! Handlers stay thin: they pull the caller, path, query and body out of the
//! request and hand them to the operations in the library crate. Every
//! failure leaves as `{"message": ...}` through `AppError`.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{get, post, put},
};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tubeclone::{
    accounts::{self, LoginRequest, ProfileUpdate, RegisterRequest},
    auth::{Authenticator, bearer_token},
    channels::{self, ChannelUpdate},
    comments::{self, CommentEdit, NewComment},
    config::{SettingsOverrides, resolve_settings},
    error::{AppError, AppResult},
    logging::init_tracing,
    models::UserRecord,
    store::Store,
    videos::{self, ListParams, ReactionRequest, SearchParams, UploadRequest, VideoUpdate},
};

#[derive(Debug, Parser)]
#[command(about = "Serve the video-sharing REST API")]
struct BackendArgs {
    /// Database file (overrides DATABASE_PATH).
    #[arg(long)]
    database: Option<PathBuf>,
    /// Listen address (overrides TUBECLONE_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Listen port (overrides TUBECLONE_PORT / PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Dotenv file to read settings from.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    auth: Arc<Authenticator>,
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
struct CurrentUser(UserRecord);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = bearer_token(header)?;
        let user_id = state.auth.verify_token(token)?;
        // A token for a deleted account is as good as a forged one.
        let user = state
            .store
            .find_user(&user_id)
            .await?
            .ok_or_else(|| AppError::auth("Token is not valid"))?;
        Ok(Self(user))
    }
}

/// `Json` with its rejection mapped onto the API's error body.
struct JsonBody<T>(T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> AppResult<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::validation(rejection.body_text())
}

/// `Query` with its rejection mapped onto the API's error body.
struct QueryParams<T>(T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> AppResult<Self> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> AppError {
    AppError::validation(rejection.body_text())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = BackendArgs::parse();

    let settings = resolve_settings(SettingsOverrides {
        database_path: args.database,
        host: args.host,
        port: args.port,
        env_path: args.env_file,
    })?;
    let auth = Authenticator::new(settings.jwt_secret()?, settings.bcrypt_cost);

    // Without a database there is nothing to serve; bail out of main.
    let store = Store::open(&settings.database_path)
        .await
        .with_context(|| format!("opening {}", settings.database_path.display()))?;
    tracing::info!(path = %settings.database_path.display(), "database ready");

    let state = AppState {
        store: Arc::new(store),
        auth: Arc::new(auth),
    };

    let host: IpAddr = settings
        .host
        .parse()
        .with_context(|| format!("invalid listen address {}", settings.host))?;
    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", put(update_profile))
        .route("/api/videos", get(list_videos).post(upload_video))
        .route("/api/videos/search", get(search_videos))
        .route("/api/videos/channel/{id}", get(channel_videos))
        .route(
            "/api/videos/{id}",
            get(get_video).put(update_video).delete(delete_video),
        )
        .route("/api/videos/{id}/like", post(react_to_video))
        .route("/api/channels/user/current", get(current_channel))
        .route("/api/channels/user/id", get(current_channel_id))
        .route("/api/channels/{id}", get(get_channel).put(update_channel))
        .route("/api/channels/{id}/subscribe", post(toggle_subscription))
        .route(
            "/api/comments/video/{id}",
            get(list_comments).post(add_comment),
        )
        .route("/api/comments/{id}", put(edit_comment).delete(delete_comment))
        .route("/api/comments/{id}/like", post(like_comment))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::not_found("Route not found")
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "message": "Method not allowed" })),
    )
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "YouTube Clone API", "status": "running" }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.store.ping().await {
        Ok(()) => "connected",
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "health check failed");
            "disconnected"
        }
    };
    Json(json!({ "status": "OK", "database": database }))
}

// ---- accounts ---------------------------------------------------------

async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let session = accounts::register(&state.store, &state.auth, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(accounts::login(&state.store, &state.auth, request).await?))
}

async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<impl IntoResponse> {
    Ok(Json(accounts::current_user(&state.store, &user.id).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        accounts::update_profile(&state.store, &user.id, update).await?,
    ))
}

// ---- videos -----------------------------------------------------------

async fn list_videos(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(videos::list_videos(&state.store, params).await?))
}

async fn search_videos(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(videos::search_videos(&state.store, params).await?))
}

async fn channel_videos(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(videos::channel_videos(&state.store, &channel_id).await?))
}

async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(videos::get_video(&state.store, &id).await?))
}

async fn upload_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<UploadRequest>,
) -> AppResult<impl IntoResponse> {
    let saved = videos::upload(&state.store, &user, request).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn update_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<VideoUpdate>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        videos::update_video(&state.store, &user.id, &id, update).await?,
    ))
}

async fn delete_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(videos::delete_video(&state.store, &user.id, &id).await?))
}

async fn react_to_video(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<ReactionRequest>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(videos::react(&state.store, &id, request).await?))
}

// ---- channels ---------------------------------------------------------

async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(channels::get_channel(&state.store, &id).await?))
}

async fn current_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<impl IntoResponse> {
    Ok(Json(channels::current_channel(&state.store, &user).await?))
}

async fn current_channel_id(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<impl IntoResponse> {
    Ok(Json(channels::current_channel_id(&state.store, &user).await?))
}

async fn update_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<ChannelUpdate>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        channels::update_channel(&state.store, &user.id, &id, update).await?,
    ))
}

async fn toggle_subscription(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        channels::toggle_subscription(&state.store, &id, &user.id).await?,
    ))
}

// ---- comments ---------------------------------------------------------

async fn list_comments(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(comments::list_comments(&state.store, &video_id).await?))
}

async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(video_id): Path<String>,
    JsonBody(request): JsonBody<NewComment>,
) -> AppResult<impl IntoResponse> {
    let comment = comments::add_comment(&state.store, &video_id, &user.id, request).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn edit_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(edit): JsonBody<CommentEdit>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        comments::edit_comment(&state.store, &user.id, &id, edit).await?,
    ))
}

async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(
        comments::delete_comment(&state.store, &user.id, &id).await?,
    ))
}

async fn like_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(comments::like_comment(&state.store, &id).await?))
}
