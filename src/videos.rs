//! Video listing, search, upload and the uploader-only mutations.

use serde::{Deserialize, Serialize};

use crate::{
    access::authorize_owner,
    channels,
    error::{AppError, AppResult},
    models::{
        Category, DEFAULT_THUMBNAIL, DEFAULT_VIDEO_URL, UserRecord, VideoRecord, VideoView, new_id,
        non_blank, timestamp_now,
    },
    store::{Store, VideoChanges, VideoCounter, VideoQuery, VideoSort},
};

const VIDEO_NOT_FOUND: &str = "Video not found";
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_DURATION_SECS: i64 = 1842;
const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 5000;

/// Query string of `GET /api/videos`. Everything arrives as text and is parsed
/// leniently.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub search: Option<String>,
    pub channel: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
}

/// Query string of `GET /api/videos/search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize)]
pub struct VideoPage {
    pub videos: Vec<VideoView>,
    pub pagination: Pagination,
}

/// Tags arrive either as `"a, b"` or as `["a", "b"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TagList {
    Text(String),
    List(Vec<String>),
}

impl TagList {
    pub fn into_tags(self) -> Vec<String> {
        let raw = match self {
            Self::Text(text) => text.split(',').map(str::to_string).collect(),
            Self::List(list) => list,
        };
        raw.into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    pub tags: Option<TagList>,
    pub duration: Option<i64>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub thumbnail_url: Option<String>,
    pub tags: Option<TagList>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReactionRequest {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoSaved {
    pub message: &'static str,
    pub video: VideoView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDeleted {
    pub message: &'static str,
    pub video_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionCounts {
    pub message: &'static str,
    pub likes: i64,
    pub dislikes: i64,
}

/// Page numbers start at 1; sizes are clamped to `1..=MAX_PAGE_SIZE`.
fn paging(page: Option<&str>, limit: Option<&str>) -> (i64, i64) {
    let page = page
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1);
    let limit = limit
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|limit| *limit >= 1)
        .map(|limit| limit.min(MAX_PAGE_SIZE))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    (page, limit)
}

/// `None` and `All` both mean "any category".
fn category_filter(value: Option<&str>) -> AppResult<Option<Category>> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match Category::parse(value) {
        Some(Category::All) => Ok(None),
        Some(category) => Ok(Some(category)),
        None => Err(AppError::validation("Invalid category")),
    }
}

/// Categories a video can actually be filed under.
fn stored_category(value: Option<String>) -> AppResult<Option<Category>> {
    match non_blank(value) {
        None => Ok(None),
        Some(value) => match Category::parse(&value) {
            Some(Category::All) | None => Err(AppError::validation("Invalid category")),
            Some(category) => Ok(Some(category)),
        },
    }
}

fn check_lengths(title: Option<&str>, description: Option<&str>) -> AppResult<()> {
    if title.is_some_and(|title| title.chars().count() > MAX_TITLE_CHARS) {
        return Err(AppError::validation("Title cannot exceed 200 characters"));
    }
    if description.is_some_and(|text| text.chars().count() > MAX_DESCRIPTION_CHARS) {
        return Err(AppError::validation(
            "Description cannot exceed 5000 characters",
        ));
    }
    Ok(())
}

async fn page_of(store: &Store, mut query: VideoQuery, page: i64, limit: i64) -> AppResult<VideoPage> {
    query.offset = (page - 1) * limit;
    query.limit = Some(limit);
    let (videos, total) = store.list_videos(&query).await?;
    Ok(VideoPage {
        videos,
        pagination: Pagination {
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        },
    })
}

pub async fn list_videos(store: &Store, params: ListParams) -> AppResult<VideoPage> {
    let (page, limit) = paging(params.page.as_deref(), params.limit.as_deref());
    let query = VideoQuery {
        category: category_filter(params.category.as_deref())?,
        channel_id: non_blank(params.channel),
        search: non_blank(params.search),
        search_tags: false,
        sort: params
            .sort
            .as_deref()
            .and_then(VideoSort::parse)
            .unwrap_or_default(),
        ..VideoQuery::default()
    };
    page_of(store, query, page, limit).await
}

/// Like the listing, but the search term also matches tags.
pub async fn search_videos(store: &Store, params: SearchParams) -> AppResult<VideoPage> {
    let (page, limit) = paging(params.page.as_deref(), params.limit.as_deref());
    let query = VideoQuery {
        category: category_filter(params.category.as_deref())?,
        search: non_blank(params.q),
        search_tags: true,
        ..VideoQuery::default()
    };
    page_of(store, query, page, limit).await
}

/// Every public video of a channel, newest first.
pub async fn channel_videos(store: &Store, channel_id: &str) -> AppResult<Vec<VideoView>> {
    let query = VideoQuery {
        channel_id: Some(channel_id.to_string()),
        ..VideoQuery::default()
    };
    let (videos, _) = store.list_videos(&query).await?;
    Ok(videos)
}

/// Counts the view, then returns the video including it.
pub async fn get_video(store: &Store, id: &str) -> AppResult<VideoView> {
    if !store.increment_video_counter(id, VideoCounter::Views).await? {
        return Err(AppError::not_found(VIDEO_NOT_FOUND));
    }
    store
        .video_view(id)
        .await?
        .ok_or_else(|| AppError::not_found(VIDEO_NOT_FOUND))
}

/// Files the video under the uploader's channel, provisioning it if needed.
pub async fn upload(store: &Store, user: &UserRecord, request: UploadRequest) -> AppResult<VideoSaved> {
    let (Some(title), Some(description)) = (non_blank(request.title), non_blank(request.description))
    else {
        return Err(AppError::validation("Title and description are required"));
    };
    check_lengths(Some(&title), Some(&description))?;
    let category = stored_category(request.category)?.unwrap_or_default();
    let duration = request
        .duration
        .filter(|duration| *duration > 0)
        .unwrap_or(DEFAULT_DURATION_SECS);

    let channel = channels::ensure_channel(store, user).await?;
    let now = timestamp_now();
    let video = VideoRecord {
        id: new_id(),
        title,
        description,
        video_url: non_blank(request.video_url).unwrap_or_else(|| DEFAULT_VIDEO_URL.to_string()),
        thumbnail_url: non_blank(request.thumbnail_url)
            .unwrap_or_else(|| DEFAULT_THUMBNAIL.to_string()),
        category,
        views: 0,
        likes: 0,
        dislikes: 0,
        duration,
        channel_id: channel.id,
        uploaded_by: user.id.clone(),
        is_public: request.is_public.unwrap_or(true),
        tags: request.tags.map(TagList::into_tags).unwrap_or_default(),
        created_at: now.clone(),
        updated_at: now,
    };
    store.insert_video(&video).await?;
    tracing::info!(video_id = %video.id, user_id = %user.id, "video uploaded");

    let video = store
        .video_view(&video.id)
        .await?
        .ok_or_else(|| AppError::not_found(VIDEO_NOT_FOUND))?;
    Ok(VideoSaved {
        message: "Video uploaded successfully",
        video,
    })
}

pub async fn update_video(
    store: &Store,
    actor_id: &str,
    id: &str,
    update: VideoUpdate,
) -> AppResult<VideoSaved> {
    let video = authorize_owner(store.find_video(id).await?, actor_id, "update")?;

    let changes = VideoChanges {
        title: non_blank(update.title),
        description: non_blank(update.description),
        category: stored_category(update.category)?,
        thumbnail_url: non_blank(update.thumbnail_url),
        tags: update.tags.map(TagList::into_tags),
        is_public: update.is_public,
    };
    check_lengths(changes.title.as_deref(), changes.description.as_deref())?;
    store
        .update_video(&video.id, &changes, &timestamp_now())
        .await?;

    let video = store
        .video_view(&video.id)
        .await?
        .ok_or_else(|| AppError::not_found(VIDEO_NOT_FOUND))?;
    Ok(VideoSaved {
        message: "Video updated successfully",
        video,
    })
}

pub async fn delete_video(store: &Store, actor_id: &str, id: &str) -> AppResult<VideoDeleted> {
    let video = authorize_owner(store.find_video(id).await?, actor_id, "delete")?;
    store.delete_video(&video.id).await?;
    tracing::info!(video_id = %video.id, "video deleted");
    Ok(VideoDeleted {
        message: "Video deleted successfully",
        video_id: video.id,
    })
}

/// One like or dislike per call. Repeated reactions from the same user all
/// count.
pub async fn react(store: &Store, id: &str, request: ReactionRequest) -> AppResult<ReactionCounts> {
    if store.find_video(id).await?.is_none() {
        return Err(AppError::not_found(VIDEO_NOT_FOUND));
    }
    let counter = match request.action.as_deref() {
        Some("like") => VideoCounter::Likes,
        Some("dislike") => VideoCounter::Dislikes,
        _ => return Err(AppError::validation("Invalid action")),
    };
    if !store.increment_video_counter(id, counter).await? {
        return Err(AppError::not_found(VIDEO_NOT_FOUND));
    }

    let video = store
        .find_video(id)
        .await?
        .ok_or_else(|| AppError::not_found(VIDEO_NOT_FOUND))?;
    Ok(ReactionCounts {
        message: "Video reaction updated",
        likes: video.likes,
        dislikes: video.dislikes,
    })
}
