//! Stored records and the JSON shapes the API hands out.
//!
//! Records mirror table rows one to one. Views are what clients see: ids are
//! exposed as `_id`, field names are camelCase, and references to other
//! entities are populated with a small projection instead of a bare id.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_AVATAR: &str = "https://cdn-icons-png.flaticon.com/512/149/149071.png";
pub const DEFAULT_BANNER: &str =
    "https://images.unsplash.com/photo-1517077304055-6e89abbf09b0?w=1920&h=250&fit=crop";
pub const DEFAULT_VIDEO_URL: &str = "https://www.youtube.com/embed/dQw4w9WgXcQ";
pub const DEFAULT_THUMBNAIL: &str =
    "https://images.unsplash.com/photo-1593359677879-a4bb92f829d1?w=320&h=180&fit=crop";

/// Current time in the format stored for every `created_at`/`updated_at`.
/// Millisecond RFC 3339 in UTC sorts lexicographically.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Trims the value and treats an empty result as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Category {
    All,
    #[default]
    Entertainment,
    Music,
    Gaming,
    Education,
    Technology,
    Sports,
    News,
    Other,
}

impl Category {
    pub const VALUES: [Category; 9] = [
        Self::All,
        Self::Entertainment,
        Self::Music,
        Self::Gaming,
        Self::Education,
        Self::Technology,
        Self::Sports,
        Self::News,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Entertainment => "Entertainment",
            Self::Music => "Music",
            Self::Gaming => "Gaming",
            Self::Education => "Education",
            Self::Technology => "Technology",
            Self::Sports => "Sports",
            Self::News => "News",
            Self::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::VALUES
            .into_iter()
            .find(|category| category.as_str() == value)
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRecord {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// A user as returned to its owner. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Author/owner/uploader projection embedded in other views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub id: String,
    pub channel_name: String,
    pub description: String,
    pub owner_id: String,
    pub avatar: String,
    pub banner: String,
    pub social_links: SocialLinks,
    /// Loaded from the subscriber set, in subscription order.
    pub subscribers: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChannelRecord {
    pub fn summary(&self) -> ChannelSummary {
        ChannelSummary {
            id: self.id.clone(),
            channel_name: self.channel_name.clone(),
            description: self.description.clone(),
            subscribers: self.subscribers.clone(),
            avatar: self.avatar.clone(),
            channel_banner: self.banner.clone(),
        }
    }
}

/// Channel attached to the caller's profile on `/api/auth/me`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub channel_name: String,
    pub description: String,
    pub subscribers: Vec<String>,
    pub avatar: String,
    pub channel_banner: String,
}

/// Channel projection embedded in video views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelBrief {
    #[serde(rename = "_id")]
    pub id: String,
    pub channel_name: String,
    pub avatar: String,
    pub subscribers: Vec<String>,
}

/// Full channel page payload, statistics included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    #[serde(rename = "_id")]
    pub id: String,
    pub channel_name: String,
    pub description: String,
    pub avatar: String,
    pub channel_banner: String,
    pub owner: Option<UserRef>,
    pub subscribers: Vec<String>,
    pub social_links: SocialLinks,
    pub created_at: String,
    pub updated_at: String,
    pub video_count: i64,
    pub total_views: i64,
}

#[derive(Debug, Clone)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub category: Category,
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub duration: i64,
    pub channel_id: String,
    pub uploaded_by: String,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl VideoRecord {
    pub fn into_view(self, channel: Option<ChannelBrief>, uploaded_by: Option<UserRef>) -> VideoView {
        VideoView {
            id: self.id,
            title: self.title,
            description: self.description,
            video_url: self.video_url,
            thumbnail_url: self.thumbnail_url,
            category: self.category,
            views: self.views,
            likes: self.likes,
            dislikes: self.dislikes,
            duration: self.duration,
            channel,
            uploaded_by,
            is_public: self.is_public,
            tags: self.tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub category: Category,
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub duration: i64,
    pub channel: Option<ChannelBrief>,
    pub uploaded_by: Option<UserRef>,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CommentRecord {
    pub id: String,
    pub text: String,
    pub video_id: String,
    pub user_id: String,
    pub likes: i64,
    /// `None` for top-level comments.
    pub parent_id: Option<String>,
    pub is_edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl CommentRecord {
    pub fn into_view(self, user: Option<UserRef>) -> CommentView {
        CommentView {
            id: self.id,
            text: self.text,
            video: self.video_id,
            user,
            likes: self.likes,
            parent_comment: self.parent_id,
            is_edited: self.is_edited,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    pub video: String,
    pub user: Option<UserRef>,
    pub likes: i64,
    pub parent_comment: Option<String>,
    pub is_edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_accepts_only_known_names() {
        assert_eq!(Category::parse("Music"), Some(Category::Music));
        assert_eq!(Category::parse(" Gaming "), Some(Category::Gaming));
        assert_eq!(Category::parse("music"), None);
        assert_eq!(Category::parse("Cooking"), None);
        assert_eq!(Category::default(), Category::Entertainment);
    }

    #[test]
    fn public_user_serializes_without_password() {
        let user = UserRecord {
            id: "u1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$2b$04$hash".into(),
            avatar: DEFAULT_AVATAR.into(),
            created_at: timestamp_now(),
            updated_at: timestamp_now(),
        };
        let value = serde_json::to_value(user.public()).unwrap();
        assert_eq!(value["_id"], "u1");
        assert_eq!(value["username"], "alice");
        assert!(value.get("createdAt").is_some());
        let rendered = value.to_string();
        assert!(!rendered.contains("password"));
        assert!(!rendered.contains("$2b$"));
    }

    #[test]
    fn timestamps_sort_in_creation_order() {
        let first = timestamp_now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = timestamp_now();
        assert!(first < second);
        assert!(first.ends_with('Z'));
    }
}
