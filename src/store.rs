//! Persistence layer for users, channels, videos and comments.
//!
//! One `Store` is opened at startup and shared by every request behind an
//! `Arc`. Counters and the subscriber set are only ever changed with single
//! statements (`n = n + 1`, `DELETE`/`INSERT OR IGNORE`) so concurrent requests
//! cannot lose updates.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result, anyhow};
use libsql::{Builder, Connection, Row, Value, params, params_from_iter};

use crate::models::{
    Category, ChannelBrief, ChannelRecord, CommentRecord, CommentView, SocialLinks, UserRecord,
    UserRef, VideoRecord, VideoView,
};

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            avatar TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id TEXT PRIMARY KEY,
            channel_name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            owner_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            avatar TEXT NOT NULL,
            banner TEXT NOT NULL,
            social_links_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channel_subscribers (
            channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            video_url TEXT NOT NULL,
            thumbnail_url TEXT NOT NULL,
            category TEXT NOT NULL,
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            dislikes INTEGER NOT NULL DEFAULT 0,
            duration INTEGER NOT NULL DEFAULT 0,
            channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            uploaded_by TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            is_public INTEGER NOT NULL DEFAULT 1,
            tags_json TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            video_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            likes INTEGER NOT NULL DEFAULT 0,
            parent_id TEXT,
            is_edited INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_channel ON videos(channel_id);
        CREATE INDEX IF NOT EXISTS idx_videos_uploader ON videos(uploaded_by);
        CREATE INDEX IF NOT EXISTS idx_videos_created ON videos(created_at);
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
        "#,
    )
    .await?;
    Ok(())
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, avatar, created_at, updated_at";

const CHANNEL_COLUMNS: &str = "id, channel_name, description, owner_id, avatar, banner, \
     social_links_json, created_at, updated_at";

/// Video columns followed by the populated channel and uploader fields.
const VIDEO_VIEW_SELECT: &str = r#"
    SELECT v.id, v.title, v.description, v.video_url, v.thumbnail_url, v.category,
           v.views, v.likes, v.dislikes, v.duration, v.channel_id, v.uploaded_by,
           v.is_public, v.tags_json, v.created_at, v.updated_at,
           c.channel_name, c.avatar, u.username, u.avatar
    FROM videos v
    LEFT JOIN channels c ON c.id = v.channel_id
    LEFT JOIN users u ON u.id = v.uploaded_by
"#;

const COMMENT_VIEW_SELECT: &str = r#"
    SELECT c.id, c.text, c.video_id, c.user_id, c.likes, c.parent_id, c.is_edited,
           c.created_at, c.updated_at, u.username, u.avatar
    FROM comments c
    LEFT JOIN users u ON u.id = c.user_id
"#;

/// Counters on a video that can be bumped in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCounter {
    Views,
    Likes,
    Dislikes,
}

impl VideoCounter {
    fn column(self) -> &'static str {
        match self {
            Self::Views => "views",
            Self::Likes => "likes",
            Self::Dislikes => "dislikes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
    Views,
    Likes,
    Title,
    Duration,
}

/// Listing order, parsed from the `sort` query value (`-views`, `title`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSort {
    pub key: SortKey,
    pub descending: bool,
}

impl Default for VideoSort {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            descending: true,
        }
    }
}

impl VideoSort {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (descending, name) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let key = match name {
            "createdAt" => SortKey::CreatedAt,
            "updatedAt" => SortKey::UpdatedAt,
            "views" => SortKey::Views,
            "likes" => SortKey::Likes,
            "title" => SortKey::Title,
            "duration" => SortKey::Duration,
            _ => return None,
        };
        Some(Self { key, descending })
    }

    fn order_by(self) -> String {
        let column = match self.key {
            SortKey::CreatedAt => "v.created_at",
            SortKey::UpdatedAt => "v.updated_at",
            SortKey::Views => "v.views",
            SortKey::Likes => "v.likes",
            SortKey::Title => "v.title",
            SortKey::Duration => "v.duration",
        };
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!("{column} {direction}, v.rowid {direction}")
    }
}

/// Filters for the public video listings. Only public videos are ever listed.
#[derive(Debug, Clone, Default)]
pub struct VideoQuery {
    pub category: Option<Category>,
    pub channel_id: Option<String>,
    pub search: Option<String>,
    /// Whether `search` also matches tags, not only title and description.
    pub search_tags: bool,
    pub sort: VideoSort,
    pub offset: i64,
    /// `None` returns every match.
    pub limit: Option<i64>,
}

impl VideoQuery {
    fn filter(&self) -> (String, Vec<Value>) {
        let mut clauses = vec!["v.is_public = 1".to_string()];
        let mut values = Vec::new();

        if let Some(category) = self.category {
            values.push(Value::Text(category.as_str().to_string()));
            clauses.push(format!("v.category = ?{}", values.len()));
        }
        if let Some(channel_id) = &self.channel_id {
            values.push(Value::Text(channel_id.clone()));
            clauses.push(format!("v.channel_id = ?{}", values.len()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            values.push(Value::Text(like_pattern(search.trim())));
            let n = values.len();
            let mut fields = vec![
                format!("v.title LIKE ?{n} ESCAPE '\\'"),
                format!("v.description LIKE ?{n} ESCAPE '\\'"),
            ];
            if self.search_tags {
                // Per element, so JSON punctuation in the stored text never matches.
                fields.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(v.tags_json) AS t \
                     WHERE t.value LIKE ?{n} ESCAPE '\\')"
                ));
            }
            clauses.push(format!("({})", fields.join(" OR ")));
        }

        (clauses.join(" AND "), values)
    }
}

/// Partial update of a channel; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ChannelChanges {
    pub channel_name: Option<String>,
    pub description: Option<String>,
    pub banner: Option<String>,
    pub avatar: Option<String>,
    pub social_links: Option<SocialLinks>,
}

/// Partial update of a video; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct VideoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub thumbnail_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

/// Wraps a substring search into a case-insensitive `LIKE` pattern with the
/// wildcard characters of the input escaped.
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Returns the `table.column` named by a UNIQUE constraint failure anywhere in
/// the error chain.
pub fn unique_violation(err: &anyhow::Error) -> Option<String> {
    err.chain().find_map(|cause| {
        let text = cause.to_string();
        let (_, rest) = text.split_once("UNIQUE constraint failed: ")?;
        let column = rest
            .split(|c: char| c == ',' || c == '`' || c.is_whitespace())
            .next()
            .unwrap_or(rest);
        Some(column.to_string())
    })
}

pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Opens (and if necessary creates) the database and makes sure every table
    /// exists. Failing here is fatal for the server.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening database {}", path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Cheap round trip used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let mut rows = self.conn.query("SELECT 1", params![]).await?;
        rows.next().await?.context("missing ping row")?;
        Ok(())
    }

    /// Empties every table, children first. Used by the seeder.
    pub async fn clear_all(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                DELETE FROM comments;
                DELETE FROM videos;
                DELETE FROM channel_subscribers;
                DELETE FROM channels;
                DELETE FROM users;
                "#,
            )
            .await
            .context("clearing tables")?;
        Ok(())
    }

    async fn first_row<T>(
        &self,
        sql: &str,
        values: Vec<Value>,
        map: impl Fn(&Row) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut rows = self.conn.query(sql, params_from_iter(values)).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map(&row)?)),
            None => Ok(None),
        }
    }

    async fn all_rows<T>(
        &self,
        sql: &str,
        values: Vec<Value>,
        map: impl Fn(&Row) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut rows = self.conn.query(sql, params_from_iter(values)).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map(&row)?);
        }
        Ok(out)
    }

    async fn count(&self, sql: &str, values: Vec<Value>) -> Result<i64> {
        self.first_row(sql, values, |row| Ok(row.get::<i64>(0)?))
            .await?
            .context("missing count row")
    }

    // ---- users ----------------------------------------------------------

    /// Fails with a UNIQUE violation (see [`unique_violation`]) when the
    /// username or email is taken.
    pub async fn insert_user(&self, user: &UserRecord) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    user.id.as_str(),
                    user.username.as_str(),
                    user.email.as_str(),
                    user.password_hash.as_str(),
                    user.avatar.as_str(),
                    user.created_at.as_str(),
                    user.updated_at.as_str(),
                ],
            )
            .await
            .context("inserting user")?;
        Ok(())
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<UserRecord>> {
        self.find_user_by("id", id).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.find_user_by("email", email).await
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        self.find_user_by("username", username).await
    }

    async fn find_user_by(&self, column: &'static str, value: &str) -> Result<Option<UserRecord>> {
        self.first_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
            vec![Value::Text(value.to_string())],
            row_to_user,
        )
        .await
    }

    pub async fn user_ref(&self, id: &str) -> Result<Option<UserRef>> {
        self.first_row(
            "SELECT id, username, avatar FROM users WHERE id = ?1",
            vec![Value::Text(id.to_string())],
            |row| {
                Ok(UserRef {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    avatar: row.get(2)?,
                })
            },
        )
        .await
    }

    pub async fn update_user_profile(
        &self,
        id: &str,
        username: Option<&str>,
        avatar: Option<&str>,
        updated_at: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                r#"
                UPDATE users
                SET username = COALESCE(?2, username),
                    avatar = COALESCE(?3, avatar),
                    updated_at = ?4
                WHERE id = ?1
                "#,
                params![id, username, avatar, updated_at],
            )
            .await
            .context("updating user profile")?;
        Ok(())
    }

    // ---- channels -------------------------------------------------------

    /// Inserts the channel unless its owner already has one. Returns whether a
    /// row was written; a concurrent provisioner losing the race gets `false`.
    pub async fn insert_channel_if_absent(&self, channel: &ChannelRecord) -> Result<bool> {
        let social_links_json =
            serde_json::to_string(&channel.social_links).context("serializing social links")?;
        let written = self
            .conn
            .execute(
                &format!(
                    "INSERT INTO channels ({CHANNEL_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(owner_id) DO NOTHING"
                ),
                params![
                    channel.id.as_str(),
                    channel.channel_name.as_str(),
                    channel.description.as_str(),
                    channel.owner_id.as_str(),
                    channel.avatar.as_str(),
                    channel.banner.as_str(),
                    social_links_json,
                    channel.created_at.as_str(),
                    channel.updated_at.as_str(),
                ],
            )
            .await
            .context("inserting channel")?;
        Ok(written == 1)
    }

    pub async fn find_channel(&self, id: &str) -> Result<Option<ChannelRecord>> {
        self.load_channel(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
            id,
        )
        .await
    }

    pub async fn find_channel_by_owner(&self, owner_id: &str) -> Result<Option<ChannelRecord>> {
        self.load_channel(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE owner_id = ?1"),
            owner_id,
        )
        .await
    }

    /// Oldest channel whose name contains `fragment`, ignoring ASCII case.
    pub async fn find_channel_by_name(&self, fragment: &str) -> Result<Option<ChannelRecord>> {
        self.load_channel(
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels \
                 WHERE channel_name LIKE ?1 ESCAPE '\\' \
                 ORDER BY created_at ASC, rowid ASC LIMIT 1"
            ),
            &like_pattern(fragment),
        )
        .await
    }

    async fn load_channel(&self, sql: &str, value: &str) -> Result<Option<ChannelRecord>> {
        let Some(mut channel) = self
            .first_row(sql, vec![Value::Text(value.to_string())], row_to_channel)
            .await?
        else {
            return Ok(None);
        };
        channel.subscribers = self.subscribers(&channel.id).await?;
        Ok(Some(channel))
    }

    pub async fn update_channel(
        &self,
        id: &str,
        changes: &ChannelChanges,
        updated_at: &str,
    ) -> Result<()> {
        let social_links_json = changes
            .social_links
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("serializing social links")?;
        self.conn
            .execute(
                r#"
                UPDATE channels
                SET channel_name = COALESCE(?2, channel_name),
                    description = COALESCE(?3, description),
                    banner = COALESCE(?4, banner),
                    avatar = COALESCE(?5, avatar),
                    social_links_json = COALESCE(?6, social_links_json),
                    updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    id,
                    changes.channel_name.as_deref(),
                    changes.description.as_deref(),
                    changes.banner.as_deref(),
                    changes.avatar.as_deref(),
                    social_links_json,
                    updated_at,
                ],
            )
            .await
            .context("updating channel")?;
        Ok(())
    }

    pub async fn rename_owner_channel(
        &self,
        owner_id: &str,
        channel_name: &str,
        updated_at: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE channels SET channel_name = ?2, updated_at = ?3 WHERE owner_id = ?1",
                params![owner_id, channel_name, updated_at],
            )
            .await
            .context("renaming channel")?;
        Ok(())
    }

    /// Adds `user_id` to the subscriber set. Returns `false` if it was already
    /// a member.
    pub async fn add_subscriber(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        let written = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO channel_subscribers (channel_id, user_id) VALUES (?1, ?2)",
                params![channel_id, user_id],
            )
            .await
            .context("adding subscriber")?;
        Ok(written == 1)
    }

    /// Removes `user_id` from the subscriber set. Returns `false` if it was not
    /// a member.
    pub async fn remove_subscriber(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM channel_subscribers WHERE channel_id = ?1 AND user_id = ?2",
                params![channel_id, user_id],
            )
            .await
            .context("removing subscriber")?;
        Ok(removed == 1)
    }

    pub async fn subscribers(&self, channel_id: &str) -> Result<Vec<String>> {
        self.all_rows(
            "SELECT user_id FROM channel_subscribers WHERE channel_id = ?1 ORDER BY rowid",
            vec![Value::Text(channel_id.to_string())],
            |row| Ok(row.get::<String>(0)?),
        )
        .await
    }

    pub async fn subscriber_count(&self, channel_id: &str) -> Result<i64> {
        self.count(
            "SELECT COUNT(*) FROM channel_subscribers WHERE channel_id = ?1",
            vec![Value::Text(channel_id.to_string())],
        )
        .await
    }

    /// Number of public videos on the channel and the sum of their views.
    pub async fn channel_stats(&self, channel_id: &str) -> Result<(i64, i64)> {
        self.first_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(views), 0)
            FROM videos
            WHERE channel_id = ?1 AND is_public = 1
            "#,
            vec![Value::Text(channel_id.to_string())],
            |row| Ok((row.get::<i64>(0)?, row.get::<i64>(1)?)),
        )
        .await?
        .context("missing channel stats row")
    }

    // ---- videos ---------------------------------------------------------

    pub async fn insert_video(&self, video: &VideoRecord) -> Result<()> {
        let tags_json = serde_json::to_string(&video.tags).context("serializing tags")?;
        self.conn
            .execute(
                r#"
                INSERT INTO videos (
                    id, title, description, video_url, thumbnail_url, category,
                    views, likes, dislikes, duration, channel_id, uploaded_by,
                    is_public, tags_json, created_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16
                )
                "#,
                params![
                    video.id.as_str(),
                    video.title.as_str(),
                    video.description.as_str(),
                    video.video_url.as_str(),
                    video.thumbnail_url.as_str(),
                    video.category.as_str(),
                    video.views,
                    video.likes,
                    video.dislikes,
                    video.duration,
                    video.channel_id.as_str(),
                    video.uploaded_by.as_str(),
                    video.is_public as i64,
                    tags_json,
                    video.created_at.as_str(),
                    video.updated_at.as_str(),
                ],
            )
            .await
            .context("inserting video")?;
        Ok(())
    }

    pub async fn find_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        self.first_row(
            &format!("{VIDEO_VIEW_SELECT} WHERE v.id = ?1"),
            vec![Value::Text(id.to_string())],
            row_to_video,
        )
        .await
    }

    /// The video with its channel and uploader populated.
    pub async fn video_view(&self, id: &str) -> Result<Option<VideoView>> {
        let rows = self
            .all_rows(
                &format!("{VIDEO_VIEW_SELECT} WHERE v.id = ?1"),
                vec![Value::Text(id.to_string())],
                row_to_video_parts,
            )
            .await?;
        Ok(self.populate_videos(rows).await?.into_iter().next())
    }

    /// One page of matching videos plus the total number of matches.
    pub async fn list_videos(&self, query: &VideoQuery) -> Result<(Vec<VideoView>, i64)> {
        let (filter, mut values) = query.filter();
        let total = self
            .count(
                &format!("SELECT COUNT(*) FROM videos v WHERE {filter}"),
                values.clone(),
            )
            .await?;

        values.push(Value::Integer(query.limit.unwrap_or(-1)));
        let limit_slot = values.len();
        values.push(Value::Integer(query.offset.max(0)));
        let offset_slot = values.len();
        let sql = format!(
            "{VIDEO_VIEW_SELECT} WHERE {filter} ORDER BY {} LIMIT ?{limit_slot} OFFSET ?{offset_slot}",
            query.sort.order_by()
        );
        let rows = self.all_rows(&sql, values, row_to_video_parts).await?;
        Ok((self.populate_videos(rows).await?, total))
    }

    async fn populate_videos(&self, rows: Vec<VideoParts>) -> Result<Vec<VideoView>> {
        let mut subscribers: HashMap<String, Vec<String>> = HashMap::new();
        let mut views = Vec::with_capacity(rows.len());
        for parts in rows {
            let channel = match parts.channel {
                Some((channel_name, avatar)) => {
                    let channel_id = parts.record.channel_id.clone();
                    if !subscribers.contains_key(&channel_id) {
                        let list = self.subscribers(&channel_id).await?;
                        subscribers.insert(channel_id.clone(), list);
                    }
                    Some(ChannelBrief {
                        subscribers: subscribers.get(&channel_id).cloned().unwrap_or_default(),
                        id: channel_id,
                        channel_name,
                        avatar,
                    })
                }
                None => None,
            };
            views.push(parts.record.into_view(channel, parts.uploader));
        }
        Ok(views)
    }

    pub async fn update_video(
        &self,
        id: &str,
        changes: &VideoChanges,
        updated_at: &str,
    ) -> Result<()> {
        let tags_json = changes
            .tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("serializing tags")?;
        self.conn
            .execute(
                r#"
                UPDATE videos
                SET title = COALESCE(?2, title),
                    description = COALESCE(?3, description),
                    category = COALESCE(?4, category),
                    thumbnail_url = COALESCE(?5, thumbnail_url),
                    tags_json = COALESCE(?6, tags_json),
                    is_public = COALESCE(?7, is_public),
                    updated_at = ?8
                WHERE id = ?1
                "#,
                params![
                    id,
                    changes.title.as_deref(),
                    changes.description.as_deref(),
                    changes.category.map(Category::as_str),
                    changes.thumbnail_url.as_deref(),
                    tags_json,
                    changes.is_public.map(i64::from),
                    updated_at,
                ],
            )
            .await
            .context("updating video")?;
        Ok(())
    }

    pub async fn delete_video(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM videos WHERE id = ?1", params![id])
            .await
            .context("deleting video")?;
        Ok(removed == 1)
    }

    /// Adds one to the counter in place. Returns `false` when the video does
    /// not exist.
    pub async fn increment_video_counter(&self, id: &str, counter: VideoCounter) -> Result<bool> {
        let column = counter.column();
        let touched = self
            .conn
            .execute(
                &format!("UPDATE videos SET {column} = {column} + 1 WHERE id = ?1"),
                params![id],
            )
            .await
            .with_context(|| format!("incrementing video {column}"))?;
        Ok(touched == 1)
    }

    // ---- comments -------------------------------------------------------

    pub async fn insert_comment(&self, comment: &CommentRecord) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO comments (
                    id, text, video_id, user_id, likes, parent_id, is_edited,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    comment.id.as_str(),
                    comment.text.as_str(),
                    comment.video_id.as_str(),
                    comment.user_id.as_str(),
                    comment.likes,
                    comment.parent_id.as_deref(),
                    comment.is_edited as i64,
                    comment.created_at.as_str(),
                    comment.updated_at.as_str(),
                ],
            )
            .await
            .context("inserting comment")?;
        Ok(())
    }

    pub async fn find_comment(&self, id: &str) -> Result<Option<CommentRecord>> {
        Ok(self
            .comment_parts(&format!("{COMMENT_VIEW_SELECT} WHERE c.id = ?1"), id)
            .await?
            .into_iter()
            .next()
            .map(|(record, _)| record))
    }

    pub async fn comment_view(&self, id: &str) -> Result<Option<CommentView>> {
        Ok(self
            .comment_parts(&format!("{COMMENT_VIEW_SELECT} WHERE c.id = ?1"), id)
            .await?
            .into_iter()
            .next()
            .map(|(record, user)| record.into_view(user)))
    }

    /// Top-level comments of a video, newest first.
    pub async fn top_level_comments(&self, video_id: &str) -> Result<Vec<CommentView>> {
        let sql = format!(
            "{COMMENT_VIEW_SELECT} WHERE c.video_id = ?1 AND c.parent_id IS NULL \
             ORDER BY c.created_at DESC, c.rowid DESC"
        );
        Ok(self
            .comment_parts(&sql, video_id)
            .await?
            .into_iter()
            .map(|(record, user)| record.into_view(user))
            .collect())
    }

    async fn comment_parts(
        &self,
        sql: &str,
        value: &str,
    ) -> Result<Vec<(CommentRecord, Option<UserRef>)>> {
        self.all_rows(sql, vec![Value::Text(value.to_string())], row_to_comment_parts)
            .await
    }

    pub async fn update_comment_text(&self, id: &str, text: &str, updated_at: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE comments SET text = ?2, is_edited = 1, updated_at = ?3 WHERE id = ?1",
                params![id, text, updated_at],
            )
            .await
            .context("updating comment")?;
        Ok(())
    }

    /// Deletes the comment and every comment whose parent is it, in one
    /// statement. Grandchildren are not followed. Returns the number of rows
    /// removed.
    pub async fn delete_comment_with_replies(&self, id: &str) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM comments WHERE id = ?1 OR parent_id = ?1",
                params![id],
            )
            .await
            .context("deleting comment")?;
        Ok(removed)
    }

    /// Bumps the like counter and returns the new value, or `None` when the
    /// comment does not exist.
    pub async fn increment_comment_likes(&self, id: &str) -> Result<Option<i64>> {
        let touched = self
            .conn
            .execute(
                "UPDATE comments SET likes = likes + 1 WHERE id = ?1",
                params![id],
            )
            .await
            .context("incrementing comment likes")?;
        if touched == 0 {
            return Ok(None);
        }
        self.first_row(
            "SELECT likes FROM comments WHERE id = ?1",
            vec![Value::Text(id.to_string())],
            |row| Ok(row.get::<i64>(0)?),
        )
        .await
    }
}

fn row_to_user(row: &Row) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        avatar: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Subscribers are filled in separately by `load_channel`.
fn row_to_channel(row: &Row) -> Result<ChannelRecord> {
    let social_links_json: String = row.get(6)?;
    let social_links: SocialLinks =
        serde_json::from_str(&social_links_json).context("parsing stored social links")?;
    Ok(ChannelRecord {
        id: row.get(0)?,
        channel_name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        avatar: row.get(4)?,
        banner: row.get(5)?,
        social_links,
        subscribers: Vec::new(),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

// Column order must match VIDEO_VIEW_SELECT.
fn row_to_video(row: &Row) -> Result<VideoRecord> {
    let category: String = row.get(5)?;
    let category =
        Category::parse(&category).ok_or_else(|| anyhow!("unknown stored category {category}"))?;
    let tags_json: String = row.get(13)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).context("parsing stored tags")?;

    Ok(VideoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        video_url: row.get(3)?,
        thumbnail_url: row.get(4)?,
        category,
        views: row.get(6)?,
        likes: row.get(7)?,
        dislikes: row.get(8)?,
        duration: row.get(9)?,
        channel_id: row.get(10)?,
        uploaded_by: row.get(11)?,
        is_public: row.get::<i64>(12)? != 0,
        tags,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

struct VideoParts {
    record: VideoRecord,
    channel: Option<(String, String)>,
    uploader: Option<UserRef>,
}

fn row_to_video_parts(row: &Row) -> Result<VideoParts> {
    let record = row_to_video(row)?;
    let channel_name: Option<String> = row.get(16)?;
    let channel_avatar: Option<String> = row.get(17)?;
    let username: Option<String> = row.get(18)?;
    let user_avatar: Option<String> = row.get(19)?;

    let channel = channel_name.map(|name| (name, channel_avatar.unwrap_or_default()));
    let uploader = username.map(|username| UserRef {
        id: record.uploaded_by.clone(),
        username,
        avatar: user_avatar.unwrap_or_default(),
    });
    Ok(VideoParts {
        record,
        channel,
        uploader,
    })
}

// Column order must match COMMENT_VIEW_SELECT.
fn row_to_comment_parts(row: &Row) -> Result<(CommentRecord, Option<UserRef>)> {
    let record = CommentRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        video_id: row.get(2)?,
        user_id: row.get(3)?,
        likes: row.get(4)?,
        parent_id: row.get(5)?,
        is_edited: row.get::<i64>(6)? != 0,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    };
    let username: Option<String> = row.get(9)?;
    let avatar: Option<String> = row.get(10)?;
    let user = username.map(|username| UserRef {
        id: record.user_id.clone(),
        username,
        avatar: avatar.unwrap_or_default(),
    });
    Ok((record, user))
}
