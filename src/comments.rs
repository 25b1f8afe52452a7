//! Comment threads: one level of replies under top-level comments.

use serde::{Deserialize, Serialize};

use crate::{
    access::authorize_owner,
    error::{AppError, AppResult},
    models::{CommentRecord, CommentView, new_id, non_blank, timestamp_now},
    store::Store,
};

const COMMENT_NOT_FOUND: &str = "Comment not found";
const MAX_TEXT_CHARS: usize = 1000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub text: Option<String>,
    /// Set when replying. Not checked against existing comments.
    pub parent_comment_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentEdit {
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeleted {
    pub message: &'static str,
    pub comment_id: String,
}

#[derive(Debug, Serialize)]
pub struct CommentLiked {
    pub message: &'static str,
    pub likes: i64,
}

fn comment_text(text: Option<String>) -> AppResult<String> {
    let text = non_blank(text).ok_or_else(|| AppError::validation("Comment text is required"))?;
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(AppError::validation(
            "Comment cannot exceed 1000 characters",
        ));
    }
    Ok(text)
}

pub async fn add_comment(
    store: &Store,
    video_id: &str,
    user_id: &str,
    request: NewComment,
) -> AppResult<CommentView> {
    let text = comment_text(request.text)?;
    if store.find_video(video_id).await?.is_none() {
        return Err(AppError::not_found("Video not found"));
    }

    let now = timestamp_now();
    let comment = CommentRecord {
        id: new_id(),
        text,
        video_id: video_id.to_string(),
        user_id: user_id.to_string(),
        likes: 0,
        parent_id: non_blank(request.parent_comment_id),
        is_edited: false,
        created_at: now.clone(),
        updated_at: now,
    };
    store.insert_comment(&comment).await?;

    store
        .comment_view(&comment.id)
        .await?
        .ok_or_else(|| AppError::not_found(COMMENT_NOT_FOUND))
}

/// Top-level comments only, newest first.
pub async fn list_comments(store: &Store, video_id: &str) -> AppResult<Vec<CommentView>> {
    Ok(store.top_level_comments(video_id).await?)
}

pub async fn edit_comment(
    store: &Store,
    actor_id: &str,
    id: &str,
    edit: CommentEdit,
) -> AppResult<CommentView> {
    let text = comment_text(edit.text)?;
    let comment = authorize_owner(store.find_comment(id).await?, actor_id, "update")?;
    store
        .update_comment_text(&comment.id, &text, &timestamp_now())
        .await?;

    store
        .comment_view(&comment.id)
        .await?
        .ok_or_else(|| AppError::not_found(COMMENT_NOT_FOUND))
}

/// Removes the comment together with its direct replies.
pub async fn delete_comment(store: &Store, actor_id: &str, id: &str) -> AppResult<CommentDeleted> {
    let comment = authorize_owner(store.find_comment(id).await?, actor_id, "delete")?;
    let removed = store.delete_comment_with_replies(&comment.id).await?;
    tracing::debug!(comment_id = %comment.id, removed, "comment deleted");
    Ok(CommentDeleted {
        message: "Comment deleted successfully",
        comment_id: comment.id,
    })
}

pub async fn like_comment(store: &Store, id: &str) -> AppResult<CommentLiked> {
    let likes = store
        .increment_comment_likes(id)
        .await?
        .ok_or_else(|| AppError::not_found(COMMENT_NOT_FOUND))?;
    Ok(CommentLiked {
        message: "Comment liked successfully",
        likes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestContext;

    fn text(value: &str) -> NewComment {
        NewComment {
            text: Some(value.into()),
            parent_comment_id: None,
        }
    }

    fn reply(value: &str, parent: &str) -> NewComment {
        NewComment {
            text: Some(value.into()),
            parent_comment_id: Some(parent.into()),
        }
    }

    #[tokio::test]
    async fn add_requires_text_and_existing_video() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let video_id = ctx.upload(&alice, "Test").await;

        let err = add_comment(&ctx.store, &video_id, &alice.id, text("   "))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Comment text is required");

        let err = add_comment(&ctx.store, "missing", &alice.id, text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let view = add_comment(&ctx.store, &video_id, &alice.id, text("  hi  "))
            .await
            .unwrap();
        assert_eq!(view.text, "hi");
        assert_eq!(view.user.unwrap().username, "alice");
        assert!(view.parent_comment.is_none());
    }

    #[tokio::test]
    async fn listing_shows_top_level_newest_first() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let video_id = ctx.upload(&alice, "Test").await;

        let first = add_comment(&ctx.store, &video_id, &alice.id, text("first"))
            .await
            .unwrap();
        add_comment(&ctx.store, &video_id, &alice.id, reply("re", &first.id))
            .await
            .unwrap();
        let second = add_comment(&ctx.store, &video_id, &alice.id, text("second"))
            .await
            .unwrap();

        let listed = list_comments(&ctx.store, &video_id).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn edit_marks_comment_and_checks_owner() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let bob = ctx.register("bob", "secret1").await;
        let video_id = ctx.upload(&alice, "Test").await;
        let comment = add_comment(&ctx.store, &video_id, &alice.id, text("draft"))
            .await
            .unwrap();

        let err = edit_comment(
            &ctx.store,
            &bob.id,
            &comment.id,
            CommentEdit {
                text: Some("vandalized".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = edit_comment(&ctx.store, &alice.id, &comment.id, CommentEdit { text: None })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let edited = edit_comment(
            &ctx.store,
            &alice.id,
            &comment.id,
            CommentEdit {
                text: Some("final".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(edited.text, "final");
        assert!(edited.is_edited);
    }

    #[tokio::test]
    async fn deleting_top_level_takes_replies_but_reply_delete_is_local() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let video_id = ctx.upload(&alice, "Test").await;

        let parent = add_comment(&ctx.store, &video_id, &alice.id, text("parent"))
            .await
            .unwrap();
        let first = add_comment(&ctx.store, &video_id, &alice.id, reply("a", &parent.id))
            .await
            .unwrap();
        let second = add_comment(&ctx.store, &video_id, &alice.id, reply("b", &parent.id))
            .await
            .unwrap();

        delete_comment(&ctx.store, &alice.id, &first.id).await.unwrap();
        assert!(ctx.store.find_comment(&parent.id).await.unwrap().is_some());
        assert!(ctx.store.find_comment(&second.id).await.unwrap().is_some());

        let deleted = delete_comment(&ctx.store, &alice.id, &parent.id).await.unwrap();
        assert_eq!(deleted.comment_id, parent.id);
        assert!(ctx.store.find_comment(&parent.id).await.unwrap().is_none());
        assert!(ctx.store.find_comment(&second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn likes_accumulate() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let video_id = ctx.upload(&alice, "Test").await;
        let comment = add_comment(&ctx.store, &video_id, &alice.id, text("hi"))
            .await
            .unwrap();

        like_comment(&ctx.store, &comment.id).await.unwrap();
        let liked = like_comment(&ctx.store, &comment.id).await.unwrap();
        assert_eq!(liked.likes, 2);

        let err = like_comment(&ctx.store, "missing").await.unwrap_err();
        assert_eq!(err.message(), "Comment not found");
    }
}
