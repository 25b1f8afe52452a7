//! Ownership checks for mutations.

use crate::{
    error::{AppError, AppResult},
    models::{ChannelRecord, CommentRecord, VideoRecord},
};

/// A resource that belongs to exactly one user.
pub trait Owned {
    const KIND: &'static str;

    fn owner_id(&self) -> &str;
}

impl Owned for VideoRecord {
    const KIND: &'static str = "Video";

    fn owner_id(&self) -> &str {
        &self.uploaded_by
    }
}

impl Owned for CommentRecord {
    const KIND: &'static str = "Comment";

    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

impl Owned for ChannelRecord {
    const KIND: &'static str = "Channel";

    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// Hands back the resource when `actor_id` owns it. A missing resource is
/// reported before ownership is looked at.
pub fn authorize_owner<R: Owned>(resource: Option<R>, actor_id: &str, action: &str) -> AppResult<R> {
    let resource = resource.ok_or_else(|| AppError::not_found(format!("{} not found", R::KIND)))?;
    if resource.owner_id() != actor_id {
        return Err(AppError::forbidden(format!(
            "Not authorized to {action} this {}",
            R::KIND.to_lowercase()
        )));
    }
    Ok(resource)
}
