//! Channel lookup, lazy provisioning, updates and the subscription toggle.

use serde::{Deserialize, Serialize};

use crate::{
    access::authorize_owner,
    error::{AppError, AppResult},
    models::{
        ChannelRecord, ChannelView, DEFAULT_BANNER, SocialLinks, UserRecord, new_id, non_blank,
        timestamp_now,
    },
    store::{ChannelChanges, Store},
};

const CHANNEL_NOT_FOUND: &str = "Channel not found";
const MAX_NAME_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 1000;

pub fn default_channel_name(username: &str) -> String {
    format!("{username}'s Channel")
}

pub fn default_channel_for(user: &UserRecord) -> ChannelRecord {
    let now = timestamp_now();
    ChannelRecord {
        id: new_id(),
        channel_name: default_channel_name(&user.username),
        description: format!("Welcome to {}'s YouTube channel!", user.username),
        owner_id: user.id.clone(),
        avatar: user.avatar.clone(),
        banner: DEFAULT_BANNER.to_string(),
        social_links: SocialLinks::default(),
        subscribers: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Returns the user's channel, creating the default one if it has none.
///
/// Owners are unique in storage, so two racing callers both end up with the
/// row that was written first.
pub async fn ensure_channel(store: &Store, user: &UserRecord) -> AppResult<ChannelRecord> {
    if let Some(channel) = store.find_channel_by_owner(&user.id).await? {
        return Ok(channel);
    }

    let channel = default_channel_for(user);
    if store.insert_channel_if_absent(&channel).await? {
        tracing::info!(user_id = %user.id, channel_id = %channel.id, "provisioned channel");
    }
    store
        .find_channel_by_owner(&user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("channel for {} missing after provisioning", user.id).into())
}

/// Channel page payload: owner projection plus public video statistics.
pub async fn channel_view(store: &Store, channel: ChannelRecord) -> AppResult<ChannelView> {
    let owner = store.user_ref(&channel.owner_id).await?;
    let (video_count, total_views) = store.channel_stats(&channel.id).await?;
    Ok(ChannelView {
        id: channel.id,
        channel_name: channel.channel_name,
        description: channel.description,
        avatar: channel.avatar,
        channel_banner: channel.banner,
        owner,
        subscribers: channel.subscribers,
        social_links: channel.social_links,
        created_at: channel.created_at,
        updated_at: channel.updated_at,
        video_count,
        total_views,
    })
}

/// Looks the channel up by id first, then by a case-insensitive name match.
pub async fn get_channel(store: &Store, id_or_name: &str) -> AppResult<ChannelView> {
    let channel = match store.find_channel(id_or_name).await? {
        Some(channel) => Some(channel),
        None if !id_or_name.trim().is_empty() => {
            store.find_channel_by_name(id_or_name.trim()).await?
        }
        None => None,
    };
    let channel = channel.ok_or_else(|| AppError::not_found(CHANNEL_NOT_FOUND))?;
    channel_view(store, channel).await
}

pub async fn current_channel(store: &Store, user: &UserRecord) -> AppResult<ChannelView> {
    let channel = ensure_channel(store, user).await?;
    channel_view(store, channel).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIdentity {
    pub channel_id: String,
    pub channel_name: String,
}

pub async fn current_channel_id(store: &Store, user: &UserRecord) -> AppResult<ChannelIdentity> {
    let channel = ensure_channel(store, user).await?;
    Ok(ChannelIdentity {
        channel_id: channel.id,
        channel_name: channel.channel_name,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    pub channel_name: Option<String>,
    pub description: Option<String>,
    pub channel_banner: Option<String>,
    pub avatar: Option<String>,
    pub social_links: Option<SocialLinks>,
}

impl ChannelUpdate {
    fn into_changes(self) -> AppResult<ChannelChanges> {
        let channel_name = non_blank(self.channel_name);
        if channel_name
            .as_deref()
            .is_some_and(|name| name.chars().count() > MAX_NAME_CHARS)
        {
            return Err(AppError::validation(
                "Channel name cannot exceed 100 characters",
            ));
        }
        let description = non_blank(self.description);
        if description
            .as_deref()
            .is_some_and(|text| text.chars().count() > MAX_DESCRIPTION_CHARS)
        {
            return Err(AppError::validation(
                "Description cannot exceed 1000 characters",
            ));
        }
        Ok(ChannelChanges {
            channel_name,
            description,
            banner: non_blank(self.channel_banner),
            avatar: non_blank(self.avatar),
            social_links: self.social_links,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ChannelUpdated {
    pub message: &'static str,
    pub channel: ChannelView,
}

pub async fn update_channel(
    store: &Store,
    actor_id: &str,
    channel_id: &str,
    update: ChannelUpdate,
) -> AppResult<ChannelUpdated> {
    let channel = authorize_owner(store.find_channel(channel_id).await?, actor_id, "update")?;
    let changes = update.into_changes()?;
    store
        .update_channel(&channel.id, &changes, &timestamp_now())
        .await?;

    let channel = store
        .find_channel(&channel.id)
        .await?
        .ok_or_else(|| AppError::not_found(CHANNEL_NOT_FOUND))?;
    Ok(ChannelUpdated {
        message: "Channel updated successfully",
        channel: channel_view(store, channel).await?,
    })
}

#[derive(Debug, Serialize)]
pub struct SubscriptionState {
    pub message: &'static str,
    /// Subscriber count after the toggle.
    pub subscribers: i64,
    pub subscribed: bool,
}

/// Flips the caller's membership in the channel's subscriber set.
pub async fn toggle_subscription(
    store: &Store,
    channel_id: &str,
    user_id: &str,
) -> AppResult<SubscriptionState> {
    let channel = store
        .find_channel(channel_id)
        .await?
        .ok_or_else(|| AppError::not_found(CHANNEL_NOT_FOUND))?;
    if channel.owner_id == user_id {
        return Err(AppError::invalid_operation(
            "Cannot subscribe to your own channel",
        ));
    }

    // Removal decides the direction, so two racing toggles never both add.
    let subscribed = if store.remove_subscriber(&channel.id, user_id).await? {
        false
    } else {
        store.add_subscriber(&channel.id, user_id).await?;
        true
    };
    let subscribers = store.subscriber_count(&channel.id).await?;
    tracing::info!(channel_id = %channel.id, user_id, subscribed, "subscription toggled");

    Ok(SubscriptionState {
        message: if subscribed {
            "Subscribed successfully"
        } else {
            "Unsubscribed successfully"
        },
        subscribers,
        subscribed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestContext;

    #[tokio::test]
    async fn ensure_channel_is_idempotent() {
        let ctx = TestContext::new().await;
        let user = ctx.insert_bare_user("dave").await;

        let first = ensure_channel(&ctx.store, &user).await.unwrap();
        let second = ensure_channel(&ctx.store, &user).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.channel_name, "dave's Channel");
        assert_eq!(first.avatar, user.avatar);
    }

    #[tokio::test]
    async fn concurrent_provisioning_yields_one_channel() {
        let ctx = TestContext::new().await;
        let user = ctx.insert_bare_user("erin").await;

        let (left, right) = tokio::join!(
            ensure_channel(&ctx.store, &user),
            ensure_channel(&ctx.store, &user)
        );
        assert_eq!(left.unwrap().id, right.unwrap().id);
    }

    #[tokio::test]
    async fn channel_id_lookup_provisions_the_default_channel() {
        let ctx = TestContext::new().await;
        let user = ctx.insert_bare_user("gina").await;

        let identity = current_channel_id(&ctx.store, &user).await.unwrap();
        assert_eq!(identity.channel_name, "gina's Channel");
        let channel = ctx.store.find_channel(&identity.channel_id).await.unwrap().unwrap();
        assert_eq!(channel.description, "Welcome to gina's YouTube channel!");
        assert_eq!(channel.owner_id, user.id);
    }

    #[tokio::test]
    async fn get_channel_by_id_or_name() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let channel = ctx.store.find_channel_by_owner(&alice.id).await.unwrap().unwrap();

        let by_id = get_channel(&ctx.store, &channel.id).await.unwrap();
        assert_eq!(by_id.id, channel.id);
        assert_eq!(by_id.owner.as_ref().unwrap().username, "alice");
        assert_eq!((by_id.video_count, by_id.total_views), (0, 0));

        let by_name = get_channel(&ctx.store, "ALICE's").await.unwrap();
        assert_eq!(by_name.id, channel.id);

        let err = get_channel(&ctx.store, "nobody-here").await.unwrap_err();
        assert_eq!(err.message(), "Channel not found");
    }

    #[tokio::test]
    async fn subscription_toggle_is_its_own_inverse() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let bob = ctx.register("bob", "secret1").await;
        let channel = ctx.store.find_channel_by_owner(&alice.id).await.unwrap().unwrap();

        let on = toggle_subscription(&ctx.store, &channel.id, &bob.id).await.unwrap();
        assert!(on.subscribed);
        assert_eq!(on.subscribers, 1);
        assert_eq!(on.message, "Subscribed successfully");

        let off = toggle_subscription(&ctx.store, &channel.id, &bob.id).await.unwrap();
        assert!(!off.subscribed);
        assert_eq!(off.subscribers, 0);
        assert!(ctx.store.subscribers(&channel.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn owner_cannot_subscribe_to_own_channel() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let channel = ctx.store.find_channel_by_owner(&alice.id).await.unwrap().unwrap();

        for _ in 0..2 {
            let err = toggle_subscription(&ctx.store, &channel.id, &alice.id)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidOperation(_)));
        }
        assert_eq!(ctx.store.subscriber_count(&channel.id).await.unwrap(), 0);

        let err = toggle_subscription(&ctx.store, "missing", &alice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn only_owner_updates_channel() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let bob = ctx.register("bob", "secret1").await;
        let channel = ctx.store.find_channel_by_owner(&alice.id).await.unwrap().unwrap();

        let err = update_channel(
            &ctx.store,
            &bob.id,
            &channel.id,
            ChannelUpdate {
                channel_name: Some("Hijacked".into()),
                ..ChannelUpdate::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let updated = update_channel(
            &ctx.store,
            &alice.id,
            &channel.id,
            ChannelUpdate {
                channel_name: Some("Alice Codes".into()),
                description: Some("".into()),
                social_links: Some(SocialLinks {
                    website: Some("https://alice.dev".into()),
                    ..SocialLinks::default()
                }),
                ..ChannelUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.channel.channel_name, "Alice Codes");
        assert_eq!(updated.channel.description, channel.description);
        assert_eq!(
            updated.channel.social_links.website.as_deref(),
            Some("https://alice.dev")
        );
    }

    #[tokio::test]
    async fn overlong_channel_name_is_rejected() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        let channel = ctx.store.find_channel_by_owner(&alice.id).await.unwrap().unwrap();

        let err = update_channel(
            &ctx.store,
            &alice.id,
            &channel.id,
            ChannelUpdate {
                channel_name: Some("x".repeat(101)),
                ..ChannelUpdate::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
