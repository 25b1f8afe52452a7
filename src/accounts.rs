//! Registration, login and the caller's own profile.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    auth::Authenticator,
    channels,
    error::{AppError, AppResult},
    models::{ChannelSummary, DEFAULT_AVATAR, PublicUser, UserRecord, new_id, non_blank, timestamp_now},
    store::{Store, unique_violation},
};

const EMAIL_TAKEN: &str = "Email already registered";
const USERNAME_TAKEN: &str = "Username already taken";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Validate)]
struct NewAccount {
    #[validate(length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"))]
    username: String,
    #[validate(email(message = "Please provide a valid email"))]
    email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
}

/// Token plus public projection handed out by register and login.
#[derive(Debug, Serialize)]
pub struct AuthSession {
    pub message: &'static str,
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub user: ProfileUser,
}

#[derive(Debug, Serialize)]
pub struct ProfileUser {
    #[serde(flatten)]
    pub user: PublicUser,
    pub channel: ChannelSummary,
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdated {
    pub message: &'static str,
    pub user: PublicUser,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates the user and its default channel, then signs the caller in.
pub async fn register(
    store: &Store,
    auth: &Authenticator,
    request: RegisterRequest,
) -> AppResult<AuthSession> {
    let (Some(username), Some(email), Some(password)) = (
        non_blank(request.username),
        non_blank(request.email),
        request.password.filter(|password| !password.is_empty()),
    ) else {
        return Err(AppError::validation("All fields are required"));
    };

    let account = NewAccount {
        username,
        email: normalize_email(&email),
        password,
    };
    account.validate()?;

    if store.find_user_by_email(&account.email).await?.is_some() {
        return Err(AppError::conflict(EMAIL_TAKEN));
    }
    if store.find_user_by_username(&account.username).await?.is_some() {
        return Err(AppError::conflict(USERNAME_TAKEN));
    }

    let now = timestamp_now();
    let user = UserRecord {
        id: new_id(),
        username: account.username,
        email: account.email,
        password_hash: auth.hash_password(&account.password).await?,
        avatar: DEFAULT_AVATAR.to_string(),
        created_at: now.clone(),
        updated_at: now,
    };

    // A concurrent registration can still win between the lookups and here.
    if let Err(err) = store.insert_user(&user).await {
        return Err(match unique_violation(&err).as_deref() {
            Some("users.email") => AppError::conflict(EMAIL_TAKEN),
            Some("users.username") => AppError::conflict(USERNAME_TAKEN),
            _ => err.into(),
        });
    }

    channels::ensure_channel(store, &user).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "registered user");

    Ok(AuthSession {
        message: "User registered successfully",
        token: auth.issue_token(&user.id)?,
        user: user.public(),
    })
}

/// Unknown email and wrong password fail identically.
pub async fn login(
    store: &Store,
    auth: &Authenticator,
    request: LoginRequest,
) -> AppResult<AuthSession> {
    let (Some(email), Some(password)) = (
        non_blank(request.email),
        request.password.filter(|password| !password.is_empty()),
    ) else {
        return Err(AppError::validation("Email and password are required"));
    };

    let Some(user) = store.find_user_by_email(&normalize_email(&email)).await? else {
        return Err(AppError::auth(INVALID_CREDENTIALS));
    };
    if !auth.verify_password(&password, &user.password_hash).await? {
        return Err(AppError::auth(INVALID_CREDENTIALS));
    }

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(AuthSession {
        message: "Login successful",
        token: auth.issue_token(&user.id)?,
        user: user.public(),
    })
}

/// The caller's public profile with its channel, provisioning the channel on
/// first use.
pub async fn current_user(store: &Store, user_id: &str) -> AppResult<Profile> {
    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let channel = channels::ensure_channel(store, &user).await?;
    Ok(Profile {
        user: ProfileUser {
            user: user.public(),
            channel: channel.summary(),
        },
    })
}

/// Blank fields are left untouched. A new username also renames the owner's
/// channel.
pub async fn update_profile(
    store: &Store,
    user_id: &str,
    update: ProfileUpdate,
) -> AppResult<ProfileUpdated> {
    let username = non_blank(update.username);
    let avatar = non_blank(update.avatar);

    if let Some(name) = username.as_deref() {
        if !(3..=30).contains(&name.chars().count()) {
            return Err(AppError::validation(
                "Username must be between 3 and 30 characters",
            ));
        }
        if let Some(other) = store.find_user_by_username(name).await? {
            if other.id != user_id {
                return Err(AppError::conflict(USERNAME_TAKEN));
            }
        }
    }

    let now = timestamp_now();
    if let Err(err) = store
        .update_user_profile(user_id, username.as_deref(), avatar.as_deref(), &now)
        .await
    {
        return Err(match unique_violation(&err).as_deref() {
            Some("users.username") => AppError::conflict(USERNAME_TAKEN),
            _ => err.into(),
        });
    }

    if let Some(name) = username.as_deref() {
        store
            .rename_owner_channel(user_id, &channels::default_channel_name(name), &now)
            .await?;
    }

    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(ProfileUpdated {
        message: "Profile updated successfully",
        user: user.public(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestContext, register_request};

    fn message(err: AppError) -> String {
        err.message()
    }

    #[tokio::test]
    async fn register_returns_token_and_creates_channel() {
        let ctx = TestContext::new().await;
        let session = register(
            &ctx.store,
            &ctx.auth,
            register_request("alice", "Alice@Example.com", "secret1"),
        )
        .await
        .unwrap();

        assert_eq!(session.message, "User registered successfully");
        assert_eq!(ctx.auth.verify_token(&session.token).unwrap(), session.user.id);
        assert_eq!(session.user.email, "alice@example.com");

        let rendered = serde_json::to_string(&session).unwrap();
        assert!(!rendered.contains("password"));

        let channel = ctx
            .store
            .find_channel_by_owner(&session.user.id)
            .await
            .unwrap()
            .expect("channel provisioned");
        assert_eq!(channel.channel_name, "alice's Channel");
        assert_eq!(channel.description, "Welcome to alice's YouTube channel!");
    }

    #[tokio::test]
    async fn register_rejects_missing_fields_and_short_password() {
        let ctx = TestContext::new().await;
        let err = register(
            &ctx.store,
            &ctx.auth,
            RegisterRequest {
                username: Some("alice".into()),
                email: Some("  ".into()),
                password: Some("secret1".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(message(err), "All fields are required");

        let err = register(
            &ctx.store,
            &ctx.auth,
            register_request("alice", "alice@example.com", "12345"),
        )
        .await
        .unwrap_err();
        assert_eq!(message(err), "Password must be at least 6 characters");

        let err = register(
            &ctx.store,
            &ctx.auth,
            register_request("alice", "not-an-email", "secret1"),
        )
        .await
        .unwrap_err();
        assert_eq!(message(err), "Please provide a valid email");
    }

    #[tokio::test]
    async fn duplicate_email_and_username_conflict() {
        let ctx = TestContext::new().await;
        ctx.register("alice", "secret1").await;

        let err = register(
            &ctx.store,
            &ctx.auth,
            register_request("alice2", "alice@example.com", "secret1"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(message(err), "Email already registered");

        let err = register(
            &ctx.store,
            &ctx.auth,
            register_request("alice", "other@example.com", "secret1"),
        )
        .await
        .unwrap_err();
        assert_eq!(message(err), "Username already taken");
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let ctx = TestContext::new().await;
        ctx.register("alice", "secret1").await;

        let wrong_password = login(
            &ctx.store,
            &ctx.auth,
            LoginRequest {
                email: Some("alice@example.com".into()),
                password: Some("nope-nope".into()),
            },
        )
        .await
        .unwrap_err();
        let unknown_email = login(
            &ctx.store,
            &ctx.auth,
            LoginRequest {
                email: Some("ghost@example.com".into()),
                password: Some("secret1".into()),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(wrong_password, AppError::Auth(_)));
        assert!(matches!(unknown_email, AppError::Auth(_)));
        assert_eq!(message(wrong_password), message(unknown_email));

        let session = login(
            &ctx.store,
            &ctx.auth,
            LoginRequest {
                email: Some("alice@example.com".into()),
                password: Some("secret1".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(session.message, "Login successful");
        assert_eq!(session.user.username, "alice");
    }

    #[tokio::test]
    async fn current_user_provisions_missing_channel() {
        let ctx = TestContext::new().await;
        let user = ctx.insert_bare_user("carol").await;
        assert!(ctx.store.find_channel_by_owner(&user.id).await.unwrap().is_none());

        let profile = current_user(&ctx.store, &user.id).await.unwrap();
        assert_eq!(profile.user.channel.channel_name, "carol's Channel");

        let again = current_user(&ctx.store, &user.id).await.unwrap();
        assert_eq!(again.user.channel.id, profile.user.channel.id);

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["user"]["username"], "carol");
        assert_eq!(value["user"]["channel"]["channelName"], "carol's Channel");
        assert!(value["user"].get("password").is_none());
        assert!(value["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn profile_update_renames_channel_and_rejects_taken_name() {
        let ctx = TestContext::new().await;
        let alice = ctx.register("alice", "secret1").await;
        ctx.register("bob", "secret1").await;

        let updated = update_profile(
            &ctx.store,
            &alice.id,
            ProfileUpdate {
                username: Some("alicia".into()),
                avatar: Some("   ".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.user.username, "alicia");
        assert_eq!(updated.user.avatar, DEFAULT_AVATAR);

        let channel = ctx
            .store
            .find_channel_by_owner(&alice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel.channel_name, "alicia's Channel");

        let err = update_profile(
            &ctx.store,
            &alice.id,
            ProfileUpdate {
                username: Some("bob".into()),
                avatar: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
