//! Fixtures shared by the unit tests.

use tempfile::TempDir;

use crate::{
    accounts::{self, RegisterRequest},
    auth::Authenticator,
    models::{DEFAULT_AVATAR, UserRecord, new_id, timestamp_now},
    store::Store,
    videos::{self, UploadRequest},
};

pub struct TestContext {
    _dir: TempDir,
    pub store: Store,
    pub auth: Authenticator,
}

pub fn register_request(username: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: Some(username.into()),
        email: Some(email.into()),
        password: Some(password.into()),
    }
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).await.unwrap();
        Self {
            _dir: dir,
            store,
            auth: Authenticator::new("test-secret", 4),
        }
    }

    /// Registers `{name}@example.com` and returns the stored user.
    pub async fn register(&self, name: &str, password: &str) -> UserRecord {
        let session = accounts::register(
            &self.store,
            &self.auth,
            register_request(name, &format!("{name}@example.com"), password),
        )
        .await
        .unwrap();
        self.store.find_user(&session.user.id).await.unwrap().unwrap()
    }

    /// A user row without a channel, as left behind by older data.
    pub async fn insert_bare_user(&self, name: &str) -> UserRecord {
        let user = UserRecord {
            id: new_id(),
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "unused".into(),
            avatar: DEFAULT_AVATAR.into(),
            created_at: timestamp_now(),
            updated_at: timestamp_now(),
        };
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn upload(&self, user: &UserRecord, title: &str) -> String {
        videos::upload(
            &self.store,
            user,
            UploadRequest {
                title: Some(title.into()),
                description: Some("description".into()),
                ..UploadRequest::default()
            },
        )
        .await
        .unwrap()
        .video
        .id
    }
}
