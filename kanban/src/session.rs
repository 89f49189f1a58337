//! Explicit session context: bearer token plus a load-once profile cache.
//!
//! A [`Session`] is shared (`Arc`) between the REST client, the mutation
//! gateway and the lock channel. Identity is never read from a global.

use parking_lot::RwLock;

use kanban_proto::api::{Login, Register, UpdateProfile, User};
use kanban_proto::board::UserId;

use crate::api::{ApiError, UserApi};

/// Authentication state for one logged-in user.
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<String>>,
    user_id: RwLock<Option<UserId>>,
    user: RwLock<Option<User>>,
}

impl Session {
    /// Creates an anonymous session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session from a previously issued token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    /// Returns a copy of the current bearer token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Replaces the bearer token (after login or refresh).
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Whether a token is present. Says nothing about its validity.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    /// Id of the logged-in user, known after login or profile load.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id.read().clone()
    }

    /// Sets the user id directly, e.g. from configuration.
    pub fn set_user_id(&self, user_id: UserId) {
        *self.user_id.write() = Some(user_id);
    }

    /// Cached profile, if [`load_user`](Self::load_user) has run.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    /// Logs in and stores the issued token and user id.
    ///
    /// # Errors
    ///
    /// Returns the api error; the session is left unchanged.
    pub async fn login(
        &self,
        api: &impl UserApi,
        email: &str,
        password: &str,
    ) -> Result<UserId, ApiError> {
        let auth = api
            .login(&Login {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.invalidate();
        self.set_token(auth.token);
        self.set_user_id(auth.user_id.clone());
        tracing::info!(user_id = %auth.user_id, "logged in");
        Ok(auth.user_id)
    }

    /// Registers a new account and logs it in.
    ///
    /// # Errors
    ///
    /// Returns the api error (e.g. e-mail already taken).
    pub async fn register(&self, api: &impl UserApi, request: &Register) -> Result<UserId, ApiError> {
        let auth = api.register(request).await?;
        self.invalidate();
        self.set_token(auth.token);
        self.set_user_id(auth.user_id.clone());
        tracing::info!(user_id = %auth.user_id, "registered");
        Ok(auth.user_id)
    }

    /// Fetches the profile once and caches it for later calls.
    ///
    /// # Errors
    ///
    /// Returns the api error when the profile is not cached and the fetch
    /// fails.
    pub async fn load_user(&self, api: &impl UserApi) -> Result<User, ApiError> {
        if let Some(user) = self.user() {
            return Ok(user);
        }
        let user = api.profile().await?;
        *self.user_id.write() = Some(user.id.clone());
        *self.user.write() = Some(user.clone());
        tracing::debug!(user_id = %user.id, "profile cached");
        Ok(user)
    }

    /// Saves a new name and e-mail and replaces the cached profile with the
    /// server's answer.
    ///
    /// # Errors
    ///
    /// Returns the api error; the cache keeps the previous profile.
    pub async fn update_profile(
        &self,
        api: &impl UserApi,
        username: &str,
        email: &str,
    ) -> Result<User, ApiError> {
        let user = api
            .update_profile(&UpdateProfile {
                username: username.trim().to_string(),
                email: email.trim().to_string(),
            })
            .await?;
        *self.user_id.write() = Some(user.id.clone());
        *self.user.write() = Some(user.clone());
        tracing::info!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    /// Drops the cached profile so the next [`load_user`](Self::load_user)
    /// fetches it again.
    pub fn invalidate(&self) {
        *self.user.write() = None;
    }

    /// Forgets everything: token, id and profile.
    pub fn clear(&self) {
        *self.token.write() = None;
        *self.user_id.write() = None;
        self.invalidate();
    }

    /// Local logout.
    pub fn logout(&self) {
        self.clear();
        tracing::info!("logged out");
    }
}
