//! AuthBridge (spec.md §4.8, C8): registration, confirmation, login, and
//! refresh-token rotation. Grounded on the teacher's `routes/auth.rs`
//! handlers, generalized into a transport-independent service so both the
//! HTTP routes and tests can drive it directly. Email delivery is an
//! external collaborator (spec.md §1 non-goal) reached through the
//! `MailCollaborator` trait rather than sent inline.

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::{self, TokenKind};
use crate::store::Store;
use crate::types::User;
use crate::validation::{fold_case, validate_email, validate_name, validate_password};
use crate::{Error, Result};

#[async_trait]
pub trait MailCollaborator: Send + Sync {
    async fn send_confirmation(&self, to_email: &str, token: &str);
    async fn send_password_reset(&self, to_email: &str, token: &str);
}

/// Default collaborator: logs what would have been sent. Good enough for a
/// standalone deployment or test harness; a real deployment wires in an
/// actual mail provider behind the same trait.
pub struct LoggingMailCollaborator;

#[async_trait]
impl MailCollaborator for LoggingMailCollaborator {
    async fn send_confirmation(&self, to_email: &str, token: &str) {
        tracing::info!(to = to_email, token, "confirmation email (logged, not sent)");
    }

    async fn send_password_reset(&self, to_email: &str, token: &str) {
        tracing::info!(to = to_email, token, "password reset email (logged, not sent)");
    }
}

pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthBridge<'a> {
    store: &'a Store,
    mail: &'a dyn MailCollaborator,
    access_token_secret: &'a str,
    refresh_token_secret: &'a str,
    access_token_lifetime_minutes: i64,
    refresh_token_lifetime_days: i64,
}

impl<'a> AuthBridge<'a> {
    pub fn new(
        store: &'a Store,
        mail: &'a dyn MailCollaborator,
        access_token_secret: &'a str,
        refresh_token_secret: &'a str,
        access_token_lifetime_minutes: i64,
        refresh_token_lifetime_days: i64,
    ) -> Self {
        AuthBridge {
            store,
            mail,
            access_token_secret,
            refresh_token_secret,
            access_token_lifetime_minutes,
            refresh_token_lifetime_days,
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        validate_name(name).map_err(Error::validation)?;
        validate_email(email).map_err(Error::validation)?;
        validate_password(password).map_err(Error::validation)?;

        let email = fold_case(email);
        let password_hash = auth::hash_password(password)?;
        let confirmation_token = auth::generate_token();

        let user = self.store.create_user(name, &email, &password_hash, &confirmation_token).await?;
        self.mail.send_confirmation(&user.email, &confirmation_token).await;
        Ok(user)
    }

    pub async fn confirm(&self, token: &str) -> Result<User> {
        self.store.confirm_user(token).await?.ok_or_else(|| Error::NotFound("confirmation token".into()))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair)> {
        let email = fold_case(email);
        let user = self.store.get_user_by_email(&email).await?.ok_or(Error::Unauthenticated)?;

        if !auth::verify_password(password, &user.password_hash)? {
            return Err(Error::Unauthenticated);
        }
        if !user.confirmed {
            return Err(Error::Forbidden);
        }

        let tokens = self.issue_tokens(user.id).await?;
        Ok((user, tokens))
    }

    /// Verifies and rotates a refresh token. The presented token's `jti` must
    /// match the one currently on record for the user; a second presentation
    /// of an already-rotated token is a replay and fails (spec.md §4.8, §8).
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = auth::verify_token(refresh_token, self.refresh_token_secret, TokenKind::Refresh)?;
        let user = self.store.get_user(claims.sub).await?.ok_or(Error::Unauthenticated)?;

        if user.refresh_token.as_deref() != claims.jti.as_deref() {
            return Err(Error::Unauthenticated);
        }

        self.issue_tokens(user.id).await
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<()> {
        self.store.set_refresh_jti(user_id, None).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = fold_case(email);
        let Some(user) = self.store.get_user_by_email(&email).await? else {
            // Do not reveal whether the address is registered.
            return Ok(());
        };
        let token = auth::generate_token();
        self.store.set_reset_token(user.id, &token).await?;
        self.mail.send_password_reset(&user.email, &token).await;
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<User> {
        validate_password(new_password).map_err(Error::validation)?;
        let password_hash = auth::hash_password(new_password)?;
        self.store
            .consume_reset_token(token, &password_hash)
            .await?
            .ok_or_else(|| Error::NotFound("reset token".into()))
    }

    async fn issue_tokens(&self, user_id: Uuid) -> Result<TokenPair> {
        let access_token = auth::create_access_token(user_id, self.access_token_secret, self.access_token_lifetime_minutes)?;
        let (refresh_token, jti) = auth::create_refresh_token(user_id, self.refresh_token_secret, self.refresh_token_lifetime_days)?;
        self.store.set_refresh_jti(user_id, Some(jti)).await?;
        Ok(TokenPair { access_token, refresh_token })
    }
}
