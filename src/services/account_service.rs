//! Registration, email confirmation and password reset flows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::{Config, CONFIRM_EMAIL_ROUTE, RESET_PASSWORD_ROUTE};
use crate::domain::{
    decode_code, Identity, NewIdentity, Password, Role, VerificationPurpose, VerificationToken,
};
use crate::errors::{AppError, AppResult};
use crate::infra::{Mailer, UnitOfWork};

/// Outcome of a successful registration.
#[derive(Debug, Serialize)]
pub struct RegisterOutcome {
    pub id: Uuid,
    pub message: String,
}

/// Account lifecycle operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Create an identity and send its confirmation link. Atomic: a
    /// failed or timed-out mail dispatch rolls the whole registration
    /// back, so the email can be retried immediately.
    async fn register(
        &self,
        profile: NewIdentity,
        password: &str,
        origin: &str,
    ) -> AppResult<RegisterOutcome>;

    /// Redeem a confirmation code and activate the account. Each code
    /// works exactly once.
    async fn confirm_email(&self, user_id: Uuid, code: &str) -> AppResult<String>;

    /// Reply uniformly, then stage a reset code and mail its link on a
    /// detached task if the address is registered. Neither the response
    /// body nor its latency depends on whether the account exists.
    async fn forgot_password(&self, email: &str, origin: &str) -> AppResult<String>;

    /// Redeem a reset code and install a new password.
    async fn reset_password(&self, email: &str, code: &str, new_password: &str)
        -> AppResult<String>;
}

/// Production implementation over the persistent store and a mailer.
pub struct AccountManager<U: UnitOfWork> {
    uow: Arc<U>,
    mailer: Arc<dyn Mailer>,
    config: Config,
}

impl<U: UnitOfWork> AccountManager<U> {
    pub fn new(uow: Arc<U>, mailer: Arc<dyn Mailer>, config: Config) -> Self {
        Self {
            uow,
            mailer,
            config,
        }
    }
}

#[async_trait]
impl<U: UnitOfWork + 'static> AccountService for AccountManager<U> {
    async fn register(
        &self,
        profile: NewIdentity,
        password: &str,
        origin: &str,
    ) -> AppResult<RegisterOutcome> {
        let password_hash = Password::new(password)?.into_string();
        let mailer = self.mailer.clone();
        let mail_timeout = self.config.mail_timeout;
        let origin = origin.trim_end_matches('/').to_string();

        let identity = self
            .uow
            .transaction(move |ctx| {
                Box::pin(async move {
                    let identity = ctx.create_identity(&profile, &password_hash).await?;
                    ctx.assign_role(identity.id, Role::Regular).await?;

                    let token = VerificationToken::issue(
                        identity.id,
                        VerificationPurpose::EmailConfirmation,
                    );
                    ctx.insert_verification(&token).await?;

                    let link = format!(
                        "{}{}?userId={}&code={}",
                        origin, CONFIRM_EMAIL_ROUTE, identity.id, token.code
                    );
                    let body = format!(
                        "<p>Welcome, {}!</p>\
                         <p>Please confirm your account by visiting \
                         <a href=\"{link}\">{link}</a></p>",
                        identity.first_name
                    );

                    // Dispatch inside the transaction: if the mail
                    // cannot leave, the registration must not exist.
                    match timeout(
                        mail_timeout,
                        mailer.send(&identity.email, "Confirm your account", &body),
                    )
                    .await
                    {
                        Ok(Ok(())) => Ok(identity),
                        Ok(Err(err)) => {
                            tracing::error!(error = %err, "confirmation mail failed, rolling registration back");
                            Err(AppError::DispatchFailed)
                        }
                        Err(_) => {
                            tracing::error!("confirmation mail timed out, rolling registration back");
                            Err(AppError::DispatchFailed)
                        }
                    }
                })
            })
            .await?;

        tracing::info!(user_id = %identity.id, "identity registered");
        Ok(RegisterOutcome {
            id: identity.id,
            message: "Registration successful! Please check your email to confirm your account."
                .to_string(),
        })
    }

    async fn confirm_email(&self, user_id: Uuid, code: &str) -> AppResult<String> {
        let code = decode_code(code)?;
        let tokens = self.uow.verification_tokens();

        let token = tokens.find(&code).await?.ok_or(AppError::InvalidToken)?;
        if token.user_id != user_id || token.purpose != VerificationPurpose::EmailConfirmation {
            return Err(AppError::InvalidToken);
        }
        if token.is_expired(Utc::now()) {
            // Expired codes are dead; drop the row so it cannot linger
            tokens.consume(&code).await?;
            return Err(AppError::ExpiredToken);
        }
        // The delete arbitrates racing redemptions: only the caller
        // that removes the row proceeds.
        if !tokens.consume(&code).await? {
            return Err(AppError::InvalidToken);
        }

        self.uow.users().set_activated(user_id).await?;
        tracing::info!(user_id = %user_id, "email confirmed");
        Ok("Email confirmed. You can now log in.".to_string())
    }

    async fn forgot_password(&self, email: &str, origin: &str) -> AppResult<String> {
        const RESPONSE: &str =
            "If that email address is registered, a password reset link has been sent.";

        // Known and unknown addresses must be indistinguishable at this
        // boundary, in the response body and in how long it takes to
        // arrive. The staging and mail dispatch therefore run after the
        // reply, on a detached task.
        if let Some(identity) = self.uow.users().find_by_email(email).await? {
            let uow = self.uow.clone();
            let mailer = self.mailer.clone();
            let mail_timeout = self.config.mail_timeout;
            let origin = origin.trim_end_matches('/').to_string();
            tokio::spawn(async move {
                dispatch_reset_link(uow, mailer, mail_timeout, identity, &origin).await;
            });
        }

        Ok(RESPONSE.to_string())
    }

    async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> AppResult<String> {
        let identity = self
            .uow
            .users()
            .find_by_email(email)
            .await?
            .ok_or(AppError::UnknownAccount)?;

        let code = decode_code(code)?;
        let tokens = self.uow.verification_tokens();

        let token = tokens.find(&code).await?.ok_or(AppError::InvalidToken)?;
        if token.user_id != identity.id || token.purpose != VerificationPurpose::PasswordReset {
            return Err(AppError::InvalidToken);
        }
        if token.is_expired(Utc::now()) {
            tokens.consume(&code).await?;
            return Err(AppError::ExpiredToken);
        }

        // Validate the new password before burning the code
        let password_hash = Password::new(new_password)?.into_string();

        if !tokens.consume(&code).await? {
            return Err(AppError::InvalidToken);
        }
        self.uow
            .users()
            .update_password(identity.id, password_hash)
            .await?;

        tracing::info!(user_id = %identity.id, "password reset");
        Ok(format!("Password reset for {}.", identity.email))
    }
}

/// Stage a reset code and mail its link. Runs detached from the request
/// that triggered it; failures are logged, never surfaced to the caller.
async fn dispatch_reset_link<U: UnitOfWork>(
    uow: Arc<U>,
    mailer: Arc<dyn Mailer>,
    mail_timeout: Duration,
    identity: Identity,
    origin: &str,
) {
    let token = VerificationToken::issue(identity.id, VerificationPurpose::PasswordReset);
    if let Err(err) = uow.verification_tokens().insert(&token).await {
        tracing::error!(error = %err, "could not stage password reset code");
        return;
    }

    let link = format!(
        "{}{}?email={}&code={}",
        origin,
        RESET_PASSWORD_ROUTE,
        // The local part may hold '+' and friends; keep the link intact
        urlencoding::encode(&identity.email),
        token.code
    );
    let body = format!(
        "<p>You requested a password reset.</p>\
         <p>Visit <a href=\"{link}\">{link}</a> to choose a new password.</p>"
    );

    match timeout(
        mail_timeout,
        mailer.send(&identity.email, "Reset your password", &body),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(error = %err, "password reset mail failed"),
        Err(_) => tracing::error!("password reset mail timed out"),
    }
}
