//! End-to-end tests for the account flows: registration, email
//! confirmation, login and password reset.
//!
//! These run the real services over the in-memory store, with mailers
//! that record or fail on demand, so the full protocol is exercised
//! without a database or an SMTP server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use expense_desk::config::Config;
use expense_desk::domain::{NewIdentity, VerificationPurpose};
use expense_desk::errors::{AppError, AppResult};
use expense_desk::infra::{Mailer, MemoryStore};
use expense_desk::services::Services;

// =============================================================================
// Mailer doubles
// =============================================================================

#[derive(Clone)]
struct SentMail {
    to: String,
    subject: String,
    body: String,
}

/// Records every message instead of sending it.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Fails every dispatch.
struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> AppResult<()> {
        Err(AppError::DispatchFailed)
    }
}

/// Holds every dispatch until the gate is released, then records it.
struct GatedMailer {
    gate: Arc<Notify>,
    inner: RecordingMailer,
}

#[async_trait]
impl Mailer for GatedMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        self.gate.notified().await;
        self.inner.send(to, subject, body).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

const PASSWORD: &str = "SecurePass123!";
const ORIGIN: &str = "https://app.example.com";

fn test_config() -> Config {
    Config::with_jwt(
        "integration-test-secret-32-chars!!!",
        "TestIssuer",
        "TestAudience",
        60,
    )
}

fn services_over(store: &MemoryStore, mailer: Arc<dyn Mailer>) -> Services {
    Services::new(Arc::new(store.clone()), mailer, test_config())
}

fn profile(email: &str) -> NewIdentity {
    NewIdentity::new(email, "Ada", "Lovelace")
}

/// Register and return (id, staged confirmation code).
async fn register(store: &MemoryStore, mailer: Arc<dyn Mailer>, email: &str) -> (Uuid, String) {
    let services = services_over(store, mailer);
    let outcome = services
        .accounts
        .register(profile(email), PASSWORD, ORIGIN)
        .await
        .expect("registration should succeed");

    let tokens = store.verification_tokens_for(outcome.id).await;
    let code = tokens
        .iter()
        .find(|t| t.purpose == VerificationPurpose::EmailConfirmation)
        .expect("confirmation code should be staged")
        .code
        .clone();
    (outcome.id, code)
}

/// Reset mail goes out on a detached task; poll until it lands.
async fn wait_for_mail(mailer: &RecordingMailer, subject: &str) -> SentMail {
    for _ in 0..200 {
        if let Some(mail) = mailer.sent().into_iter().find(|m| m.subject == subject) {
            return mail;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no '{subject}' mail was dispatched");
}

/// Poll for the reset code staged by a forgot-password request.
async fn staged_reset_code(store: &MemoryStore, user_id: Uuid) -> String {
    for _ in 0..200 {
        let staged = store
            .verification_tokens_for(user_id)
            .await
            .into_iter()
            .find(|t| t.purpose == VerificationPurpose::PasswordReset);
        if let Some(token) = staged {
            return token.code;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("reset code was not staged");
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_creates_unactivated_identity_and_mails_link() {
    let store = MemoryStore::new();
    let mailer = Arc::new(RecordingMailer::default());
    let services = services_over(&store, mailer.clone());

    let outcome = services
        .accounts
        .register(profile("Ada@Example.com"), PASSWORD, ORIGIN)
        .await
        .unwrap();
    assert!(outcome.message.contains("check your email"));

    // Email is normalized, account starts unconfirmed with the default role
    let identity = services.users.get_user(outcome.id).await.unwrap();
    assert_eq!(identity.email, "ada@example.com");
    assert!(!identity.activated);
    assert_eq!(identity.roles.len(), 1);
    assert_eq!(identity.full_name, "Ada Lovelace");

    // The mail carries the confirmation link with the staged code
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert_eq!(sent[0].subject, "Confirm your account");

    let tokens = store.verification_tokens_for(outcome.id).await;
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].purpose, VerificationPurpose::EmailConfirmation);
    let expected_link = format!(
        "{}/api/account/confirm-email?userId={}&code={}",
        ORIGIN, outcome.id, tokens[0].code
    );
    assert!(sent[0].body.contains(&expected_link));
}

#[tokio::test]
async fn test_register_rejects_duplicate_email() {
    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    register(&store, mailer.clone(), "ada@example.com").await;

    let services = services_over(&store, mailer);
    let result = services
        .accounts
        .register(profile("Ada@Example.COM"), PASSWORD, ORIGIN)
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn test_simultaneous_duplicate_registrations_leave_one_identity() {
    let store = MemoryStore::new();
    let first = services_over(&store, Arc::new(RecordingMailer::default()));
    let second = services_over(&store, Arc::new(RecordingMailer::default()));

    let (a, b) = tokio::join!(
        first
            .accounts
            .register(profile("ada@example.com"), PASSWORD, ORIGIN),
        second
            .accounts
            .register(profile("ada@example.com"), PASSWORD, ORIGIN),
    );

    // The store's uniqueness constraint arbitrates: one wins, the loser
    // sees the same validation error a sequential duplicate would
    assert_eq!(a.is_ok() as usize + b.is_ok() as usize, 1);
    let loser = if a.is_err() { a } else { b };
    assert!(matches!(loser, Err(AppError::Validation(_))));
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn test_failed_mail_dispatch_rolls_back_registration() {
    let store = MemoryStore::new();
    let services = services_over(&store, Arc::new(FailingMailer));

    let result = services
        .accounts
        .register(profile("ada@example.com"), PASSWORD, ORIGIN)
        .await;
    assert!(matches!(result, Err(AppError::DispatchFailed)));

    // Nothing survives the rollback
    assert_eq!(store.user_count().await, 0);

    // The same email registers cleanly once mail works again
    let retry = services_over(&store, Arc::new(RecordingMailer::default()));
    let outcome = retry
        .accounts
        .register(profile("ada@example.com"), PASSWORD, ORIGIN)
        .await;
    assert!(outcome.is_ok());
}

// =============================================================================
// Email confirmation
// =============================================================================

#[tokio::test]
async fn test_confirm_email_activates_account_exactly_once() {
    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    let (id, code) = register(&store, mailer.clone(), "ada@example.com").await;
    let services = services_over(&store, mailer);

    // Login is refused until the email is confirmed
    let early = services
        .auth
        .login("ada@example.com", PASSWORD, false, "10.0.0.1")
        .await;
    assert!(matches!(early, Err(AppError::AccountNotActivated)));

    services.accounts.confirm_email(id, &code).await.unwrap();

    let login = services
        .auth
        .login("ada@example.com", PASSWORD, false, "10.0.0.1")
        .await
        .unwrap();
    assert_eq!(login.id, id);

    // The code is burned; a replay is an invalid token
    let replay = services.accounts.confirm_email(id, &code).await;
    assert!(matches!(replay, Err(AppError::InvalidToken)));
}

#[tokio::test]
async fn test_confirm_email_rejects_wrong_user_without_burning_code() {
    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    let (id, code) = register(&store, mailer.clone(), "ada@example.com").await;
    let services = services_over(&store, mailer);

    let wrong_user = services.accounts.confirm_email(Uuid::new_v4(), &code).await;
    assert!(matches!(wrong_user, Err(AppError::InvalidToken)));

    // The rightful owner can still redeem it
    assert!(services.accounts.confirm_email(id, &code).await.is_ok());
}

#[tokio::test]
async fn test_confirm_email_rejects_malformed_codes() {
    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    let (id, _) = register(&store, mailer.clone(), "ada@example.com").await;
    let services = services_over(&store, mailer);

    for bad in ["", "zz", "not-hex-at-all!", "abcdef"] {
        let result = services.accounts.confirm_email(id, bad).await;
        assert!(matches!(result, Err(AppError::InvalidToken)), "{:?}", bad);
    }
}

#[tokio::test]
async fn test_expired_code_is_rejected_and_burned() {
    use chrono::{Duration, Utc};
    use expense_desk::domain::VerificationToken;
    use expense_desk::infra::repositories::VerificationTokenRepository;

    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    let (id, _) = register(&store, mailer.clone(), "ada@example.com").await;
    let services = services_over(&store, mailer);

    // Stage a code that expired an hour ago
    let expired = VerificationToken {
        code: hex::encode([7u8; 32]),
        user_id: id,
        purpose: VerificationPurpose::EmailConfirmation,
        created_at: Utc::now() - Duration::hours(25),
        expires_at: Utc::now() - Duration::hours(1),
    };
    store.insert(&expired).await.unwrap();

    let result = services.accounts.confirm_email(id, &expired.code).await;
    assert!(matches!(result, Err(AppError::ExpiredToken)));

    // The expired row is gone; a retry no longer matches anything
    let retry = services.accounts.confirm_email(id, &expired.code).await;
    assert!(matches!(retry, Err(AppError::InvalidToken)));
}

// =============================================================================
// Password reset
// =============================================================================

#[tokio::test]
async fn test_forgot_password_response_is_uniform() {
    let store = MemoryStore::new();
    let mailer = Arc::new(RecordingMailer::default());
    let (id, code) = register(&store, mailer.clone(), "ada@example.com").await;
    let services = services_over(&store, mailer.clone());
    services.accounts.confirm_email(id, &code).await.unwrap();

    let known = services
        .accounts
        .forgot_password("ada@example.com", ORIGIN)
        .await
        .unwrap();
    let unknown = services
        .accounts
        .forgot_password("nobody@example.com", ORIGIN)
        .await
        .unwrap();

    // Same message either way; only the known address gets mail
    assert_eq!(known, unknown);
    let mail = wait_for_mail(&mailer, "Reset your password").await;
    assert_eq!(mail.to, "ada@example.com");
    assert!(mail.body.contains("/api/account/reset-password"));
    let reset_mails = mailer
        .sent()
        .into_iter()
        .filter(|m| m.subject == "Reset your password")
        .count();
    assert_eq!(reset_mails, 1);
}

#[tokio::test]
async fn test_forgot_password_replies_before_dispatch_completes() {
    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    let (id, code) = register(&store, mailer.clone(), "ada@example.com").await;
    services_over(&store, mailer)
        .accounts
        .confirm_email(id, &code)
        .await
        .unwrap();

    let gate = Arc::new(Notify::new());
    let gated = Arc::new(GatedMailer {
        gate: gate.clone(),
        inner: RecordingMailer::default(),
    });
    let services = services_over(&store, gated.clone());

    // The reply arrives while the mail dispatch is still held at the
    // gate: a caller cannot time the difference between a known and an
    // unknown address.
    let known = tokio::time::timeout(
        Duration::from_millis(500),
        services.accounts.forgot_password("ada@example.com", ORIGIN),
    )
    .await
    .expect("reply must not wait on the mail dispatch")
    .unwrap();
    assert!(gated.inner.sent().is_empty());

    let unknown = services
        .accounts
        .forgot_password("nobody@example.com", ORIGIN)
        .await
        .unwrap();
    assert_eq!(known, unknown);

    // Once released, the staged mail still goes out
    gate.notify_one();
    let mail = wait_for_mail(&gated.inner, "Reset your password").await;
    assert_eq!(mail.to, "ada@example.com");
}

#[tokio::test]
async fn test_reset_link_percent_encodes_the_email() {
    let store = MemoryStore::new();
    let mailer = Arc::new(RecordingMailer::default());
    let (id, code) = register(&store, mailer.clone(), "ada+desk@example.com").await;
    let services = services_over(&store, mailer.clone());
    services.accounts.confirm_email(id, &code).await.unwrap();

    services
        .accounts
        .forgot_password("ada+desk@example.com", ORIGIN)
        .await
        .unwrap();

    // A '+' in the local part must survive a query-string round trip
    let mail = wait_for_mail(&mailer, "Reset your password").await;
    assert!(mail.body.contains("email=ada%2Bdesk%40example.com&code="));
}

#[tokio::test]
async fn test_reset_password_swaps_credentials_exactly_once() {
    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    let (id, code) = register(&store, mailer.clone(), "ada@example.com").await;
    let services = services_over(&store, mailer);
    services.accounts.confirm_email(id, &code).await.unwrap();

    services
        .accounts
        .forgot_password("ada@example.com", ORIGIN)
        .await
        .unwrap();
    let reset_code = staged_reset_code(&store, id).await;

    let new_password = "EvenMoreSecure456!";
    services
        .accounts
        .reset_password("ada@example.com", &reset_code, new_password)
        .await
        .unwrap();

    // Old credentials are dead, new ones work
    let old = services
        .auth
        .login("ada@example.com", PASSWORD, false, "10.0.0.1")
        .await;
    assert!(matches!(old, Err(AppError::InvalidCredentials)));
    assert!(services
        .auth
        .login("ada@example.com", new_password, false, "10.0.0.1")
        .await
        .is_ok());

    // The reset code is single-use
    let replay = services
        .accounts
        .reset_password("ada@example.com", &reset_code, "YetAnother789!")
        .await;
    assert!(matches!(replay, Err(AppError::InvalidToken)));
}

#[tokio::test]
async fn test_reset_password_rejects_mismatched_owner() {
    let store = MemoryStore::new();
    let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
    let (ada_id, ada_code) = register(&store, mailer.clone(), "ada@example.com").await;
    let (_, grace_code) = register(&store, mailer.clone(), "grace@example.com").await;
    let services = services_over(&store, mailer);
    services
        .accounts
        .confirm_email(ada_id, &ada_code)
        .await
        .unwrap();

    services
        .accounts
        .forgot_password("ada@example.com", ORIGIN)
        .await
        .unwrap();
    let reset_code = staged_reset_code(&store, ada_id).await;

    // Another account cannot redeem Ada's code
    let cross = services
        .accounts
        .reset_password("grace@example.com", &reset_code, "Hijacked123!")
        .await;
    assert!(matches!(cross, Err(AppError::InvalidToken)));

    // An unregistered address is reported as unknown
    let unknown = services
        .accounts
        .reset_password("nobody@example.com", &reset_code, "Hijacked123!")
        .await;
    assert!(matches!(unknown, Err(AppError::UnknownAccount)));

    // A confirmation code is not a reset code, even for its owner
    let wrong_purpose = services
        .accounts
        .reset_password("grace@example.com", &grace_code, "Hijacked123!")
        .await;
    assert!(matches!(wrong_purpose, Err(AppError::InvalidToken)));
}
