//! Auth Orchestrator (C6).
//!
//! Drives the login, register, refresh, logout, change-password, and
//! password-reset state machines exactly as laid out in spec §4.6. Every
//! method either commits every side effect or none — no partial writes are
//! left behind on an early return.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::audit::AuditJournal;
use crate::config::Config;
use crate::hasher::PasswordHasher;
use crate::model::AuditEvent;
use crate::principal::PrincipalResolver;
use crate::ratelimit::{Bucket, RateLimiter};
use crate::repository::UserRepository;
use crate::reset_store::ResetTokenStore;
use crate::session_store::SessionStore;
use crate::token::{TokenSigner, TokenType};

const REFRESH_SECRET_LEN_BYTES: usize = 32;
const COMMON_SEQUENCES: &[&str] = &["123456", "abcdef", "qwerty", "password", "admin", "user"];

#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub access_ttl_secs: i64,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
}

/// Enforced on any password-accepting transition (spec §4.6, final
/// paragraph): length, character classes, a small dictionary of common
/// sequences, and a cap on identical-character runs.
pub fn validate_password_policy(password: &str) -> crate::error::Result<()> {
    if password.chars().count() < 8 || password.chars().count() > 128 {
        return Err(crate::error::Error::Validation("password must be 8-128 characters".into()));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c));

    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(crate::error::Error::Validation(
            "password must contain an uppercase letter, a lowercase letter, a digit, and a symbol".into(),
        ));
    }

    let lower = password.to_ascii_lowercase();
    if COMMON_SEQUENCES.iter().any(|seq| lower.contains(seq)) {
        return Err(crate::error::Error::Validation("password contains a common sequence".into()));
    }

    let mut run_len = 1;
    let chars: Vec<char> = password.chars().collect();
    for window in chars.windows(2) {
        if window[0] == window[1] {
            run_len += 1;
            if run_len > 2 {
                return Err(crate::error::Error::Validation(
                    "password must not repeat the same character more than twice in a row".into(),
                ));
            }
        } else {
            run_len = 1;
        }
    }

    Ok(())
}

fn hash_refresh_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_secret() -> String {
    let mut raw = [0u8; REFRESH_SECRET_LEN_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    let encoded = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, raw);
    raw.zeroize();
    encoded
}

pub struct AuthOrchestrator {
    users: Arc<dyn UserRepository>,
    hasher: Arc<PasswordHasher>,
    signer: Arc<TokenSigner>,
    sessions: Arc<SessionStore>,
    principals: Arc<PrincipalResolver>,
    reset_tokens: Arc<ResetTokenStore>,
    rate_limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditJournal>,
    access_ttl_secs: i64,
    refresh_ttl: ChronoDuration,
    reset_ttl: ChronoDuration,
    /// A real, fixed Argon2id hash with no corresponding account, verified
    /// against on the unknown-email login path so it burns the same CPU
    /// time as the known-email/wrong-password path (spec §8 testable
    /// property 8). Computed once at construction, never at request time.
    dummy_password_hash: String,
}

impl AuthOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        users: Arc<dyn UserRepository>,
        hasher: Arc<PasswordHasher>,
        signer: Arc<TokenSigner>,
        sessions: Arc<SessionStore>,
        principals: Arc<PrincipalResolver>,
        reset_tokens: Arc<ResetTokenStore>,
        rate_limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditJournal>,
    ) -> Self {
        let dummy_password_hash = hasher
            .hash("no-account-holds-this-password")
            .unwrap_or_else(|_| "$argon2id$v=19$m=65536,t=3,p=4$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string());

        Self {
            users,
            hasher,
            signer,
            sessions,
            principals,
            reset_tokens,
            rate_limiter,
            audit,
            access_ttl_secs: config.access_ttl.as_secs() as i64,
            refresh_ttl: ChronoDuration::seconds(config.refresh_ttl.as_secs() as i64),
            reset_ttl: ChronoDuration::seconds(config.reset_ttl.as_secs() as i64),
            dummy_password_hash,
        }
    }

    async fn emit(&self, action: &str, success: bool, actor: Option<Uuid>, session: Option<Uuid>, detail: Option<&str>, ip: &str, ua: &str) {
        let mut builder = AuditEvent::builder(action).ip_address(ip).user_agent(ua);
        if let Some(user_id) = actor {
            builder = builder.actor(user_id);
        }
        if let Some(session_id) = session {
            builder = builder.session(session_id);
        }
        if let Some(detail) = detail {
            builder = if success { builder.details(detail) } else { builder.failure(detail) };
        } else if !success {
            builder = builder.failure("");
        }
        self.audit.append(builder.build()).await;
    }

    async fn issue_session_and_tokens(&self, user_id: Uuid, user_agent: &str, ip: &str) -> (String, String, Uuid) {
        let refresh_secret = generate_refresh_secret();
        let session = self.sessions.create(user_id, hash_refresh_secret(&refresh_secret), user_agent, ip, self.refresh_ttl);

        let principal = self.principals.resolve(user_id, None).await;
        let access = self.signer.mint_access(user_id, session.id, None, principal.roles.clone(), principal.permission_claims());
        let refresh = self.signer.mint_refresh(user_id, session.id);
        (access, refresh, session.id)
    }

    /// Spec §4.6 "Login". Steps 2-4's failures all collapse to the same
    /// generic [`crate::error::Error::Authentication`] — no branch here is
    /// distinguishable to the caller.
    #[instrument(skip(self, password, user_agent))]
    pub async fn login(&self, email: &str, password: &str, user_agent: &str, ip: &str) -> crate::error::Result<AuthOutcome> {
        if !self.rate_limiter.check(Bucket::Login, email).is_allowed() {
            warn!(%email, "login blocked by rate limiter");
            self.emit("LOGIN_BLOCKED", false, None, None, Some("rate-limited"), ip, user_agent).await;
            return Err(crate::error::Error::RateLimited { retry_after_secs: 60 });
        }

        let Some(mut user) = self.users.find_by_email(email).await else {
            // Pay the same Argon2 cost a known-email/wrong-password login
            // pays, against a fixed dummy hash, so the two failure paths
            // are indistinguishable by timing.
            self.hasher.verify(password, &self.dummy_password_hash);
            self.emit("LOGIN_FAIL", false, None, None, Some("unknown"), ip, user_agent).await;
            return Err(crate::error::Error::Authentication);
        };

        if !user.active {
            self.emit("LOGIN_FAIL", false, Some(user.id), None, Some("inactive"), ip, user_agent).await;
            return Err(crate::error::Error::Authentication);
        }

        let outcome = self.hasher.verify(password, &user.password_hash);
        if !outcome.matched {
            self.emit("LOGIN_FAIL", false, Some(user.id), None, Some("bad-password"), ip, user_agent).await;
            return Err(crate::error::Error::Authentication);
        }

        if outcome.needs_upgrade {
            debug!(user_id = %user.id, "upgrading legacy bcrypt hash to argon2id");
            if let Ok(upgraded) = self.hasher.hash(password) {
                user.password_hash = upgraded;
                let _ = self.users.update(user.clone()).await;
            }
        }

        let (access, refresh, session_id) = self.issue_session_and_tokens(user.id, user_agent, ip).await;
        info!(user_id = %user.id, session_id = %session_id, "login succeeded");
        self.emit("LOGIN_SUCCESS", true, Some(user.id), Some(session_id), None, ip, user_agent).await;

        Ok(AuthOutcome {
            access_token: access,
            refresh_token: refresh,
            access_ttl_secs: self.access_ttl_secs,
            user_id: user.id,
            user_name: user.display_name,
            user_email: user.email,
        })
    }

    /// `/auth/register` (spec §6). Not a named state machine in §4.6, but
    /// shares login's token-issuance tail; the account is activated
    /// immediately since the documented response already carries usable
    /// tokens (see DESIGN.md for the email-verification open question).
    #[instrument(skip(self, password, user_agent))]
    pub async fn register(&self, name: &str, email: &str, password: &str, user_agent: &str, ip: &str) -> crate::error::Result<AuthOutcome> {
        if !self.rate_limiter.check(Bucket::Register, ip).is_allowed() {
            warn!(%ip, "registration blocked by rate limiter");
            return Err(crate::error::Error::RateLimited { retry_after_secs: 300 });
        }

        validate_password_policy(password)?;

        if self.users.find_by_email(email).await.is_some() {
            self.emit("REGISTER_FAIL", false, None, None, Some("email-taken"), ip, user_agent).await;
            return Err(crate::error::Error::Conflict("email already registered".into()));
        }

        let password_hash = self.hasher.hash(password)?;
        let mut user = crate::model::User::new(name, email, password_hash);
        user.activate();
        self.users.insert(user.clone()).await?;

        let (access, refresh, session_id) = self.issue_session_and_tokens(user.id, user_agent, ip).await;
        info!(user_id = %user.id, session_id = %session_id, "registration succeeded");
        self.emit("REGISTER_SUCCESS", true, Some(user.id), Some(session_id), None, ip, user_agent).await;

        Ok(AuthOutcome {
            access_token: access,
            refresh_token: refresh,
            access_ttl_secs: self.access_ttl_secs,
            user_id: user.id,
            user_name: user.display_name,
            user_email: user.email,
        })
    }

    /// Spec §4.6 "Refresh". Rotation happens before new tokens are minted
    /// so a crash between rotation and minting never leaves a session
    /// whose tokens don't match its stored refresh hash.
    #[instrument(skip(self, refresh_token, user_agent))]
    pub async fn refresh(&self, refresh_token: &str, user_agent: &str, ip: &str) -> crate::error::Result<AuthOutcome> {
        let claims = self.signer.verify(refresh_token, TokenType::Refresh).map_err(crate::error::Error::from)?;

        if !self.rate_limiter.check(Bucket::Refresh, &claims.sub.to_string()).is_allowed() {
            warn!(user_id = %claims.sub, "refresh blocked by rate limiter");
            return Err(crate::error::Error::RateLimited { retry_after_secs: 60 });
        }

        let Some(_session) = self.sessions.find(claims.sid) else {
            self.emit("REFRESH_FAIL", false, Some(claims.sub), None, Some("no-session"), ip, user_agent).await;
            return Err(crate::error::Error::Authentication);
        };

        let Some(user) = self.users.find_by_id(claims.sub).await else {
            self.emit("REFRESH_FAIL", false, Some(claims.sub), Some(claims.sid), Some("no-user"), ip, user_agent).await;
            return Err(crate::error::Error::Authentication);
        };
        if !user.active {
            self.emit("REFRESH_FAIL", false, Some(user.id), Some(claims.sid), Some("inactive"), ip, user_agent).await;
            return Err(crate::error::Error::Authentication);
        }

        let new_refresh_secret = generate_refresh_secret();
        let rotated = self
            .sessions
            .rotate(claims.sid, hash_refresh_secret(&new_refresh_secret), self.refresh_ttl)
            .map_err(|_| crate::error::Error::Authentication)?;

        let principal = self.principals.resolve(user.id, None).await;
        let access = self.signer.mint_access(user.id, rotated.id, None, principal.roles.clone(), principal.permission_claims());
        let refresh = self.signer.mint_refresh(user.id, rotated.id);

        info!(user_id = %user.id, session_id = %rotated.id, "refresh succeeded");
        self.emit("REFRESH_SUCCESS", true, Some(user.id), Some(rotated.id), None, ip, user_agent).await;

        Ok(AuthOutcome {
            access_token: access,
            refresh_token: refresh,
            access_ttl_secs: self.access_ttl_secs,
            user_id: user.id,
            user_name: user.display_name,
            user_email: user.email,
        })
    }

    /// Mints a tenant-bound access token for an already-live session. Login
    /// and refresh mint the landlord-anchored view (spec §4.4, `tenant_id =
    /// null`); once a caller selects which tenant to act in, a tenant-scoped
    /// endpoint's role/permission checks need a token whose `tenant_id`
    /// claim actually names that tenant (spec §8 scenario S6), not the
    /// landlord-anchored one the session started with.
    #[instrument(skip(self))]
    pub async fn mint_tenant_access(&self, user_id: Uuid, session_id: Uuid, tenant_id: Uuid) -> crate::error::Result<String> {
        let session = self.sessions.find(session_id).ok_or(crate::error::Error::Authentication)?;
        if session.user_id != user_id {
            return Err(crate::error::Error::Authentication);
        }

        let principal = self.principals.resolve(user_id, Some(tenant_id)).await;
        Ok(self.signer.mint_access(user_id, session_id, Some(tenant_id), principal.roles.clone(), principal.permission_claims()))
    }

    /// Spec §4.6 "Logout". The token's signature is checked, its expiry is
    /// not — an already-expired access token must still be able to revoke
    /// its session.
    #[instrument(skip(self, access_or_refresh_token, user_agent))]
    pub async fn logout(&self, access_or_refresh_token: &str, user_agent: &str, ip: &str) -> crate::error::Result<()> {
        let claims = self
            .signer
            .extract_ignoring_expiry(access_or_refresh_token)
            .map_err(crate::error::Error::from)?;

        self.sessions.revoke(claims.sid);
        info!(user_id = %claims.sub, session_id = %claims.sid, "logout succeeded");
        self.emit("LOGOUT", true, Some(claims.sub), Some(claims.sid), None, ip, user_agent).await;
        Ok(())
    }

    /// Authenticated password change: verifies the current password, then
    /// enforces the policy on the new one, persists, and revokes every
    /// live session for the user (spec §4.6).
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(&self, user_id: Uuid, current_password: &str, new_password: &str) -> crate::error::Result<()> {
        let mut user = self.users.find_by_id(user_id).await.ok_or(crate::error::Error::Authentication)?;

        if !self.hasher.verify(current_password, &user.password_hash).matched {
            return Err(crate::error::Error::Authentication);
        }

        validate_password_policy(new_password)?;

        user.password_hash = self.hasher.hash(new_password)?;
        self.users.update(user.clone()).await?;
        self.sessions.revoke_all(user.id);

        info!(%user_id, "password changed, all sessions revoked");
        self.emit("PASSWORD_CHANGED", true, Some(user.id), None, None, "", "").await;
        Ok(())
    }

    /// Spec §4.6 "Password reset — request". Always succeeds from the
    /// caller's perspective regardless of whether the email exists.
    #[instrument(skip(self))]
    pub async fn request_reset(&self, email: &str) -> crate::error::Result<Option<String>> {
        if !self.rate_limiter.check(Bucket::Reset, email).is_allowed() {
            warn!(%email, "reset request blocked by rate limiter");
            return Ok(None);
        }

        let Some(user) = self.users.find_by_email(email).await else { return Ok(None) };
        if !user.active {
            return Ok(None);
        }

        let token = self.reset_tokens.issue(user.id, self.reset_ttl);
        info!(user_id = %user.id, "password reset requested");
        self.emit("PASSWORD_RESET_REQUESTED", true, Some(user.id), None, None, "", "").await;
        Ok(Some(token))
    }

    /// Spec §4.6 "Password reset — confirm".
    #[instrument(skip(self, reset_token, new_password))]
    pub async fn confirm_reset(&self, reset_token: &str, new_password: &str) -> crate::error::Result<()> {
        let user_id = self.reset_tokens.consume(reset_token).map_err(|_| {
            crate::error::Error::Validation("reset token invalid, expired, or already used".into())
        })?;

        let mut user = self.users.find_by_id(user_id).await.ok_or(crate::error::Error::Authentication)?;

        if self.hasher.verify(new_password, &user.password_hash).matched {
            return Err(crate::error::Error::Validation("new password must differ from the current password".into()));
        }

        validate_password_policy(new_password)?;

        user.password_hash = self.hasher.hash(new_password)?;
        self.users.update(user.clone()).await?;
        self.sessions.revoke_all(user.id);

        info!(%user_id, "password reset completed, all sessions revoked");
        self.emit("PASSWORD_RESET", true, Some(user.id), None, None, "", "").await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditJournal;
    use crate::repository::{
        InMemoryAssignmentRepository, InMemoryPermissionRepository, InMemoryRoleRepository, InMemoryUserRepository,
    };

    fn harness() -> AuthOrchestrator {
        let config = crate::config_test_support::test_config();
        let users = Arc::new(InMemoryUserRepository::new());
        let hasher = Arc::new(PasswordHasher::new(&config).unwrap());
        let signer = Arc::new(TokenSigner::new(&config));
        let sessions = Arc::new(SessionStore::new());
        let roles = Arc::new(InMemoryRoleRepository::new());
        let permissions = Arc::new(InMemoryPermissionRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());
        let principals = Arc::new(PrincipalResolver::new(users.clone(), roles, permissions, assignments));
        let reset_tokens = Arc::new(ResetTokenStore::new());
        let rate_limiter = Arc::new(RateLimiter::new());
        let audit = Arc::new(InMemoryAuditJournal::new());

        AuthOrchestrator::new(&config, users, hasher, signer, sessions, principals, reset_tokens, rate_limiter, audit)
    }

    #[tokio::test]
    async fn register_then_login_round_trips() {
        let orchestrator = harness();
        orchestrator.register("Alice", "alice@example.com", "Str0ng!Passw0rd", "ua", "127.0.0.1").await.unwrap();

        let outcome = orchestrator.login("alice@example.com", "Str0ng!Passw0rd", "ua", "127.0.0.1").await.unwrap();
        assert_eq!(outcome.user_email, "alice@example.com");
    }

    #[tokio::test]
    async fn login_with_unknown_email_fails_generically() {
        let orchestrator = harness();
        let err = orchestrator.login("nobody@example.com", "whatever", "ua", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Authentication));
    }

    #[tokio::test]
    async fn login_with_wrong_password_fails_generically_not_differently_from_unknown_email() {
        let orchestrator = harness();
        orchestrator.register("Alice", "alice@example.com", "Str0ng!Passw0rd", "ua", "127.0.0.1").await.unwrap();
        let err = orchestrator.login("alice@example.com", "wrong-password", "ua", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Authentication));
    }

    #[tokio::test]
    async fn refresh_rotates_session_and_rejects_old_refresh_token() {
        let orchestrator = harness();
        let registered = orchestrator.register("Alice", "alice@example.com", "Str0ng!Passw0rd", "ua", "127.0.0.1").await.unwrap();

        let refreshed = orchestrator.refresh(&registered.refresh_token, "ua", "127.0.0.1").await.unwrap();
        assert_ne!(refreshed.refresh_token, registered.refresh_token);

        let err = orchestrator.refresh(&registered.refresh_token, "ua", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Authentication));
    }

    #[tokio::test]
    async fn logout_revokes_session_so_refresh_then_fails() {
        let orchestrator = harness();
        let registered = orchestrator.register("Alice", "alice@example.com", "Str0ng!Passw0rd", "ua", "127.0.0.1").await.unwrap();

        orchestrator.logout(&registered.access_token, "ua", "127.0.0.1").await.unwrap();
        let err = orchestrator.refresh(&registered.refresh_token, "ua", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Authentication));
    }

    #[tokio::test]
    async fn weak_password_rejected_at_registration() {
        let orchestrator = harness();
        let err = orchestrator.register("Alice", "alice@example.com", "password", "ua", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Validation(_)));
    }

    #[tokio::test]
    async fn reset_flow_changes_password_and_revokes_sessions() {
        let orchestrator = harness();
        let registered = orchestrator.register("Alice", "alice@example.com", "Str0ng!Passw0rd", "ua", "127.0.0.1").await.unwrap();

        let token = orchestrator.request_reset("alice@example.com").await.unwrap().unwrap();
        orchestrator.confirm_reset(&token, "An0ther!Secret").await.unwrap();

        // Old session is dead.
        let err = orchestrator.refresh(&registered.refresh_token, "ua", "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Authentication));

        // New password works, old does not.
        assert!(orchestrator.login("alice@example.com", "An0ther!Secret", "ua", "127.0.0.1").await.is_ok());
        assert!(orchestrator.login("alice@example.com", "Str0ng!Passw0rd", "ua", "127.0.0.1").await.is_err());
    }

    #[tokio::test]
    async fn request_reset_for_unknown_email_is_silently_ok() {
        let orchestrator = harness();
        assert_eq!(orchestrator.request_reset("nobody@example.com").await.unwrap(), None);
    }

    #[test]
    fn password_policy_rejects_common_sequence() {
        assert!(validate_password_policy("Qwerty123!").is_err());
    }

    #[test]
    fn password_policy_rejects_long_runs() {
        assert!(validate_password_policy("Aaaa1111!!!!").is_err());
    }

    #[test]
    fn password_policy_accepts_a_reasonable_password() {
        assert!(validate_password_policy("Tr0ub4dor&3!").is_ok());
    }
}
