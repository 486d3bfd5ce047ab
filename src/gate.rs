//! Authorization Gate (C10).
//!
//! Per-request adapter implementing spec §4.10's seven-step contract.
//! Stateless across calls; every dependency is shared, `Arc`-held
//! collaborator state.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::AuditJournal;
use crate::model::AuditEvent;
use crate::policy_engine::{Decision as PolicyDecision, DenyReason, Evaluator, RequestContext};
use crate::principal::PrincipalResolver;
use crate::repository::PolicyRepository;
use crate::session_store::SessionStore;
use crate::token::{Claims, TokenSigner, TokenType};

/// What a protected endpoint declares about its own enforcement. Every
/// field left at its default imposes no check of that kind.
#[derive(Debug, Clone, Default)]
pub struct EndpointPolicy {
    pub required_roles: Vec<String>,
    pub required_permission: Option<(String, String)>,
    /// Path parameter naming the owning user; satisfied if the caller
    /// *is* that user, independent of role.
    pub ownership_param: Option<Uuid>,
    /// `(action, resource)` to submit to the Policy Evaluator.
    pub abac: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct GateRequest {
    pub bearer: Option<String>,
    pub client_ip: Option<IpAddr>,
    pub tenant_id: Option<Uuid>,
    pub mfa_present: bool,
    pub attributes: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    MissingCredential,
    InvalidToken,
    SessionNotLive,
    RoleDenied,
    PermissionDenied,
    PolicyDenied(String),
}

impl From<GateError> for crate::error::Error {
    fn from(e: GateError) -> Self {
        match e {
            GateError::MissingCredential | GateError::InvalidToken | GateError::SessionNotLive => {
                crate::error::Error::Authentication
            }
            GateError::RoleDenied => crate::error::Error::Authorization("role-required".into()),
            GateError::PermissionDenied => crate::error::Error::Authorization("permission-required".into()),
            GateError::PolicyDenied(code) => crate::error::Error::Authorization(code),
        }
    }
}

pub struct AuthorizedContext {
    pub claims: Claims,
}

pub struct Gate {
    signer: Arc<TokenSigner>,
    sessions: Arc<SessionStore>,
    principals: Arc<PrincipalResolver>,
    policies: Arc<dyn PolicyRepository>,
    audit: Arc<dyn AuditJournal>,
}

impl Gate {
    pub fn new(
        signer: Arc<TokenSigner>,
        sessions: Arc<SessionStore>,
        principals: Arc<PrincipalResolver>,
        policies: Arc<dyn PolicyRepository>,
        audit: Arc<dyn AuditJournal>,
    ) -> Self {
        Self { signer, sessions, principals, policies, audit }
    }

    pub async fn authorize(
        &self,
        endpoint_action: &str,
        request: &GateRequest,
        requirement: &EndpointPolicy,
    ) -> Result<AuthorizedContext, GateError> {
        let result = self.authorize_inner(request, requirement).await;

        let (success, actor, session_id, detail) = match &result {
            Ok(ctx) => (true, Some(ctx.claims.sub), Some(ctx.claims.sid), None),
            Err(e) => {
                let (actor, session_id) = match self.peek_claims(request) {
                    Some(c) => (Some(c.sub), Some(c.sid)),
                    None => (None, None),
                };
                (false, actor, session_id, Some(gate_error_code(e)))
            }
        };

        let mut builder = AuditEvent::builder(endpoint_action);
        if let Some(user_id) = actor {
            builder = builder.actor(user_id);
        }
        if let Some(sid) = session_id {
            builder = builder.session(sid);
        }
        if let Some(ip) = request.client_ip {
            builder = builder.ip_address(ip.to_string());
        }
        if let Some(detail) = detail {
            builder = builder.failure(detail);
        }
        self.audit.append(builder.build()).await;

        result
    }

    /// Best-effort claim extraction for audit attribution on a failing
    /// request; never escalates a failure into a success.
    fn peek_claims(&self, request: &GateRequest) -> Option<Claims> {
        let token = request.bearer.as_ref()?;
        self.signer.extract_ignoring_expiry(token).ok()
    }

    async fn authorize_inner(&self, request: &GateRequest, requirement: &EndpointPolicy) -> Result<AuthorizedContext, GateError> {
        // [1] Extract bearer credential.
        let token = request.bearer.as_ref().ok_or(GateError::MissingCredential)?;

        // [2] Verify the access token.
        let claims = self.signer.verify(token, TokenType::Access).map_err(|_| GateError::InvalidToken)?;

        // Session liveness (data-flow diagram §2: Gate → Signer → Session Store).
        if self.sessions.find(claims.sid).is_none() {
            return Err(GateError::SessionNotLive);
        }

        // [3] Required roles. A token's roles/permissions are only
        // authoritative for the tenant they were resolved against — a
        // landlord-anchored token (`claims.tenant_id = None`) satisfies only
        // a landlord-level request, and a token scoped to one tenant never
        // satisfies a request scoped to another (spec §8 scenario S6).
        if !requirement.required_roles.is_empty() {
            let entitled = tenant_scope_matches(claims.tenant_id, request.tenant_id)
                && requirement.required_roles.iter().any(|r| claims.roles.contains(r));
            if !entitled {
                // [5] Ownership-or-role: subject match substitutes for the role check.
                let owns = requirement.ownership_param.is_some_and(|owner| owner == claims.sub);
                if !owns {
                    return Err(GateError::RoleDenied);
                }
            }
        }

        // [4] Required permission.
        if let Some((action, resource)) = &requirement.required_permission {
            let claim = format!("{action}:{resource}");
            if !tenant_scope_matches(claims.tenant_id, request.tenant_id) || !claims.permissions.contains(&claim) {
                return Err(GateError::PermissionDenied);
            }
        }

        // [6] ABAC enforcement.
        if let Some((action, resource)) = &requirement.abac {
            let principal = self.principals.resolve(claims.sub, request.tenant_id).await;
            let policies = self.policies.find_by_ids(&principal.policy_ids).await;

            let ctx = RequestContext {
                client_ip: request.client_ip,
                timestamp: Some(Utc::now()),
                tenant_id: request.tenant_id,
                user_id: Some(claims.sub),
                mfa_present: request.mfa_present,
                device_posture: request.attributes.get("device_posture").and_then(|v| v.as_str()).map(str::to_string),
                geo: request.attributes.get("geo").and_then(|v| v.as_str()).map(str::to_string),
                attributes: request.attributes.clone(),
            };

            match Evaluator::decide(&ctx, action, resource, &policies) {
                PolicyDecision::Allow { .. } => {}
                PolicyDecision::Deny(reason) => {
                    return Err(GateError::PolicyDenied(deny_reason_code(&reason)));
                }
            }
        }

        Ok(AuthorizedContext { claims })
    }
}

/// A token's tenant claim matches a request's declared tenant iff both are
/// absent (landlord-anchored token against a landlord-level request) or
/// both are present and equal; any other combination is a scope mismatch.
fn tenant_scope_matches(claims_tenant: Option<Uuid>, request_tenant: Option<Uuid>) -> bool {
    match (claims_tenant, request_tenant) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn deny_reason_code(reason: &DenyReason) -> String {
    match reason {
        DenyReason::Policy(code) => code.clone(),
        DenyReason::NoMatchingPolicy => "no-matching-policy".to_string(),
        DenyReason::ConditionNotMet => "condition-not-met".to_string(),
    }
}

fn gate_error_code(e: &GateError) -> String {
    match e {
        GateError::MissingCredential => "missing-credential".to_string(),
        GateError::InvalidToken => "invalid-token".to_string(),
        GateError::SessionNotLive => "session-not-live".to_string(),
        GateError::RoleDenied => "role-denied".to_string(),
        GateError::PermissionDenied => "permission-denied".to_string(),
        GateError::PolicyDenied(code) => code.clone(),
    }
}
