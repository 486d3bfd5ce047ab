//! Append-only security event record. Never mutated after insertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Id;

/// The action codes the orchestrator and gate emit. Kept as a string
/// newtype rather than a closed enum so the journal can record codes this
/// crate doesn't itself define (e.g. administrative actions upstream).
pub type ActionCode = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Id,
    pub actor_user_id: Option<Id>,
    pub session_id: Option<Id>,
    pub action: ActionCode,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 hash of this event chained with the previous event's hash,
    /// for tamper detection. Optional integrity feature on top of the
    /// append-only invariant — absent for journals that don't chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
}

impl AuditEvent {
    pub fn builder(action: impl Into<String>) -> AuditEventBuilder {
        AuditEventBuilder::new(action)
    }

    /// Chain this event onto `previous_hash` and compute its own hash.
    pub fn calculate_hash(&self, previous_hash: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.action.as_bytes());
        if let Some(actor) = &self.actor_user_id {
            hasher.update(actor.as_bytes());
        }
        if let Some(prev) = previous_hash {
            hasher.update(prev.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn verify_hash(&self) -> bool {
        match &self.hash {
            Some(stored) => &self.calculate_hash(self.previous_hash.as_deref()) == stored,
            None => false,
        }
    }
}

pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            event: AuditEvent {
                id: super::new_id(),
                actor_user_id: None,
                session_id: None,
                action: action.into(),
                resource_type: None,
                resource_id: None,
                details: None,
                ip_address: None,
                user_agent: None,
                success: true,
                error_message: None,
                timestamp: Utc::now(),
                hash: None,
                previous_hash: None,
            },
        }
    }

    pub fn actor(mut self, user_id: Id) -> Self {
        self.event.actor_user_id = Some(user_id);
        self
    }

    pub fn session(mut self, session_id: Id) -> Self {
        self.event.session_id = Some(session_id);
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.event.resource_type = Some(resource_type.into());
        self.event.resource_id = Some(resource_id.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.event.details = Some(details.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.event.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.event.user_agent = Some(ua.into());
        self
    }

    pub fn failure(mut self, error_message: impl Into<String>) -> Self {
        self.event.success = false;
        self.event.error_message = Some(error_message.into());
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }

    pub fn build_chained(mut self, previous_hash: Option<&str>) -> AuditEvent {
        let hash = self.event.calculate_hash(previous_hash);
        self.event.hash = Some(hash);
        self.event.previous_hash = previous_hash.map(str::to_string);
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let event = AuditEvent::builder("LOGIN_SUCCESS")
            .actor(super::super::new_id())
            .ip_address("203.0.113.5")
            .build();
        assert_eq!(event.action, "LOGIN_SUCCESS");
        assert!(event.success);
    }

    #[test]
    fn hash_chain_verifies() {
        let e1 = AuditEvent::builder("LOGIN_SUCCESS").build_chained(None);
        assert!(e1.verify_hash());

        let e2 = AuditEvent::builder("LOGOUT").build_chained(e1.hash.as_deref());
        assert_eq!(e2.previous_hash, e1.hash);
        assert!(e2.verify_hash());
    }
}
