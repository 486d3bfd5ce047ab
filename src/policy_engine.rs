//! Policy Evaluator (C5).
//!
//! Condition documents arrive as free-form JSON; they are parsed once into
//! the closed sum type [`Predicate`] over the recognized grammar (spec
//! §4.5) with an explicit "unknown ⇒ false" arm, never evaluated
//! reflectively (spec §9 "Dynamic typing in condition documents").

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use ipnet::IpNet;
use serde_json::Value;
use uuid::Uuid;

use crate::model::{Effect, Policy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    pub days: Vec<chrono::Weekday>,
    pub start_seconds: u32,
    pub end_seconds: u32,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub timezone: Tz,
    pub windows: Vec<ScheduleWindow>,
}

/// One recognized condition-document key, already parsed and typed.
/// Evaluating a policy's condition document means folding its predicates
/// with short-circuit AND — never walking the raw JSON a second time.
#[derive(Debug, Clone)]
pub enum Predicate {
    MfaRequired(bool),
    DevicePosture(String),
    AllowedIpRanges(Vec<IpNet>),
    GeoRestrictions(Vec<String>),
    AllowedSchedule(Schedule),
    RequiresDualApproval(bool),
    Tier(String),
    Department(String),
    RiskLevel(RiskLevel),
    /// An unrecognized key. Always evaluates to `false` — the document
    /// fails closed rather than being silently ignored.
    Unknown,
}

/// A request-context carries at minimum the fields spec §4.5 names, plus
/// arbitrary request-supplied attributes under their own keys.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: Option<std::net::IpAddr>,
    pub timestamp: Option<DateTime<Utc>>,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub mfa_present: bool,
    pub device_posture: Option<String>,
    pub geo: Option<String>,
    pub attributes: HashMap<String, Value>,
}

impl RequestContext {
    fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }
}

fn parse_condition_document(doc: &Value) -> Vec<Predicate> {
    let Some(obj) = doc.as_object() else { return Vec::new() };

    obj.iter()
        .map(|(key, value)| match key.as_str() {
            "mfa_required" => value.as_bool().map(Predicate::MfaRequired).unwrap_or(Predicate::Unknown),
            "device_posture" => value.as_str().map(|s| Predicate::DevicePosture(s.to_string())).unwrap_or(Predicate::Unknown),
            "allowed_ip_ranges" => parse_ip_ranges(value).map(Predicate::AllowedIpRanges).unwrap_or(Predicate::Unknown),
            "geo_restrictions" => parse_string_list(value).map(Predicate::GeoRestrictions).unwrap_or(Predicate::Unknown),
            "allowed_schedule" => parse_schedule(value).map(Predicate::AllowedSchedule).unwrap_or(Predicate::Unknown),
            "requires_dual_approval" => value.as_bool().map(Predicate::RequiresDualApproval).unwrap_or(Predicate::Unknown),
            "tier" => value.as_str().map(|s| Predicate::Tier(s.to_string())).unwrap_or(Predicate::Unknown),
            "department" => value.as_str().map(|s| Predicate::Department(s.to_string())).unwrap_or(Predicate::Unknown),
            "risk_level" => value.as_str().and_then(RiskLevel::parse).map(Predicate::RiskLevel).unwrap_or(Predicate::Unknown),
            _ => Predicate::Unknown,
        })
        .collect()
}

fn parse_ip_ranges(value: &Value) -> Option<Vec<IpNet>> {
    let arr = value.as_array()?;
    arr.iter().map(|v| v.as_str()?.parse().ok()).collect()
}

fn parse_string_list(value: &Value) -> Option<Vec<String>> {
    let arr = value.as_array()?;
    arr.iter().map(|v| v.as_str().map(str::to_string)).collect()
}

/// Parses `"HH:MM"` (seconds assumed `:00`) into seconds-since-midnight, so
/// boundary comparisons can be exact to the second rather than truncating
/// to the minute (spec §8 "Mon 22:00:00 local ⇒ TRUE; at 22:00:01 ⇒ FALSE").
fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse::<u32>().ok()? * 60 + m.parse::<u32>().ok()?) * 60)
}

fn parse_weekday(s: &str) -> Option<chrono::Weekday> {
    let lower = s.to_ascii_lowercase();
    let prefix = &lower[..lower.len().min(3)];
    match prefix {
        "mon" => Some(chrono::Weekday::Mon),
        "tue" => Some(chrono::Weekday::Tue),
        "wed" => Some(chrono::Weekday::Wed),
        "thu" => Some(chrono::Weekday::Thu),
        "fri" => Some(chrono::Weekday::Fri),
        "sat" => Some(chrono::Weekday::Sat),
        "sun" => Some(chrono::Weekday::Sun),
        _ => None,
    }
}

fn parse_schedule(value: &Value) -> Option<Schedule> {
    let obj = value.as_object()?;
    let timezone: Tz = obj.get("timezone")?.as_str()?.parse().ok()?;
    let windows = obj
        .get("windows")?
        .as_array()?
        .iter()
        .map(|w| {
            let w = w.as_object()?;
            let days = w
                .get("days")?
                .as_array()?
                .iter()
                .map(|d| parse_weekday(d.as_str()?))
                .collect::<Option<Vec<_>>>()?;
            let start_seconds = parse_hhmm(w.get("start")?.as_str()?)?;
            let end_seconds = parse_hhmm(w.get("end")?.as_str()?)?;
            Some(ScheduleWindow { days, start_seconds, end_seconds })
        })
        .collect::<Option<Vec<_>>>()?;

    Some(Schedule { timezone, windows })
}

impl Predicate {
    /// `effect` only changes the polarity of [`Predicate::AllowedIpRanges`]:
    /// on an `ALLOW` policy the key names the ranges access is granted
    /// from (condition true ⇒ inside); on a `DENY` policy it names the
    /// approved corporate range an "off-network" rule should let through,
    /// so the condition is true exactly when the caller is OUTSIDE it
    /// (spec §8 scenario S3). Every other predicate is effect-independent.
    fn evaluate(&self, ctx: &RequestContext, effect: Effect) -> bool {
        match self {
            Predicate::MfaRequired(required) => !required || ctx.mfa_present,
            Predicate::DevicePosture(expected) => ctx.device_posture.as_deref() == Some(expected.as_str()),
            Predicate::AllowedIpRanges(ranges) => {
                let inside = ctx.client_ip.is_some_and(|ip| ranges.iter().any(|r| r.contains(&ip)));
                if effect == Effect::Deny { !inside } else { inside }
            }
            Predicate::GeoRestrictions(allowed) => ctx.geo.as_deref().is_some_and(|g| allowed.iter().any(|a| a == g)),
            Predicate::AllowedSchedule(schedule) => evaluate_schedule(schedule, ctx.timestamp),
            Predicate::RequiresDualApproval(required) => !required || ctx.attr_bool("dual_approval").unwrap_or(false),
            Predicate::Tier(expected) => ctx.attr_str("membership_tier") == Some(expected.as_str()),
            Predicate::Department(expected) => ctx.attr_str("department") == Some(expected.as_str()),
            Predicate::RiskLevel(minimum) => ctx
                .attr_str("risk_level")
                .and_then(RiskLevel::parse)
                .is_some_and(|actual| actual >= *minimum),
            Predicate::Unknown => false,
        }
    }
}

fn evaluate_schedule(schedule: &Schedule, timestamp: Option<DateTime<Utc>>) -> bool {
    let Some(ts) = timestamp else { return false };
    let local = ts.with_timezone(&schedule.timezone);
    let weekday = local.weekday();
    let second_of_day = local.num_seconds_from_midnight();

    schedule.windows.iter().any(|w| {
        w.days.contains(&weekday) && second_of_day >= w.start_seconds && second_of_day <= w.end_seconds
    })
}

/// A condition document with zero keys always evaluates true — the
/// policy's effect alone dictates the decision (spec §4.5).
fn evaluate_document(doc: &Value, ctx: &RequestContext, effect: Effect) -> bool {
    parse_condition_document(doc).iter().all(|p| p.evaluate(ctx, effect))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Policy(String),
    NoMatchingPolicy,
    ConditionNotMet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow { policy_code: String },
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

pub struct Evaluator;

impl Evaluator {
    /// Implements spec §4.5's six-step decision algorithm exactly: select
    /// matching policies, partition by effect, DENY evaluated before
    /// ALLOW, DENY precedence absolute.
    pub fn decide(ctx: &RequestContext, action: &str, resource: &str, policies: &[Policy]) -> Decision {
        let candidates: Vec<&Policy> = policies.iter().filter(|p| p.matches_action_resource(action, resource)).collect();

        let (deny_set, allow_set): (Vec<&&Policy>, Vec<&&Policy>) =
            candidates.iter().partition(|p| p.effect == Effect::Deny);

        for policy in &deny_set {
            if evaluate_document(&policy.conditions, ctx, Effect::Deny) {
                return Decision::Deny(DenyReason::Policy(policy.code.clone()));
            }
        }

        if allow_set.is_empty() {
            return Decision::Deny(DenyReason::NoMatchingPolicy);
        }

        for policy in &allow_set {
            if evaluate_document(&policy.conditions, ctx, Effect::Allow) {
                return Decision::Allow { policy_code: policy.code.clone() };
            }
        }

        Decision::Deny(DenyReason::ConditionNotMet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::new_id;
    use serde_json::json;

    fn policy(effect: Effect, actions: &[&str], resources: &[&str], conditions: Value) -> Policy {
        Policy {
            id: new_id(),
            tenant_id: new_id(),
            code: format!("{effect:?}-{}", new_id()),
            display_name: "test".into(),
            effect,
            actions: actions.iter().map(|s| s.to_string()).collect(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
            conditions,
        }
    }

    #[test]
    fn empty_condition_always_true_allow_wins() {
        let allow = policy(Effect::Allow, &["read"], &["reports"], json!({}));
        let ctx = RequestContext::default();
        let decision = Evaluator::decide(&ctx, "read", "reports", &[allow.clone()]);
        assert_eq!(decision, Decision::Allow { policy_code: allow.code });
    }

    #[test]
    fn deny_precedence_beats_any_number_of_allows() {
        let deny = policy(Effect::Deny, &["read"], &["reports"], json!({}));
        let allow1 = policy(Effect::Allow, &["read"], &["reports"], json!({}));
        let allow2 = policy(Effect::Allow, &["*"], &["*"], json!({}));
        let ctx = RequestContext::default();

        let decision = Evaluator::decide(&ctx, "read", "reports", &[deny.clone(), allow1, allow2]);
        assert_eq!(decision, Decision::Deny(DenyReason::Policy(deny.code)));
    }

    #[test]
    fn no_matching_policy_denies() {
        let ctx = RequestContext::default();
        let decision = Evaluator::decide(&ctx, "delete", "reports", &[]);
        assert_eq!(decision, Decision::Deny(DenyReason::NoMatchingPolicy));
    }

    #[test]
    fn unknown_predicate_key_fails_closed() {
        let allow = policy(Effect::Allow, &["read"], &["reports"], json!({"unknown_key": true}));
        let ctx = RequestContext::default();
        let decision = Evaluator::decide(&ctx, "read", "reports", &[allow]);
        assert_eq!(decision, Decision::Deny(DenyReason::ConditionNotMet));
    }

    #[test]
    fn cidr_predicate_allows_in_range_denies_outside() {
        let allow = policy(Effect::Allow, &["read"], &["reports"], json!({"allowed_ip_ranges": ["10.0.0.0/16"]}));

        let mut ctx = RequestContext::default();
        ctx.client_ip = Some("10.0.5.7".parse().unwrap());
        assert!(Evaluator::decide(&ctx, "read", "reports", &[allow.clone()]).is_allow());

        ctx.client_ip = Some("10.1.0.1".parse().unwrap());
        assert!(!Evaluator::decide(&ctx, "read", "reports", &[allow]).is_allow());
    }

    /// Spec §8 scenario S3: an unconditional ALLOW for the finance team
    /// plus an "off-network" DENY whose `allowed_ip_ranges` names the
    /// approved corporate range — the DENY fires for callers OUTSIDE that
    /// range, not inside it.
    #[test]
    fn off_network_deny_fires_outside_its_range_not_inside() {
        let deny = policy(
            Effect::Deny,
            &["read"],
            &["reports"],
            json!({"allowed_ip_ranges": ["203.0.113.0/24"]}),
        );
        let allow = policy(Effect::Allow, &["read"], &["reports"], json!({}));

        let mut ctx = RequestContext::default();
        ctx.client_ip = Some("198.51.100.5".parse().unwrap());
        let decision = Evaluator::decide(&ctx, "read", "reports", &[deny.clone(), allow.clone()]);
        assert_eq!(decision, Decision::Deny(DenyReason::Policy(deny.code.clone())));

        ctx.client_ip = Some("203.0.113.10".parse().unwrap());
        let decision = Evaluator::decide(&ctx, "read", "reports", &[deny, allow]);
        assert!(decision.is_allow());
    }

    #[test]
    fn schedule_boundary_inclusive_then_exclusive() {
        let schedule = json!({
            "timezone": "America/Sao_Paulo",
            "windows": [{"days": ["mon", "tue", "wed", "thu", "fri"], "start": "07:00", "end": "22:00"}]
        });
        let allow = policy(Effect::Allow, &["read"], &["reports"], json!({"allowed_schedule": schedule}));

        // Monday 22:00:00 America/Sao_Paulo == Monday 22:00:00-03:00.
        use chrono::TimeZone;
        let tz: Tz = "America/Sao_Paulo".parse().unwrap();
        let at_boundary = tz.with_ymd_and_hms(2026, 7, 27, 22, 0, 0).unwrap().with_timezone(&Utc);
        let mut ctx = RequestContext::default();
        ctx.timestamp = Some(at_boundary);
        assert!(Evaluator::decide(&ctx, "read", "reports", &[allow.clone()]).is_allow());

        let after_boundary = tz.with_ymd_and_hms(2026, 7, 27, 22, 0, 1).unwrap().with_timezone(&Utc);
        ctx.timestamp = Some(after_boundary);
        assert!(!Evaluator::decide(&ctx, "read", "reports", &[allow]).is_allow());
    }
}
