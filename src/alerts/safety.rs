//! 安全告警规则: 安全任务 ACTIVE 时打开, 否则关闭

use super::{AlertIntent, Severity};
use crate::tasks::TaskStore;

#[derive(Clone, Debug, PartialEq)]
pub struct SafetyRule {
    pub alert_id: &'static str,
    pub task_key: &'static str,
    pub severity: Severity,
    pub message: &'static str,
}

pub fn default_safety_rules() -> Vec<SafetyRule> {
    vec![
        SafetyRule {
            alert_id: "engine_zone_not_clear",
            task_key: "safety_engine_clear",
            severity: Severity::Critical,
            message: "DANGER: Person detected in Engine ROI! Engine zone NOT clear.",
        },
        SafetyRule {
            alert_id: "pushback_area_not_clear",
            task_key: "safety_pushback_clear",
            severity: Severity::Warning,
            message: "WARNING: Person detected in Pushback ROI! Area NOT clear.",
        },
        SafetyRule {
            alert_id: "airside_person_present",
            task_key: "safety_airside_presence",
            severity: Severity::Info,
            message: "Person detected airside (within Aircraft ROI). Normal during turnaround.",
        },
    ]
}

/// rule_id 与任务键相同
pub fn evaluate_safety(rules: &[SafetyRule], store: &TaskStore) -> Vec<AlertIntent> {
    rules
        .iter()
        .map(|rule| {
            if store.status(rule.task_key).is_active() {
                AlertIntent::raise(rule.alert_id, rule.severity, rule.task_key, rule.message)
            } else {
                AlertIntent::clear(rule.alert_id)
            }
        })
        .collect()
}
