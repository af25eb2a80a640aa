use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

/// Observation of one aspect of an object's state
#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_transition_time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == CONDITION_TRUE
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}", self.condition_type, self.status)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Insert or replace the condition with the same type.
/// The transition time is only moved when the status actually changes.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions
        .iter_mut()
        .find(|existing| existing.condition_type == condition.condition_type)
    {
        Some(existing) => {
            if existing.status == condition.status && !existing.last_transition_time.is_empty() {
                condition.last_transition_time = existing.last_transition_time.clone();
            } else if condition.last_transition_time.is_empty() {
                condition.last_transition_time = now();
            }
            *existing = condition;
        }
        None => {
            if condition.last_transition_time.is_empty() {
                condition.last_transition_time = now();
            }
            conditions.push(condition);
        }
    }
}

pub fn get_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|condition| condition.condition_type == condition_type)
}

pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    get_condition(conditions, condition_type).is_some_and(Condition::is_true)
}

pub fn remove_condition(conditions: &mut Vec<Condition>, condition_type: &str) {
    conditions.retain(|condition| condition.condition_type != condition_type);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conditions = vec![];
        set_condition(&mut conditions, Condition::new("Ready", CONDITION_TRUE));
        set_condition(&mut conditions, Condition::new("Paused", CONDITION_FALSE));

        assert_eq!(conditions.len(), 2);
        assert!(!conditions[0].last_transition_time.is_empty());
        assert!(is_condition_true(&conditions, "Ready"));
        assert!(!is_condition_true(&conditions, "Paused"));
        assert!(!is_condition_true(&conditions, "Missing"));
    }

    #[test]
    fn test_set_condition_keeps_transition_time_for_same_status() {
        let mut conditions = vec![Condition {
            last_transition_time: "2024-01-01T00:00:00Z".to_owned(),
            ..Condition::new("Ready", CONDITION_TRUE)
        }];

        set_condition(
            &mut conditions,
            Condition::new("Ready", CONDITION_TRUE).with_reason("StillReady"),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].reason, "StillReady");
        assert_eq!(conditions[0].last_transition_time, "2024-01-01T00:00:00Z");

        set_condition(&mut conditions, Condition::new("Ready", CONDITION_FALSE));
        assert_eq!(conditions.len(), 1);
        assert_ne!(conditions[0].last_transition_time, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_remove_condition() {
        let mut conditions = vec![Condition::new("a", "x"), Condition::new("b", "y")];
        remove_condition(&mut conditions, "a");
        assert_eq!(conditions, vec![Condition::new("b", "y")]);
    }

    #[test]
    fn test_condition_wire_format() {
        let condition = Condition {
            last_transition_time: "2024-01-01T00:00:00Z".to_owned(),
            ..Condition::new("aaaa", "aaa").with_reason("aa").with_message("a")
        };
        let json = serde_json::to_value(&condition).expect("json");
        assert_eq!(json["type"], "aaaa");
        assert_eq!(json["lastTransitionTime"], "2024-01-01T00:00:00Z");
        assert!(json.get("observedGeneration").is_none());
    }
}
