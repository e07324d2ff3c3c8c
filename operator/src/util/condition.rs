use ome_types::{Condition, ConditionStatus};

/// Writes (or updates) a condition of the given `type_` in `conditions`,
/// preserving `lastTransitionTime` unless `status` actually changed (I4,
/// P5): a condition is rewritten only when `status`/`reason`/`message`
/// differ from the existing record.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: Option<String>,
    message: Option<String>,
) {
    let now = chrono::Utc::now().to_rfc3339();
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            let status_changed = existing.status != status;
            if status_changed || existing.reason != reason || existing.message != message {
                if status_changed {
                    existing.last_transition_time = Some(now);
                }
                existing.status = status;
                existing.reason = reason;
                existing.message = message;
            }
        }
        None => conditions.push(Condition {
            type_: type_.to_owned(),
            status,
            reason,
            message,
            last_transition_time: Some(now),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_when_unchanged() {
        let mut conditions = vec![Condition {
            type_: "Ready".to_owned(),
            status: ConditionStatus::True,
            reason: Some("Healthy".to_owned()),
            message: Some("all good".to_owned()),
            last_transition_time: Some("2024-01-01T00:00:00Z".to_owned()),
        }];
        set_condition(
            &mut conditions,
            "Ready",
            ConditionStatus::True,
            Some("Healthy".to_owned()),
            Some("all good".to_owned()),
        );
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn bumps_transition_time_only_on_status_change() {
        let mut conditions = vec![Condition {
            type_: "Ready".to_owned(),
            status: ConditionStatus::False,
            reason: Some("NotYet".to_owned()),
            message: None,
            last_transition_time: Some("2024-01-01T00:00:00Z".to_owned()),
        }];
        set_condition(
            &mut conditions,
            "Ready",
            ConditionStatus::True,
            Some("Healthy".to_owned()),
            None,
        );
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }
}
