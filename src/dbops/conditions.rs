//! DbOps status condition helpers
//!
//! The launcher always writes the full set of three condition types, each
//! with a definite True/False status; observers never have to deal with a
//! missing condition once an operation has been launched.

use crate::crd::Condition;

/// Condition types maintained on every launched PgDbOps
pub const CONDITION_TYPE_RUNNING: &str = "Running";
pub const CONDITION_TYPE_COMPLETED: &str = "Completed";
pub const CONDITION_TYPE_FAILED: &str = "Failed";

/// Conditions written before the executor is dispatched
pub fn running_conditions() -> Vec<Condition> {
    vec![
        Condition::new(
            CONDITION_TYPE_RUNNING,
            true,
            "OperationRunning",
            "The operation is running",
        ),
        Condition::new(
            CONDITION_TYPE_COMPLETED,
            false,
            "OperationNotCompleted",
            "The operation is not completed",
        ),
        Condition::new(
            CONDITION_TYPE_FAILED,
            false,
            "OperationNotFailed",
            "The operation has not failed",
        ),
    ]
}

/// Conditions written after the executor succeeded
pub fn completed_conditions() -> Vec<Condition> {
    vec![
        Condition::new(
            CONDITION_TYPE_RUNNING,
            false,
            "OperationNotRunning",
            "The operation is not running",
        ),
        Condition::new(
            CONDITION_TYPE_COMPLETED,
            true,
            "OperationCompleted",
            "The operation completed successfully",
        ),
        Condition::new(
            CONDITION_TYPE_FAILED,
            false,
            "OperationNotFailed",
            "The operation has not failed",
        ),
    ]
}

/// Conditions written after the executor failed
pub fn failed_conditions(message: &str) -> Vec<Condition> {
    vec![
        Condition::new(
            CONDITION_TYPE_RUNNING,
            false,
            "OperationNotRunning",
            "The operation is not running",
        ),
        Condition::new(
            CONDITION_TYPE_COMPLETED,
            false,
            "OperationNotCompleted",
            "The operation did not complete",
        ),
        Condition::new(CONDITION_TYPE_FAILED, true, "OperationFailed", message),
    ]
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is true
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(Condition::is_true)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_conditions_cover_all_types() {
        let conditions = running_conditions();
        assert_eq!(conditions.len(), 3);
        assert!(is_condition_true(&conditions, CONDITION_TYPE_RUNNING));
        assert!(!is_condition_true(&conditions, CONDITION_TYPE_COMPLETED));
        assert!(!is_condition_true(&conditions, CONDITION_TYPE_FAILED));
    }

    #[test]
    fn test_completed_conditions_cover_all_types() {
        let conditions = completed_conditions();
        assert_eq!(conditions.len(), 3);
        assert!(!is_condition_true(&conditions, CONDITION_TYPE_RUNNING));
        assert!(is_condition_true(&conditions, CONDITION_TYPE_COMPLETED));
        assert!(!is_condition_true(&conditions, CONDITION_TYPE_FAILED));
    }

    #[test]
    fn test_failed_conditions_carry_the_error_message() {
        let conditions = failed_conditions("switchover timed out");
        assert_eq!(conditions.len(), 3);
        assert!(is_condition_true(&conditions, CONDITION_TYPE_FAILED));
        let failed = find_condition(&conditions, CONDITION_TYPE_FAILED).unwrap();
        assert_eq!(failed.message, "switchover timed out");
    }

    #[test]
    fn test_find_condition_misses_unknown_type() {
        let conditions = completed_conditions();
        assert!(find_condition(&conditions, "Progressing").is_none());
    }
}
