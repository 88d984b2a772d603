//! Tests for the context module.

#[cfg(test)]
mod tests {
    use crate::context::{keys, Failure, MessageContext};
    use crate::core::{MessageKind, ProcessingStatus};
    use crate::errors::PipelineError;
    use serde::Serialize;
    use std::time::Duration;

    #[derive(Debug, Serialize)]
    struct RenameUser {
        name: String,
    }

    fn context() -> MessageContext {
        MessageContext::for_message(
            MessageKind::Command,
            RenameUser {
                name: "ada".to_string(),
            },
        )
    }

    #[test]
    fn test_context_creation() {
        let ctx = context();

        assert_eq!(ctx.kind(), MessageKind::Command);
        assert_eq!(ctx.status(), ProcessingStatus::NotInitialized);
        assert!(ctx.content_type().ends_with("RenameUser"));
        assert!(ctx.failure().is_none());
        assert!(ctx.execution_duration().is_none());
        assert!(ctx.pipeline_name().is_none());
    }

    #[test]
    fn test_content_type_override() {
        let ctx = context().with_content_type("users.Rename");
        assert_eq!(ctx.content_type(), "users.Rename");
        assert!(ctx.content_key().name().ends_with("RenameUser"));
    }

    #[test]
    fn test_content_access() {
        let mut ctx = context();

        ctx.content_as_mut::<RenameUser>().unwrap().name = "grace".to_string();
        assert_eq!(ctx.content_as::<RenameUser>().unwrap().name, "grace");
        assert!(ctx.content_as::<String>().is_none());

        let message = ctx.into_content::<RenameUser>().unwrap();
        assert_eq!(message.name, "grace");
    }

    #[test]
    fn test_required_item_missing() {
        let ctx = context();
        let err = ctx.item::<u32>("missing").unwrap_err();
        assert!(matches!(err, PipelineError::KeyNotFound { key } if key == "missing"));
    }

    #[test]
    fn test_optional_item_default() {
        let mut ctx = context();
        assert_eq!(ctx.item_or("retries", 3_u32), 3);

        ctx.set_item("retries", 5_u32);
        assert_eq!(ctx.item_or("retries", 3_u32), 5);
        assert_eq!(*ctx.item::<u32>("retries").unwrap(), 5);
    }

    #[test]
    fn test_take_item_keeps_mismatched_type() {
        let mut ctx = context();
        ctx.set_item(keys::EXECUTION_DURATION, Duration::from_millis(4));

        assert!(ctx.take_item::<u64>(keys::EXECUTION_DURATION).is_none());
        assert!(ctx.contains_item(keys::EXECUTION_DURATION));
        assert_eq!(
            ctx.take_item::<Duration>(keys::EXECUTION_DURATION),
            Some(Duration::from_millis(4))
        );
        assert!(!ctx.contains_item(keys::EXECUTION_DURATION));
    }

    #[test]
    fn test_status_moves_forward_only() {
        let mut ctx = context();

        ctx.set_status(ProcessingStatus::Processing).unwrap();
        ctx.set_status(ProcessingStatus::Rejected).unwrap();
        assert!(ctx.is_rejected());

        let err = ctx.set_status(ProcessingStatus::Completed).unwrap_err();
        assert_eq!(err.from, ProcessingStatus::Rejected);
        assert_eq!(ctx.status(), ProcessingStatus::Rejected);
    }

    #[test]
    fn test_result_roundtrip() {
        let mut ctx = context();
        ctx.set_result(Box::new(vec![1, 2]));

        assert!(ctx.take_result::<String>().is_none());
        assert!(ctx.result().is_some());
        assert_eq!(ctx.take_result::<Vec<i32>>(), Some(vec![1, 2]));
        assert!(ctx.result().is_none());
    }

    #[test]
    fn test_failure_aggregate() {
        let failure = Failure::aggregate(vec![
            anyhow::anyhow!("first"),
            anyhow::anyhow!("second"),
        ]);

        assert_eq!(failure.count(), 2);
        assert_eq!(failure.messages(), vec!["first", "second"]);
        assert_eq!(failure.primary().unwrap().to_string(), "first");
        assert!(failure.to_string().starts_with("2 handler(s) failed"));
        assert!(Failure::aggregate(vec![]).is_empty());
    }

    #[test]
    fn test_data_map_is_ordered() {
        let mut ctx = context();
        ctx.insert_data("b", serde_json::json!(2));
        ctx.insert_data("a", serde_json::json!(1));

        let keys: Vec<_> = ctx.data().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
