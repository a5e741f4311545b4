use proptest::prelude::*;
use sdk::errors::{ClientError, CopilotErrorExt};
use sdk::types::ChatResponse;
use serde_json::{json, Value};

// User hints must stay static and never echo request data back to the screen.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*", status in 100u16..600) {
        let errs = vec![
            ClientError::Config(error_str.clone()),
            ClientError::BackendUnavailable(error_str.clone()),
            ClientError::BackendStatus { status, body: error_str.clone() },
            ClientError::MalformedResponse(error_str.clone()),
            ClientError::Network(error_str.clone()),
            ClientError::InvalidTaskId(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 8 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

// Whatever shape tool_result takes, only the first descriptor's id is picked up.
proptest! {
    #[test]
    fn test_first_task_id_from_any_shape(
        ids in proptest::collection::vec("[a-z0-9]{1,12}", 1..6),
        as_object in any::<bool>(),
    ) {
        let descriptors: Vec<Value> = ids.iter().map(|id| json!({"task_id": id})).collect();
        let tool_result = if as_object {
            descriptors[0].clone()
        } else {
            Value::Array(descriptors)
        };

        let resp: ChatResponse = serde_json::from_value(json!({
            "reply": "ok",
            "tool_result": tool_result,
        })).unwrap();

        prop_assert_eq!(resp.first_task_id(), Some(ids[0].as_str()));
        if as_object {
            prop_assert_eq!(resp.tool_result.len(), 1);
        } else {
            prop_assert_eq!(resp.tool_result.len(), ids.len());
        }
    }
}
