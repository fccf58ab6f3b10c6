/// Fixture tests for the stream-json mapping layer, using representative
/// payloads captured from the Claude CLI protocol.
#[cfg(test)]
mod unit {
    use crate::types::{ClaudeEvent, EndReason, FailureKind};
    use crate::wire::{EventMapper, StreamMessage};

    fn map_lines(lines: &[&str]) -> Vec<ClaudeEvent> {
        let mut mapper = EventMapper::new();
        lines
            .iter()
            .flat_map(|line| {
                let raw: StreamMessage =
                    serde_json::from_str(line).expect("failed to parse fixture line");
                mapper.map(raw)
            })
            .collect()
    }

    #[test]
    fn system_init_produces_no_events() {
        let events = map_lines(&[
            r#"{"type":"system","subtype":"init","session_id":"abc-123","model":"claude-sonnet-4-20250514","tools":["Read","Bash"],"permission_mode":"default","cwd":"/tmp"}"#,
        ]);
        assert!(events.is_empty());
    }

    #[test]
    fn unknown_message_type_is_skipped() {
        let events = map_lines(&[r#"{"type":"some_future_type","session_id":"abc"}"#]);
        assert!(events.is_empty());
    }

    #[test]
    fn complete_assistant_text_maps_to_text_delta() {
        let events = map_lines(&[
            r#"{"type":"assistant","session_id":"abc","message":{"id":"msg_1","role":"assistant","content":[{"type":"text","text":"Let me read the file."}],"model":"claude-sonnet-4-20250514","stop_reason":"end_turn","usage":{"input_tokens":100,"output_tokens":50}}}"#,
        ]);
        assert_eq!(
            events,
            vec![ClaudeEvent::TextDelta {
                text: "Let me read the file.".into()
            }]
        );
    }

    #[test]
    fn assistant_tool_use_block_carries_full_arguments() {
        let events = map_lines(&[
            r#"{"type":"assistant","session_id":"abc","message":{"id":"msg_1","role":"assistant","content":[{"type":"tool_use","id":"tu_1","name":"read_file","input":{"path":"/tmp/foo.txt"}}],"model":"m","stop_reason":"tool_use","usage":{"input_tokens":1,"output_tokens":1}}}"#,
        ]);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ClaudeEvent::ToolUse {
                id,
                name,
                partial_arguments,
            } => {
                assert_eq!(id, "tu_1");
                assert_eq!(name.as_deref(), Some("read_file"));
                let args: serde_json::Value = serde_json::from_str(partial_arguments).unwrap();
                assert_eq!(args["path"], "/tmp/foo.txt");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    #[test]
    fn thinking_block_maps_to_thinking() {
        let events = map_lines(&[
            r#"{"type":"assistant","session_id":"abc","message":{"id":"m1","role":"assistant","content":[{"type":"thinking","thinking":"hmm"}],"model":"m","stop_reason":null,"usage":{"input_tokens":1,"output_tokens":1}}}"#,
        ]);
        assert_eq!(events, vec![ClaudeEvent::Thinking { text: "hmm".into() }]);
    }

    #[test]
    fn partial_deltas_suppress_the_full_assistant_message() {
        let events = map_lines(&[
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}}"#,
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"he"}}}"#,
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"llo"}}}"#,
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_stop","index":0}}"#,
            // The CLI re-emits the finished message; it must not duplicate.
            r#"{"type":"assistant","session_id":"abc","message":{"id":"m1","role":"assistant","content":[{"type":"text","text":"hello"}],"model":"m","stop_reason":"end_turn","usage":{"input_tokens":1,"output_tokens":1}}}"#,
        ]);
        assert_eq!(
            events,
            vec![
                ClaudeEvent::TextDelta { text: "he".into() },
                ClaudeEvent::TextDelta { text: "llo".into() },
            ]
        );
    }

    #[test]
    fn streamed_tool_arguments_accumulate_under_one_id() {
        let events = map_lines(&[
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"c1","name":"read_file","input":{}}}}"#,
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"p"}}}"#,
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"ath\":\"/f\"}"}}}"#,
            r#"{"type":"stream_event","session_id":"abc","event":{"type":"content_block_stop","index":0}}"#,
        ]);
        assert_eq!(
            events,
            vec![
                ClaudeEvent::ToolUse {
                    id: "c1".into(),
                    name: Some("read_file".into()),
                    partial_arguments: String::new(),
                },
                ClaudeEvent::ToolUse {
                    id: "c1".into(),
                    name: None,
                    partial_arguments: "{\"p".into(),
                },
                ClaudeEvent::ToolUse {
                    id: "c1".into(),
                    name: None,
                    partial_arguments: "ath\":\"/f\"}".into(),
                },
            ]
        );
    }

    #[test]
    fn result_success_yields_usage_then_end_stop() {
        let events = map_lines(&[
            r#"{"type":"result","subtype":"success","session_id":"abc","result":"done","duration_ms":5,"duration_api_ms":4,"is_error":false,"num_turns":1,"stop_reason":"end_turn","total_cost_usd":0.001,"usage":{"input_tokens":1200,"output_tokens":400}}"#,
        ]);
        assert_eq!(
            events,
            vec![
                ClaudeEvent::Usage {
                    prompt_tokens: 1200,
                    completion_tokens: 400
                },
                ClaudeEvent::End {
                    reason: EndReason::Stop
                },
            ]
        );
    }

    #[test]
    fn result_tool_use_stop_reason_ends_with_tool_calls() {
        let events = map_lines(&[
            r#"{"type":"result","subtype":"success","session_id":"abc","result":"","duration_ms":5,"duration_api_ms":4,"is_error":false,"num_turns":1,"stop_reason":"tool_use","total_cost_usd":0.0,"usage":{"input_tokens":10,"output_tokens":5}}"#,
        ]);
        assert_eq!(
            events.last(),
            Some(&ClaudeEvent::End {
                reason: EndReason::ToolCalls
            })
        );
    }

    #[test]
    fn result_without_usage_reports_no_usage_event() {
        // Token accounting is "unknown", never estimated.
        let events = map_lines(&[
            r#"{"type":"result","subtype":"success","session_id":"abc","result":"ok","duration_ms":1,"duration_api_ms":1,"is_error":false,"num_turns":1,"stop_reason":"end_turn","total_cost_usd":0.0}"#,
        ]);
        assert_eq!(
            events,
            vec![ClaudeEvent::End {
                reason: EndReason::Stop
            }]
        );
    }

    #[test]
    fn result_error_max_turns_is_length() {
        let events = map_lines(&[
            r#"{"type":"result","subtype":"error_max_turns","session_id":"abc","duration_ms":10,"duration_api_ms":9,"is_error":true,"num_turns":10,"stop_reason":null,"total_cost_usd":0.02,"usage":{"input_tokens":5000,"output_tokens":1000},"errors":["Reached maximum turn limit"]}"#,
        ]);
        assert_eq!(
            events.last(),
            Some(&ClaudeEvent::End {
                reason: EndReason::Length
            })
        );
    }

    #[test]
    fn result_execution_error_fails_the_completion() {
        let events = map_lines(&[
            r#"{"type":"result","subtype":"error_during_execution","session_id":"abc","duration_ms":10,"duration_api_ms":9,"is_error":true,"num_turns":1,"stop_reason":null,"total_cost_usd":0.0,"usage":{"input_tokens":10,"output_tokens":0},"errors":["model overloaded"]}"#,
        ]);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ClaudeEvent::Error { kind, message } => {
                assert_eq!(*kind, FailureKind::SubprocessFailure);
                assert!(message.contains("model overloaded"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_result_subtype_is_a_failure() {
        let events = map_lines(&[
            r#"{"type":"result","subtype":"error_budget_exceeded_v9","session_id":"abc"}"#,
        ]);
        assert!(matches!(events[0], ClaudeEvent::Error { .. }));
    }
}
