use serde_json::json;

use super::*;
use crate::decoder::Delta;
use crate::event::{FinishReason, ProviderToolStatus};
use crate::message::{Reasoning, ToolCall, ToolResult, ToolResultValue};
use crate::usage::UsageUpdate;
use crate::wire::{DecodeError, Frame};

fn decode(event: &str, data: serde_json::Value) -> Vec<Delta> {
    let decoder = AnthropicDecoder;
    match decoder
        .decode(&Frame::event(event, data.to_string()))
        .expect("valid frame")
    {
        Some(chunk) => decoder.deltas(&chunk),
        None => Vec::new(),
    }
}

// -- decoding --

#[test]
fn test_message_start_carries_id_and_usage() {
    let deltas = decode(
        "message_start",
        json!({
            "type": "message_start",
            "message": {
                "id": "msg_01",
                "model": "claude-sonnet-4-5",
                "usage": {
                    "input_tokens": 25,
                    "output_tokens": 1,
                    "cache_creation_input_tokens": 10,
                    "cache_read_input_tokens": 5
                }
            }
        }),
    );
    assert_eq!(
        deltas,
        vec![
            Delta::MessageStart {
                id: Some("msg_01".into()),
                model: Some("claude-sonnet-4-5".into())
            },
            Delta::Usage(UsageUpdate {
                prompt_tokens: Some(25),
                completion_tokens: Some(1),
                cache_write_input_tokens: Some(10),
                cache_read_input_tokens: Some(5),
                thought_tokens: None,
            }),
        ]
    );
}

#[test]
fn test_ping_is_skipped() {
    assert!(decode("ping", json!({"type": "ping"})).is_empty());
}

#[test]
fn test_text_block_and_deltas() {
    let start = decode(
        "content_block_start",
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    );
    assert!(start.is_empty());

    let delta = decode(
        "content_block_delta",
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
    );
    assert_eq!(delta, vec![Delta::Text("Hi".into())]);

    let stop = decode(
        "content_block_stop",
        json!({"type": "content_block_stop", "index": 0}),
    );
    assert_eq!(stop, vec![Delta::BlockStop { index: 0 }]);
}

#[test]
fn test_thinking_and_signature() {
    let thinking = decode(
        "content_block_delta",
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "Let me"}}),
    );
    assert_eq!(thinking, vec![Delta::Thinking("Let me".into())]);

    let signature = decode(
        "content_block_delta",
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "EqQB"}}),
    );
    assert_eq!(signature, vec![Delta::ThinkingSignature("EqQB".into())]);
}

#[test]
fn test_redacted_thinking_is_kept_opaque() {
    let block = json!({"type": "redacted_thinking", "data": "EmwKAhgB"});
    let deltas = decode(
        "content_block_start",
        json!({"type": "content_block_start", "index": 0, "content_block": block}),
    );
    assert_eq!(deltas, vec![Delta::Opaque(block)]);
}

#[test]
fn test_tool_use_block_and_input_json() {
    let start = decode(
        "content_block_start",
        json!({
            "type": "content_block_start",
            "index": 1,
            "content_block": {"type": "tool_use", "id": "toolu_01", "name": "get_weather", "input": {}}
        }),
    );
    assert_eq!(
        start,
        vec![Delta::ToolCallStart {
            index: 1,
            id: Some("toolu_01".into()),
            name: "get_weather".into()
        }]
    );

    let args = decode(
        "content_block_delta",
        json!({
            "type": "content_block_delta",
            "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"city\": \"Par"}
        }),
    );
    assert_eq!(
        args,
        vec![Delta::ToolCallArgs {
            index: 1,
            fragment: "{\"city\": \"Par".into()
        }]
    );
}

#[test]
fn test_server_tool_use_and_result() {
    let start = decode(
        "content_block_start",
        json!({
            "type": "content_block_start",
            "index": 2,
            "content_block": {"type": "server_tool_use", "id": "srvtoolu_1", "name": "web_search", "input": {}}
        }),
    );
    assert_eq!(
        start,
        vec![Delta::ProviderToolStart {
            index: 2,
            tool_type: "web_search".into(),
            item_id: "srvtoolu_1".into(),
            input: json!({})
        }]
    );

    let result = decode(
        "content_block_start",
        json!({
            "type": "content_block_start",
            "index": 3,
            "content_block": {
                "type": "web_search_tool_result",
                "tool_use_id": "srvtoolu_1",
                "content": [{"type": "web_search_result", "url": "https://example.test", "title": "Example"}]
            }
        }),
    );
    match &result[0] {
        Delta::ProviderToolResult {
            tool_type,
            item_id,
            status,
            ..
        } => {
            assert_eq!(tool_type, "web_search");
            assert_eq!(item_id, "srvtoolu_1");
            assert_eq!(*status, ProviderToolStatus::Completed);
        }
        other => panic!("unexpected delta {other:?}"),
    }
}

#[test]
fn test_server_tool_error_result_is_failed() {
    let deltas = decode(
        "content_block_start",
        json!({
            "type": "content_block_start",
            "index": 3,
            "content_block": {
                "type": "web_search_tool_result",
                "tool_use_id": "srvtoolu_1",
                "content": {"type": "web_search_tool_result_error", "error_code": "max_uses_exceeded"}
            }
        }),
    );
    assert!(matches!(
        &deltas[0],
        Delta::ProviderToolResult {
            status: ProviderToolStatus::Failed,
            ..
        }
    ));
}

#[test]
fn test_citations_delta() {
    let deltas = decode(
        "content_block_delta",
        json!({
            "type": "content_block_delta",
            "index": 4,
            "delta": {
                "type": "citations_delta",
                "citation": {
                    "type": "web_search_result_location",
                    "cited_text": "Paris is the capital",
                    "url": "https://example.test/paris",
                    "title": "Paris"
                }
            }
        }),
    );
    match &deltas[0] {
        Delta::Citation {
            citation,
            block_index,
        } => {
            assert_eq!(citation.citation_type, "web_search_result_location");
            assert_eq!(citation.cited_text.as_deref(), Some("Paris is the capital"));
            assert_eq!(citation.url.as_deref(), Some("https://example.test/paris"));
            assert_eq!(*block_index, 4);
        }
        other => panic!("unexpected delta {other:?}"),
    }
}

#[test]
fn test_message_delta_and_stop() {
    let deltas = decode(
        "message_delta",
        json!({
            "type": "message_delta",
            "delta": {"stop_reason": "tool_use", "stop_sequence": null},
            "usage": {"output_tokens": 42}
        }),
    );
    assert_eq!(
        deltas,
        vec![
            Delta::Usage(UsageUpdate {
                completion_tokens: Some(42),
                ..UsageUpdate::default()
            }),
            Delta::Finish(FinishReason::ToolCalls),
        ]
    );
    assert_eq!(
        decode("message_stop", json!({"type": "message_stop"})),
        vec![Delta::TurnDone]
    );
}

#[test]
fn test_stop_reason_mapping() {
    use super::stream::map_stop_reason;
    assert_eq!(map_stop_reason("end_turn"), FinishReason::Stop);
    assert_eq!(map_stop_reason("stop_sequence"), FinishReason::Stop);
    assert_eq!(map_stop_reason("max_tokens"), FinishReason::Length);
    assert_eq!(map_stop_reason("refusal"), FinishReason::ContentFilter);
    assert_eq!(
        map_stop_reason("pause_turn"),
        FinishReason::Other("pause_turn".into())
    );
}

#[test]
fn test_error_frames() {
    let fatal = decode(
        "error",
        json!({"type": "error", "error": {"type": "rate_limit_error", "message": "slow down"}}),
    );
    assert_eq!(
        fatal,
        vec![Delta::VendorError {
            error_type: "rate_limit_error".into(),
            message: "slow down".into(),
            fatal: true
        }]
    );

    let recoverable = decode(
        "error",
        json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
    );
    assert!(matches!(&recoverable[0], Delta::VendorError { fatal: false, .. }));
}

#[test]
fn test_malformed_payload_is_tagged() {
    let err = AnthropicDecoder
        .decode(&Frame::event("message_start", "{\"type\":"))
        .unwrap_err();
    assert!(matches!(err, DecodeError::MalformedPayload { vendor: "anthropic", .. }));
}

// -- request encoding --

#[test]
fn test_request_headers_and_system() {
    let provider = AnthropicProvider::new("sk-ant", "claude-sonnet-4-5");
    let messages = vec![
        Message::new(Role::System, "One."),
        Message::new(Role::System, "Two."),
        Message::new(Role::User, "Hi"),
    ];
    let request = provider
        .build_request(&messages, &[], &GenerateOptions::default())
        .unwrap();

    assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
    assert_eq!(request.header_value("x-api-key"), Some("sk-ant"));
    assert_eq!(request.body["system"], "One.\n\nTwo.");
    assert_eq!(request.body["stream"], true);
    assert_eq!(request.body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(request.body["messages"][0]["content"][0]["type"], "text");
    assert!(request.body.get("tools").is_none());
    assert!(request.body.get("thinking").is_none());
}

#[test]
fn test_thinking_budget_disables_temperature() {
    let provider = AnthropicProvider::new("k", "claude-sonnet-4-5");
    let options = GenerateOptions {
        max_tokens: 1024,
        temperature: Some(0.5),
        thinking_budget: Some(2048),
    };
    let request = provider
        .build_request(&[Message::new(Role::User, "Hi")], &[], &options)
        .unwrap();
    assert_eq!(request.body["thinking"]["type"], "enabled");
    assert_eq!(request.body["thinking"]["budget_tokens"], 2048);
    assert_eq!(request.body["max_tokens"], 2049);
    assert!(request.body.get("temperature").is_none());
}

#[test]
fn test_tools_are_encoded_with_input_schema() {
    let provider = AnthropicProvider::new("k", "claude-sonnet-4-5");
    let tools = vec![Tool::new("echo", "Echo input")];
    let request = provider
        .build_request(&[Message::new(Role::User, "Hi")], &tools, &GenerateOptions::default())
        .unwrap();
    assert_eq!(request.body["tools"][0]["name"], "echo");
    assert_eq!(request.body["tools"][0]["input_schema"]["type"], "object");
}

#[test]
fn test_history_replays_thinking_and_tool_blocks() {
    let call = ToolCall::from_fragments("toolu_1", "echo", r#"{"input":"x"}"#);
    let ok = ToolResult::success(&call, ToolResultValue::Text("x".into()), Vec::new());
    let other = ToolCall::from_fragments("toolu_2", "boom", "{}");
    let failed = ToolResult::failure(&other, "exploded");
    let reasoning = Reasoning {
        text: "I should echo.".into(),
        signature: Some("sig".into()),
    };
    let messages = vec![
        Message::new(Role::User, "Echo x"),
        Message::assistant_turn("Sure.", Some(reasoning), vec![call, other]),
        Message::tool_results(vec![ok, failed]),
    ];

    let json = serde_json::to_value(build_api_messages(&messages)).unwrap();
    let assistant = &json[1]["content"];
    assert_eq!(json[1]["role"], "assistant");
    assert_eq!(assistant[0]["type"], "thinking");
    assert_eq!(assistant[0]["signature"], "sig");
    assert_eq!(assistant[1]["type"], "text");
    assert_eq!(assistant[2]["type"], "tool_use");
    assert_eq!(assistant[2]["input"]["input"], "x");

    let results = &json[2]["content"];
    assert_eq!(json[2]["role"], "user");
    assert_eq!(results[0]["type"], "tool_result");
    assert_eq!(results[0]["tool_use_id"], "toolu_1");
    assert!(results[0].get("is_error").is_none());
    assert_eq!(results[1]["is_error"], true);
    assert_eq!(results[1]["content"], "exploded");
}

#[test]
fn test_unsigned_reasoning_is_not_replayed() {
    let reasoning = Reasoning {
        text: "hmm".into(),
        signature: None,
    };
    let messages = vec![Message::assistant_turn("Done.", Some(reasoning), Vec::new())];
    let json = serde_json::to_value(build_api_messages(&messages)).unwrap();
    assert_eq!(json[0]["content"].as_array().unwrap().len(), 1);
    assert_eq!(json[0]["content"][0]["type"], "text");
}
