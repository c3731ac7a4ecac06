use super::*;
use crate::event::Citation;
use crate::transport::TransportError;
use crate::usage::UsageUpdate;
use crate::wire::{Chunk, Frame, Framing};
use bytes::Bytes;
use serde_json::json;

fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match &e.kind {
            EventKind::TextStart { .. } => "text_start",
            EventKind::TextDelta { .. } => "text_delta",
            EventKind::TextComplete { .. } => "text_complete",
            EventKind::ThinkingStart { .. } => "thinking_start",
            EventKind::ThinkingDelta { .. } => "thinking_delta",
            EventKind::ThinkingComplete { .. } => "thinking_complete",
            EventKind::ToolCall { .. } => "tool_call",
            EventKind::ToolCallDelta { .. } => "tool_call_delta",
            EventKind::ProviderTool { .. } => "provider_tool",
            EventKind::Citation { .. } => "citation",
            EventKind::Error { .. } => "error",
            _ => "other",
        })
        .collect()
}

fn apply_all(processor: &mut TurnProcessor<'_>, deltas: Vec<Delta>) -> Vec<StreamEvent> {
    deltas
        .into_iter()
        .flat_map(|d| processor.apply(d))
        .collect()
}

#[test]
fn test_text_start_emitted_once() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let mut events = apply_all(
        &mut processor,
        vec![
            Delta::Text("Hel".into()),
            Delta::Text(String::new()),
            Delta::Text("lo".into()),
            Delta::Finish(FinishReason::Stop),
        ],
    );
    let (tail, outcome) = processor.finish();
    events.extend(tail);

    assert_eq!(
        kinds(&events),
        vec!["text_start", "text_delta", "text_delta", "text_complete"]
    );
    assert_eq!(outcome.text, "Hello");
    assert_eq!(outcome.finish_reason, FinishReason::Stop);
    assert!(outcome.reasoning.is_none());
}

#[test]
fn test_thinking_then_text_closes_thinking_first() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let mut events = apply_all(
        &mut processor,
        vec![
            Delta::Thinking("hmm".into()),
            Delta::ThinkingSignature("sig".into()),
            Delta::Text("answer".into()),
        ],
    );
    let (tail, outcome) = processor.finish();
    events.extend(tail);

    assert_eq!(
        kinds(&events),
        vec![
            "thinking_start",
            "thinking_delta",
            "thinking_complete",
            "text_start",
            "text_delta",
            "text_complete"
        ]
    );
    let reasoning = outcome.reasoning.unwrap();
    assert_eq!(reasoning.text, "hmm");
    assert_eq!(reasoning.signature.as_deref(), Some("sig"));
    assert_eq!(outcome.finish_reason, FinishReason::Unknown);
}

#[test]
fn test_reopened_thinking_gets_new_reasoning_id() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let events = apply_all(
        &mut processor,
        vec![
            Delta::Thinking("a".into()),
            Delta::Text("b".into()),
            Delta::Thinking("c".into()),
        ],
    );
    let ids: Vec<&str> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ThinkingStart { reasoning_id } => Some(reasoning_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn test_fragmented_tool_call_assembles_on_finish() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let events = apply_all(
        &mut processor,
        vec![
            Delta::ToolCallStart {
                index: 0,
                id: Some("call_1".into()),
                name: "echo".into(),
            },
            Delta::ToolCallArgs {
                index: 0,
                fragment: "{\"inp".into(),
            },
            Delta::ToolCallArgs {
                index: 0,
                fragment: "ut\":\"wor".into(),
            },
            Delta::ToolCallArgs {
                index: 0,
                fragment: "ld\"}".into(),
            },
            Delta::Finish(FinishReason::ToolCalls),
        ],
    );
    assert_eq!(processor.phase(), TurnPhase::ToolCallsPending);
    let (_, outcome) = processor.finish();

    assert_eq!(
        kinds(&events),
        vec!["tool_call_delta", "tool_call_delta", "tool_call_delta", "tool_call"]
    );
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].arguments_value(), json!({"input": "world"}));
    assert_eq!(outcome.finish_reason, FinishReason::ToolCalls);
}

#[test]
fn test_tool_calls_force_finish_reason() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    apply_all(
        &mut processor,
        vec![
            Delta::ToolCall {
                id: None,
                name: "lookup".into(),
                arguments: json!({"q": 1}),
            },
            Delta::Finish(FinishReason::Stop),
        ],
    );
    let (_, outcome) = processor.finish();
    assert_eq!(outcome.finish_reason, FinishReason::ToolCalls);
    assert!(outcome.tool_calls[0].id().starts_with("call_"));
}

#[test]
fn test_block_stop_finalizes_only_its_call() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let events = apply_all(
        &mut processor,
        vec![
            Delta::ToolCallStart {
                index: 1,
                id: Some("toolu_1".into()),
                name: "a".into(),
            },
            Delta::ToolCallStart {
                index: 2,
                id: Some("toolu_2".into()),
                name: "b".into(),
            },
            Delta::BlockStop { index: 1 },
        ],
    );
    assert_eq!(kinds(&events), vec!["tool_call"]);
    let (tail, outcome) = processor.finish();
    assert_eq!(kinds(&tail), vec!["tool_call"]);
    let ids: Vec<&str> = outcome.tool_calls.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["toolu_1", "toolu_2"]);
}

#[test]
fn test_empty_arguments_parse_to_empty_map() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    apply_all(
        &mut processor,
        vec![Delta::ToolCallStart {
            index: 0,
            id: Some("call_1".into()),
            name: "noop".into(),
        }],
    );
    let (_, outcome) = processor.finish();
    assert!(outcome.tool_calls[0].arguments().is_empty());
}

#[test]
fn test_usage_overlays_within_turn() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    apply_all(
        &mut processor,
        vec![
            Delta::Usage(UsageUpdate {
                prompt_tokens: Some(10),
                completion_tokens: Some(1),
                ..UsageUpdate::default()
            }),
            Delta::Usage(UsageUpdate {
                completion_tokens: Some(5),
                ..UsageUpdate::default()
            }),
        ],
    );
    let (_, outcome) = processor.finish();
    assert_eq!(outcome.usage, Usage::new(10, 5));
}

#[test]
fn test_provider_tool_lifecycle_and_additional_content() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let events = apply_all(
        &mut processor,
        vec![
            Delta::ProviderToolStart {
                index: 0,
                tool_type: "web_search".into(),
                item_id: "srvtoolu_1".into(),
                input: json!({}),
            },
            Delta::ToolCallArgs {
                index: 0,
                fragment: "{\"query\":\"rust\"}".into(),
            },
            Delta::BlockStop { index: 0 },
            Delta::ProviderToolResult {
                tool_type: "web_search".into(),
                item_id: "srvtoolu_1".into(),
                status: ProviderToolStatus::Completed,
                data: json!({"type": "web_search_tool_result"}),
            },
        ],
    );
    let (_, outcome) = processor.finish();

    assert_eq!(kinds(&events), vec!["provider_tool"; 3]);
    match &events[1].kind {
        EventKind::ProviderTool { status, data, .. } => {
            assert_eq!(*status, ProviderToolStatus::InputAvailable);
            assert_eq!(data["query"], "rust");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(outcome.tool_calls.is_empty());
    assert_eq!(state.additional_content.len(), 1);
}

#[test]
fn test_citation_recorded_on_state() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let events = apply_all(
        &mut processor,
        vec![Delta::Citation {
            citation: Citation {
                citation_type: "url_citation".into(),
                cited_text: None,
                url: Some("https://example.test".into()),
                title: None,
                raw: json!({}),
            },
            block_index: 0,
        }],
    );
    drop(processor);
    assert_eq!(kinds(&events), vec!["citation"]);
    assert_eq!(state.citations.len(), 1);
}

#[test]
fn test_fatal_vendor_error_is_recorded() {
    let mut state = StreamState::new();
    let mut processor = TurnProcessor::new(&mut state);
    let events = processor.apply(Delta::VendorError {
        error_type: "rate_limit_error".into(),
        message: "slow down".into(),
        fatal: true,
    });
    match &events[0].kind {
        EventKind::Error { recoverable, .. } => assert!(!recoverable),
        other => panic!("unexpected event {other:?}"),
    }
    let failure = processor.take_fatal().unwrap();
    assert_eq!(failure.error_type, "rate_limit_error");
    assert!(processor.take_fatal().is_none());
}

// -- run() over a byte stream --

/// Decoder for a tiny line protocol used only by these tests.
struct LineDecoder;

impl Decoder for LineDecoder {
    fn vendor(&self) -> &'static str {
        "lines"
    }

    fn framing(&self) -> Framing {
        Framing::JsonLines
    }

    fn decode(&self, frame: &Frame) -> Result<Option<Chunk>, DecodeError> {
        Chunk::parse(self.vendor(), frame).map(Some)
    }

    fn deltas(&self, chunk: &Chunk) -> Vec<Delta> {
        let mut deltas = Vec::new();
        if let Some(text) = chunk.str_at("/t") {
            deltas.push(Delta::Text(text.to_string()));
        }
        if chunk.bool_at("/done") == Some(true) {
            deltas.push(Delta::Finish(FinishReason::Stop));
        }
        if let Some(prompt) = chunk.u64_at("/p") {
            deltas.push(Delta::Usage(UsageUpdate {
                prompt_tokens: Some(prompt),
                completion_tokens: chunk.u64_at("/c"),
                ..UsageUpdate::default()
            }));
        }
        if let Some(error) = chunk.str_at("/error") {
            deltas.push(Delta::VendorError {
                error_type: error.to_string(),
                message: "failed".to_string(),
                fatal: true,
            });
        }
        deltas
    }
}

fn body(lines: &[&str]) -> ByteStream {
    let parts: Vec<Result<Bytes, TransportError>> = lines
        .iter()
        .map(|l| Ok(Bytes::from(format!("{l}\n"))))
        .collect();
    Box::pin(futures::stream::iter(parts))
}

#[tokio::test]
async fn test_run_reads_past_finish_for_usage() {
    let mut state = StreamState::new();
    let items: Vec<_> = run(
        &LineDecoder,
        body(&[r#"{"t":"Hi"}"#, r#"{"done":true}"#, r#"{"p":10,"c":5}"#]),
        &mut state,
    )
    .collect()
    .await;

    let last = items.last().unwrap().as_ref().unwrap();
    match last {
        TurnItem::Finished(outcome) => {
            assert_eq!(outcome.text, "Hi");
            assert_eq!(outcome.usage, Usage::new(10, 5));
            assert_eq!(outcome.finish_reason, FinishReason::Stop);
        }
        other => panic!("unexpected item {other:?}"),
    }
    assert_eq!(state.total_usage(), Usage::new(10, 5));
}

#[tokio::test]
async fn test_run_malformed_frame_is_fatal() {
    let mut state = StreamState::new();
    let items: Vec<_> = run(&LineDecoder, body(&[r#"{"t":"Hi"}"#, "{oops"]), &mut state)
        .collect()
        .await;

    assert!(matches!(
        items.last().unwrap(),
        Err(TurnError::Decode(DecodeError::MalformedPayload { vendor: "lines", .. }))
    ));
    assert!(!items.iter().any(|i| matches!(i, Ok(TurnItem::Finished(_)))));
}

#[tokio::test]
async fn test_run_fatal_vendor_error_follows_error_event() {
    let mut state = StreamState::new();
    let items: Vec<_> = run(
        &LineDecoder,
        body(&[r#"{"error":"rate_limit_error"}"#, r#"{"t":"never"}"#]),
        &mut state,
    )
    .collect()
    .await;

    assert_eq!(items.len(), 2);
    assert!(matches!(
        &items[0],
        Ok(TurnItem::Event(StreamEvent { kind: EventKind::Error { .. }, .. }))
    ));
    match &items[1] {
        Err(TurnError::Vendor { vendor, error_type, .. }) => {
            assert_eq!(*vendor, "lines");
            assert_eq!(error_type, "rate_limit_error");
        }
        other => panic!("unexpected item {other:?}"),
    }
}
