// crates/flownodes/tests/handlers_test.rs

use flowcore::{
    ControlType, EventBus, ExecutionEvent, ExecutionId, Executor, FlowDefinition, FlowInfo,
    Handler, NodeError, NodeEvent, NodeSpec, Payload, TriggerSpec,
};
use flownodes::{
    register_all, DebugHandler, DelayHandler, HttpRequestHandler, JsonParseHandler,
    JsonStringifyHandler,
};
use flowruntime::{FlowRuntime, HandlerRegistry, RuntimeConfig};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("flownodes=debug,flowruntime=debug")
        .with_test_writer()
        .try_init();
}

fn payload(props: Value, flow_info: Value) -> Payload {
    let props: Map<String, Value> = match props {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Payload {
        context: Arc::new(json!({})),
        props,
        flow_info: FlowInfo::new(flow_info),
        executor: Executor::detached("test"),
    }
}

/// Run a handler with its node events captured
async fn handle_observed(
    handler: &dyn Handler,
    props: Value,
    flow_info: Value,
) -> (Result<Value, NodeError>, Vec<NodeEvent>) {
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut input = payload(props, flow_info);
    input.executor = Executor::detached("observed")
        .with_events(bus.create_emitter(ExecutionId::nil(), "observed"));

    let result = handler.handle(input).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ExecutionEvent::NodeEvent { event, .. } = event {
            events.push(event);
        }
    }
    (result, events)
}

fn registry() -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    register_all(&mut registry);
    Arc::new(registry)
}

#[test]
fn test_register_all_lists_builtin_types() {
    let registry = registry();
    assert_eq!(
        registry.list_handler_types(),
        vec!["debug.log", "http.request", "json.parse", "json.stringify", "time.delay"]
    );

    let metadata = registry.get_metadata("time.delay").unwrap();
    assert_eq!(metadata.category, "time");
    assert!(registry.get_metadata("docker.run").is_none());
}

#[tokio::test]
async fn test_json_parse() {
    let parsed = JsonParseHandler
        .handle(payload(json!({ "json": "{\"a\": [1, 2]}" }), Value::Null))
        .await
        .unwrap();
    assert_eq!(parsed, json!({ "a": [1, 2] }));

    let err = JsonParseHandler
        .handle(payload(json!({ "json": 5 }), Value::Null))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        NodeError::InvalidInputType {
            field: "json".to_string(),
            expected: "string".to_string(),
            actual: "number".to_string(),
        }
    );

    let err = JsonParseHandler
        .handle(payload(json!({ "json": "{oops" }), Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::HandlerFailure(_)));

    let err = JsonParseHandler.handle(payload(json!({}), Value::Null)).await.unwrap_err();
    assert_eq!(err, NodeError::MissingInput("json".to_string()));
}

#[tokio::test]
async fn test_json_stringify_defaults_to_flow_info() {
    let out = JsonStringifyHandler
        .handle(payload(json!({ "value": { "k": true } }), json!("ignored")))
        .await
        .unwrap();
    assert_eq!(out, json!("{\"k\":true}"));

    let out = JsonStringifyHandler
        .handle(payload(json!({}), json!([1, "two"])))
        .await
        .unwrap();
    assert_eq!(out, json!("[1,\"two\"]"));
}

#[tokio::test]
async fn test_delay_passes_flow_info_through() {
    let started = Instant::now();
    let out = DelayHandler
        .handle(payload(json!({ "delay_ms": 20 }), json!({ "kept": 1 })))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(out, json!({ "kept": 1 }));

    let err = DelayHandler
        .handle(payload(json!({ "delay_ms": "soon" }), Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::InvalidInputType { .. }));
}

#[tokio::test]
async fn test_http_rejects_bad_input_before_sending() {
    let handler = HttpRequestHandler::new();

    let err = handler
        .handle(payload(json!({ "url": "http://localhost", "method": "PATCH" }), Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err, NodeError::Configuration("Unsupported method: PATCH".to_string()));

    let err = handler.handle(payload(json!({ "url": 1 }), Value::Null)).await.unwrap_err();
    assert!(matches!(err, NodeError::InvalidInputType { field, .. } if field == "url"));

    let err = handler
        .handle(payload(json!({ "url": "not a url" }), Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::HandlerFailure(_)));
}

#[tokio::test]
async fn test_builtin_handlers_run_inside_a_flow() {
    init_tracing();

    let definition = FlowDefinition::new("parse")
        .with_node(
            "parse",
            NodeSpec::custom()
                .with_handler_source("json.parse")
                .with_variable("json", "context.raw"),
        )
        .with_node("fanout", NodeSpec::control(ControlType::Parallel))
        .with_node(
            "log",
            NodeSpec::custom()
                .with_handler_source("debug.log")
                .with_variable("message", "results.parse.greeting"),
        )
        .with_node(
            "wait",
            NodeSpec::custom().with_handler_source("time.delay").with_prop("delay_ms", 10),
        )
        .with_node(
            "merge",
            NodeSpec::control(ControlType::Join).with_trigger(TriggerSpec::all(["log", "wait"])),
        )
        .with_node("encode", NodeSpec::custom().with_handler_source("json.stringify"))
        .route("parse", "fanout")
        .route("fanout", ["log", "wait"])
        .route("log", "merge")
        .route("wait", "merge")
        .route("merge", "encode");

    let runtime = FlowRuntime::with_registry(
        registry(),
        RuntimeConfig::default().with_node_timeout(Duration::from_secs(5)),
    );
    let mut events = runtime.subscribe_events();

    let result = runtime
        .start(&definition, json!({ "raw": "{\"greeting\": \"hello\"}" }), None)
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failures);
    assert_eq!(result.result("log").unwrap().to_value(), json!({ "message": "hello" }));
    assert_eq!(
        result.result("wait").unwrap().to_value(),
        json!({ "greeting": "hello" })
    );

    let encoded = result.result("encode").unwrap().to_value();
    let decoded: Value = serde_json::from_str(encoded.as_str().unwrap()).unwrap();
    assert_eq!(
        decoded,
        json!({ "log": { "message": "hello" }, "wait": { "greeting": "hello" } })
    );

    let mut debug_lines = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeEvent { node, event: NodeEvent::Info { message }, .. } = event {
            if node == "log" {
                debug_lines.push(message);
            }
        }
    }
    assert_eq!(debug_lines.first().map(String::as_str), Some("DEBUG: hello"));
}

#[tokio::test]
async fn test_handlers_report_through_node_events() {
    let (result, events) = handle_observed(&DelayHandler, json!({ "delay_ms": 1 }), Value::Null).await;
    assert!(result.is_ok());
    let percents: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            NodeEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![0.0, 100.0]);

    let (result, events) = handle_observed(&JsonParseHandler, json!({ "json": "[1]" }), Value::Null).await;
    assert_eq!(result.unwrap(), json!([1]));
    assert!(events
        .iter()
        .any(|e| matches!(e, NodeEvent::Data { port, value } if port == "parsed" && *value == json!([1]))));

    let (result, events) = handle_observed(&DebugHandler, json!({}), Value::Null).await;
    assert_eq!(result.unwrap(), json!({ "message": "(no message)" }));
    assert!(matches!(events.first(), Some(NodeEvent::Warning { .. })));
}
