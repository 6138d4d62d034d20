// crates/flowruntime/tests/store_test.rs

use flowcore::{
    handler_fn, ConditionalRoute, ControlType, Executor, FlowDefinition, FlowInfo, NodeError,
    NodeSpec, TriggerSpec,
};
use flowruntime::{
    Admission, HandlerFactory, HandlerRegistry, Node, NodeHandler, PathEvaluator, RunnerHandle,
    RunnerStatus, Store, Termination, Transition,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn join_node(trigger: TriggerSpec) -> Node {
    let spec = NodeSpec::control(ControlType::Join).with_trigger(trigger);
    Node::new("join", spec, &HandlerRegistry::new()).unwrap()
}

#[test]
fn test_result_reads_are_stable() {
    let store = Store::new();
    assert!(store.result("a").is_none());

    store.record_result("a", FlowInfo::new(json!({ "n": 1 })));
    let first = store.result("a").unwrap();
    let second = store.result("a").unwrap();
    assert!(first.ptr_eq(&second));

    store.record_result("a", FlowInfo::new(json!({ "n": 2 })));
    assert_eq!(store.result("a").unwrap().to_value(), json!({ "n": 2 }));
    assert_eq!(first.to_value(), json!({ "n": 1 }), "earlier reads keep their value");
    assert_eq!(store.results().len(), 1);
}

#[test]
fn test_register_node_builds_once() {
    let store = Store::new();
    let builds = AtomicUsize::new(0);
    let registry = HandlerRegistry::new();

    let build = || {
        builds.fetch_add(1, Ordering::SeqCst);
        Node::new("a", NodeSpec::activity(), &registry)
    };
    let first = store.register_node("a", build).unwrap();
    let second = store
        .register_node("a", || {
            builds.fetch_add(1, Ordering::SeqCst);
            Node::new("a", NodeSpec::activity(), &registry)
        })
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(store.node("a").is_some());
    assert!(store.node("b").is_none());
}

#[test]
fn test_register_node_propagates_construction_errors() {
    let store = Store::new();
    let err = store
        .register_node("custom", || Node::new("custom", NodeSpec::custom(), &HandlerRegistry::new()))
        .err()
        .unwrap();
    assert_eq!(err, NodeError::MissingHandler("custom".to_string()));
    assert!(store.node("custom").is_none());
}

#[test]
fn test_terminate_only_leaves_siblings_running() {
    let store = Store::new();
    let group = Uuid::new_v4();
    let (a, b, c) = (RunnerHandle::new(), RunnerHandle::new(), RunnerHandle::new());
    for runner in [&a, &b, &c] {
        store.join(group, runner.clone());
    }

    assert_eq!(store.terminate_group(group, Termination::Only(b.id())), 1);
    assert_eq!(b.status(), RunnerStatus::Fulfilled);
    assert!(a.is_pending() && c.is_pending());
    assert_eq!(store.group_members(group), vec![a.id(), c.id()]);

    // already gone: nothing to do
    assert_eq!(store.terminate_group(group, Termination::Only(b.id())), 0);
}

#[test]
fn test_terminate_except_for_keeps_single_survivor() {
    let store = Store::new();
    let group = Uuid::new_v4();
    let (a, b, c) = (RunnerHandle::new(), RunnerHandle::new(), RunnerHandle::new());
    for runner in [&a, &b, &c] {
        store.join(group, runner.clone());
    }
    b.fulfill();

    assert_eq!(store.terminate_group(group, Termination::ExceptFor(c.id())), 2);
    assert_eq!(a.status(), RunnerStatus::Fulfilled);
    assert_eq!(b.status(), RunnerStatus::Fulfilled);
    assert!(c.is_pending());
    assert_eq!(store.group_members(group), vec![c.id()]);
}

#[test]
fn test_terminate_all_clears_group() {
    let store = Store::new();
    let group = Uuid::new_v4();
    let other = Uuid::new_v4();
    let (a, b, outsider) = (RunnerHandle::new(), RunnerHandle::new(), RunnerHandle::new());
    store.join(group, a.clone());
    store.join(group, b.clone());
    store.join(other, outsider.clone());

    assert_eq!(store.terminate_group(group, Termination::All), 2);
    assert!(!a.is_pending() && !b.is_pending());
    assert!(outsider.is_pending());
    assert!(store.group_members(group).is_empty());
    assert_eq!(store.group_count(), 1);

    assert_eq!(store.drain(), 1);
    assert!(!outsider.is_pending());
    assert_eq!(store.group_count(), 0);
}

#[test]
fn test_all_trigger_waits_for_every_predecessor() {
    let node = join_node(TriggerSpec::all(["a", "b"]));
    let group = Uuid::new_v4();

    assert_eq!(node.can_proceed(group, Some("a")).unwrap(), Admission::Wait);
    assert_eq!(node.can_proceed(group, Some("a")).unwrap(), Admission::Wait);
    assert!(node.trigger_result().is_none());

    assert_eq!(
        node.can_proceed(group, Some("b")).unwrap(),
        Admission::Satisfied(vec!["a".to_string(), "b".to_string()])
    );
    assert_eq!(node.trigger_result(), Some(vec!["a".to_string(), "b".to_string()]));

    // fired groups never fire again
    assert_eq!(node.can_proceed(group, Some("b")).unwrap(), Admission::Wait);
}

#[test]
fn test_all_trigger_tracks_groups_separately() {
    let node = join_node(TriggerSpec::all(["a", "b"]));
    let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());

    assert_eq!(node.can_proceed(g1, Some("b")).unwrap(), Admission::Wait);
    assert_eq!(node.can_proceed(g2, Some("a")).unwrap(), Admission::Wait);
    assert!(node.can_proceed(g1, Some("a")).unwrap().is_admitted());
    assert_eq!(node.arrivals(g2), vec!["a".to_string()]);
}

#[test]
fn test_race_trigger_is_one_shot() {
    let node = join_node(TriggerSpec::race(["a", "b"]));
    let group = Uuid::new_v4();

    assert_eq!(
        node.can_proceed(group, Some("b")).unwrap(),
        Admission::Satisfied(vec!["b".to_string()])
    );
    assert_eq!(node.can_proceed(group, Some("a")).unwrap(), Admission::Wait);
    assert_eq!(node.can_proceed(group, Some("b")).unwrap(), Admission::Wait);
}

#[test]
fn test_gated_node_requires_predecessor() {
    let node = join_node(TriggerSpec::all(["a"]));
    let err = node.can_proceed(Uuid::new_v4(), None).unwrap_err();
    assert_eq!(err, NodeError::AdmissionViolation { node: "join".to_string() });

    let plain = Node::new("plain", NodeSpec::activity(), &HandlerRegistry::new()).unwrap();
    assert_eq!(plain.can_proceed(Uuid::new_v4(), None).unwrap(), Admission::Proceed);
}

#[test]
fn test_join_result_folds_latest_predecessor_results() {
    let store = Store::new();
    store.record_result("a", FlowInfo::new(json!(1)));
    store.record_result("b", FlowInfo::new(json!({ "x": true })));

    let node = join_node(TriggerSpec::all(["a", "b", "c"]));
    let folded = node.join_result(&["a".to_string(), "b".to_string(), "c".to_string()], &store);
    assert_eq!(folded, json!({ "a": 1, "b": { "x": true }, "c": null }));
}

#[test]
fn test_handler_resolution_by_kind() {
    struct Echo;

    impl HandlerFactory for Echo {
        fn create(&self) -> Result<Arc<dyn flowcore::Handler>, NodeError> {
            Ok(handler_fn(|payload| async move { Ok(payload.flow_info.to_value()) }))
        }

        fn handler_type(&self) -> &str {
            "echo"
        }
    }

    let mut registry = HandlerRegistry::new();
    registry.register_factory(Arc::new(Echo));
    registry.register("bound", handler_fn(|_| async { Ok(Value::Null) }));

    let custom = Node::new("c", NodeSpec::custom().with_handler_source("echo"), &registry).unwrap();
    assert!(matches!(custom.handler(), NodeHandler::Handler(_)));

    let bound = Node::new("bound", NodeSpec::custom(), &registry).unwrap();
    assert!(matches!(bound.handler(), NodeHandler::Handler(_)));

    let bare = Node::new("bare", NodeSpec::activity(), &registry).unwrap();
    assert!(matches!(bare.handler(), NodeHandler::None));
    assert!(!bare.has_handler());

    let decide = Node::new("d", NodeSpec::control(ControlType::Decide), &registry).unwrap();
    assert!(matches!(decide.handler(), NodeHandler::None));

    let join = Node::new("j", NodeSpec::control(ControlType::Join), &registry).unwrap();
    assert!(matches!(join.handler(), NodeHandler::Join));

    let unknown = Node::new("u", NodeSpec::custom().with_handler_source("nope"), &registry);
    assert!(matches!(unknown, Err(NodeError::Configuration(_))));
}

#[test]
fn test_properties_resolve_literals_and_variables() {
    let mut spec = NodeSpec::activity()
        .with_prop("limit", 10)
        .with_variable("user", "context.user.name");
    spec.props.insert("bare".to_string(), json!("plain"));
    spec.props.insert(
        "nested".to_string(),
        json!({
            "format": "custom",
            "value": {
                "status": { "format": "variable", "value": "results.fetch.status" },
                "fixed": 3
            }
        }),
    );
    spec.props.insert(
        "list".to_string(),
        json!({
            "format": "custom",
            "value": [1, { "format": "variable", "value": "node" }]
        }),
    );

    let node = Node::new("n", spec, &HandlerRegistry::new()).unwrap();
    let mut results = std::collections::HashMap::new();
    results.insert("fetch".to_string(), FlowInfo::new(json!({ "status": 201 })));
    let executor = Executor::detached("n").with_results(results);

    let props = node
        .resolve_properties(&PathEvaluator, &json!({ "user": { "name": "ada" } }), &executor)
        .unwrap();

    assert_eq!(
        Value::Object(props),
        json!({
            "limit": 10,
            "user": "ada",
            "bare": "plain",
            "nested": { "status": 201, "fixed": 3 },
            "list": [1, "n"]
        })
    );
}

#[test]
fn test_variable_property_must_be_a_string() {
    let mut spec = NodeSpec::activity();
    spec.props.insert("bad".to_string(), json!({ "format": "variable", "value": 5 }));
    let node = Node::new("n", spec, &HandlerRegistry::new()).unwrap();

    let err = node
        .resolve_properties(&PathEvaluator, &json!({}), &Executor::detached("n"))
        .unwrap_err();
    assert!(matches!(err, NodeError::Expression(_)));
}

#[test]
fn test_transition_resolution() {
    let definition = FlowDefinition::new("start")
        .with_node("start", NodeSpec::activity())
        .with_node("split", NodeSpec::control(ControlType::Parallel))
        .with_node("join", NodeSpec::control(ControlType::Join))
        .with_node("decide", NodeSpec::control(ControlType::Decide))
        .with_node("x", NodeSpec::activity())
        .with_node("y", NodeSpec::activity())
        .route("start", "split")
        .route("split", ["x", "y"])
        .route(
            "decide",
            vec![ConditionalRoute::when("false", "x"), ConditionalRoute::when("0", "y")],
        );

    let context = json!({});
    let transition = Transition::new(&definition, &PathEvaluator, &context);
    let executor = Executor::detached("start");

    assert_eq!(transition.resolve_next("start", &executor).unwrap(), vec!["split"]);
    assert_eq!(transition.resolve_next("split", &executor).unwrap(), vec!["x", "y"]);
    assert!(transition.resolve_next("x", &executor).unwrap().is_empty());
    // nothing matched and no fallback: dead end
    assert!(transition.resolve_next("decide", &executor).unwrap().is_empty());

    assert!(transition.is_split("split"));
    assert!(!transition.is_split("start"));
    assert!(transition.is_join("join"));
    assert!(!transition.is_join("missing"));
}
