//! End-to-end runs of the built-in `simple.js` topologies

use stackprint::harness::ScenarioMode;
use stackprint::topology::{
    ASYNC_ENTRY, ASYNC_KINDS, SIMPLE_JS_URL, SYNC_ENTRY, SYNC_KINDS, simple_registry,
    simple_scenarios, simple_scope_index,
};
use stackprint::{
    ComparisonResult, EngineDialect, Harness, HarnessReport, InvocationKind, NormalizedChain,
    Scenario, ScenarioOutcome, StackprintConfig, compare,
};

fn harness(config: StackprintConfig) -> Harness {
    Harness::new(simple_registry(SIMPLE_JS_URL).unwrap(), config)
}

fn config() -> StackprintConfig {
    StackprintConfig::default().with_path_prefix("http://127.0.0.1:8080/")
}

async fn capture(h: &Harness, scenario: &Scenario, engine: EngineDialect) -> NormalizedChain {
    let raw = h.capture_trace(scenario, engine).await.unwrap();
    h.normalize_trace(scenario, &raw).unwrap()
}

fn kinds_outermost_first(chain: &NormalizedChain) -> Vec<InvocationKind> {
    let mut kinds: Vec<_> = chain.frames().map(|f| f.kind).collect();
    kinds.reverse();
    kinds
}

#[tokio::test]
async fn test_sync_chain_classifies_every_frame() {
    let h = harness(config());
    let scenario = Scenario::sync("sync", SYNC_ENTRY);

    for engine in EngineDialect::ALL {
        let chain = capture(&h, &scenario, engine).await;
        assert_eq!(chain.frame_count(), 12, "{}", engine);
        assert_eq!(kinds_outermost_first(&chain), SYNC_KINDS, "{}", engine);
        assert_eq!(chain.boundary_count(), 0);
    }
}

#[tokio::test]
async fn test_repeated_captures_compare_equal() {
    let h = harness(config());
    let scenario = Scenario::sync("sync", SYNC_ENTRY);

    let first = capture(&h, &scenario, EngineDialect::V8).await;
    let second = capture(&h, &scenario, EngineDialect::V8).await;
    assert_eq!(compare(&first, &second, h.config()), ComparisonResult::Equal);

    let firefox = capture(&h, &scenario, EngineDialect::SpiderMonkey).await;
    assert_eq!(compare(&first, &firefox, h.config()), ComparisonResult::Equal);
}

#[tokio::test]
async fn test_async_chain_has_boundaries() {
    let h = harness(config());
    let scenario = Scenario::asynchronous("async", ASYNC_ENTRY);

    let v8 = capture(&h, &scenario, EngineDialect::V8).await;
    assert_eq!(kinds_outermost_first(&v8), ASYNC_KINDS);
    assert!(v8.boundary_count() >= 1);

    let jsc = capture(&h, &scenario, EngineDialect::JavaScriptCore).await;
    assert_eq!(jsc.boundary_count(), 0);

    let lenient = config().lenient(true);
    assert!(compare(&v8, &jsc, &lenient).is_equal());
    assert!(!compare(&v8, &jsc, h.config()).is_equal());
}

#[tokio::test]
async fn test_sync_run_of_async_chain_has_no_boundaries() {
    let h = harness(config());
    let scenario = Scenario::sync("async chain, no suspension", ASYNC_ENTRY);
    assert_eq!(scenario.mode, ScenarioMode::Sync);

    let result = h.run_scenario(&scenario, EngineDialect::V8).await;
    match &result.outcome {
        ScenarioOutcome::Compared { actual, .. } => assert_eq!(actual.boundary_count(), 0),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(result.passed());
}

#[tokio::test]
async fn test_built_in_scenarios_report() {
    let strict = harness(config());
    let results = strict
        .run_all(&simple_scenarios(), &EngineDialect::ALL)
        .await;
    let report = HarnessReport::from_results(&results);

    assert_eq!(report.total, 6);
    // JavaScriptCore does not mark resumed frames
    assert_eq!(report.passed, 5);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].engine, EngineDialect::JavaScriptCore);
    assert_eq!(report.failures[0].divergence_index, Some(1));

    let lenient = harness(config().lenient(true));
    let results = lenient
        .run_all(&simple_scenarios(), &EngineDialect::ALL)
        .await;
    assert!(HarnessReport::from_results(&results).all_passed());
}

#[tokio::test]
async fn test_static_scopes_classify_like_the_registry() {
    let h = harness(config().lenient(true)).with_scopes(simple_scope_index().unwrap());
    let results = h.run_all(&simple_scenarios(), &EngineDialect::ALL).await;
    for result in &results {
        assert!(result.passed(), "{} [{}]: {:?}", result.scenario, result.engine, result.outcome);
    }
}
