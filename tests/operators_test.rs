//! Builtin operators wired to in-process collaborators.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use common::*;
use detection_engine::config::PipelineConfig;
use detection_engine::constants::operator_keys::{
    ANOMALY_DETECTOR_OUTPUT_KEY, EVENT_FETCHER_OUTPUT_KEY, SQL_EXECUTION_OUTPUT_KEY,
};
use detection_engine::pipeline::{
    ApplicationContext, BoxError, DataTable, DetectionInterval, InMemoryDataSourceCache,
    InMemoryEventStore, NodeRegistry, OperatorResult, PipelineError, PipelineExecutor, SqlEngine,
    StaticDataSource,
};

fn table(columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> DataTable {
    DataTable::with_rows(columns.iter().map(|c| c.to_string()).collect(), rows)
}

fn executor_with(app: ApplicationContext) -> PipelineExecutor {
    PipelineExecutor::new(
        Arc::new(NodeRegistry::with_builtin_operators()),
        Arc::new(app),
        PipelineConfig::default(),
    )
}

fn cache_with(name: &str, data: DataTable) -> Arc<InMemoryDataSourceCache> {
    let cache = Arc::new(InMemoryDataSourceCache::new());
    cache.register(name, Arc::new(StaticDataSource::new(data)));
    cache
}

/// Reports the bound table names and their row counts
struct CountingSqlEngine;

#[async_trait]
impl SqlEngine for CountingSqlEngine {
    async fn execute(
        &self,
        sql: &str,
        tables: &BTreeMap<String, DataTable>,
    ) -> Result<DataTable, BoxError> {
        if sql.trim().is_empty() {
            return Err("empty statement".into());
        }
        Ok(table(
            &["table", "rows"],
            tables
                .iter()
                .map(|(name, t)| vec![json!(name), json!(t.row_count())])
                .collect(),
        ))
    }
}

#[tokio::test]
async fn test_saved_events_are_fetched_within_interval() {
    let holidays = table(
        &["name", "startTime", "endTime"],
        vec![
            vec![json!("new-year"), json!(0), json!(86_400_000)],
            vec![json!("midsummer"), json!(500_000_000), json!(586_400_000)],
        ],
    );
    let events = Arc::new(InMemoryEventStore::new());
    let executor = executor_with(
        ApplicationContext::new()
            .with_data_source_cache(cache_with("holidays", holidays))
            .with_event_store(events.clone()),
    );

    let save = plan(
        "save-holidays",
        "trigger",
        vec![
            node("fetch", "DataFetcher").with_param("component.dataSource", "holidays"),
            node("trigger", "EventTrigger")
                .with_param("eventType", "HOLIDAY")
                .with_input(input("fetch")),
        ],
    );
    let saved = executor.run(save).await.unwrap();
    let OperatorResult::Value(summary) = saved.outputs["output"].as_ref() else {
        panic!("expected a value summary");
    };
    assert_eq!(summary["savedEvents"], 2);
    assert_eq!(events.events().len(), 2);

    let mut load = plan(
        "load-holidays",
        "events",
        vec![node("events", "EventFetcher").with_param("eventTypes", "HOLIDAY")],
    );
    load.detection_interval = Some(DetectionInterval::new(0, 1_000_000));
    let loaded = executor.run(load).await.unwrap();

    let fetched = loaded.outputs[EVENT_FETCHER_OUTPUT_KEY].as_table().unwrap();
    assert_eq!(fetched.row_count(), 1);
    assert_eq!(fetched.value(0, "name"), Some(&json!("new-year")));
}

#[tokio::test]
async fn test_event_fetcher_requires_event_store() {
    let err = executor_with(ApplicationContext::new())
        .run(plan("events", "events", vec![node("events", "EventFetcher")]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::MissingCollaborator { .. }));
    assert!(err.is_plan_build_error());
}

#[tokio::test]
async fn test_label_post_processor_tags_matching_anomalies() {
    let data = table(&["ts", "met"], metric_rows(&[(0, 42.0), (60, 12.0), (120, 1.0)]));
    let executor =
        executor_with(ApplicationContext::new().with_data_source_cache(cache_with("m", data)));
    let plan = plan(
        "labelled",
        "post",
        vec![
            node("fetch", "DataFetcher").with_param("component.dataSource", "m"),
            node("detect", "AnomalyDetector")
                .with_param("type", "threshold")
                .with_param("component.max", 10.0)
                .with_input(input("fetch")),
            node("post", "PostProcessor")
                .with_param("type", "label")
                .with_param("component.labelName", "spike")
                .with_param("component.minValue", 40.0)
                .with_input(input("detect")),
        ],
    );

    let outputs = executor.run(plan).await.unwrap();

    let detection = outputs.outputs[ANOMALY_DETECTOR_OUTPUT_KEY]
        .as_detection()
        .unwrap();
    assert_eq!(detection.anomalies.len(), 2);
    let labelled: Vec<i64> = detection
        .anomalies
        .iter()
        .filter(|a| a.labels.iter().any(|l| l.name == "spike"))
        .map(|a| a.start_time)
        .collect();
    assert_eq!(labelled, vec![0]);
}

#[tokio::test]
async fn test_unknown_post_processor_type_is_rejected() {
    let err = executor_with(ApplicationContext::new())
        .run(plan(
            "bad",
            "post",
            vec![node("post", "PostProcessor").with_param("type", "nope")],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidParam { ref param, .. } if param == "type"));
}

#[tokio::test]
async fn test_sql_execution_receives_named_tables() {
    let data = table(&["ts", "met"], metric_rows(&[(0, 1.0), (60, 2.0)]));
    let executor = executor_with(
        ApplicationContext::new()
            .with_data_source_cache(cache_with("m", data))
            .with_sql_engine(Arc::new(CountingSqlEngine)),
    );
    let plan = plan(
        "sql",
        "query",
        vec![
            node("fetch", "DataFetcher").with_param("component.dataSource", "m"),
            node("query", "SqlExecution")
                .with_param("sql", "SELECT * FROM revenue")
                .with_input(input("fetch").with_target_property("revenue")),
        ],
    );

    let outputs = executor.run(plan).await.unwrap();

    let result = outputs.outputs[SQL_EXECUTION_OUTPUT_KEY].as_table().unwrap();
    assert_eq!(result.value(0, "table"), Some(&json!("revenue")));
    assert_eq!(result.value(0, "rows"), Some(&json!(2)));
}

#[tokio::test(start_paused = true)]
async fn test_delay_and_echo_forward_their_inputs() {
    let executor = executor_with(ApplicationContext::new());
    let plan = plan(
        "echo",
        "wait",
        vec![
            node("hello", "Echo").with_param("echo", json!({"greeting": "hi"})),
            node("wait", "Delay")
                .with_param("delayMillis", 5_000)
                .with_input(input("hello")),
        ],
    );

    let started = tokio::time::Instant::now();
    let outputs = executor.run(plan).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(5_000));
    let OperatorResult::Value(value) = outputs.outputs["output"].as_ref() else {
        panic!("expected the echoed value");
    };
    assert_eq!(value["greeting"], "hi");
}
