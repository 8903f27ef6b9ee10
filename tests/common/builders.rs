//! Task, config and plan builders.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use detection_engine::config::TaskDriverConfig;
use detection_engine::models::{DetectionTaskInfo, Task, TaskInfo, TaskType};
use detection_engine::pipeline::{Plan, PlanNodeBean, PlanNodeInput};
use detection_engine::TaskStatus;

/// A WAITING task as it would be read from the store
pub fn waiting_task(id: i64, version: i64, create_time: DateTime<Utc>) -> Task {
    Task {
        id,
        task_type: TaskType::Detection,
        status: TaskStatus::Waiting,
        job_name: format!("DETECTION_{id}"),
        payload: "{}".to_string(),
        worker_id: None,
        version,
        create_time,
        start_time: None,
        end_time: None,
        last_active_time: None,
        message: None,
    }
}

/// A RUNNING task owned by `worker_id`
pub fn running_task(id: i64, worker_id: i64) -> Task {
    Task {
        status: TaskStatus::Running,
        worker_id: Some(worker_id),
        version: 1,
        start_time: Some(Utc::now()),
        ..waiting_task(id, 1, Utc::now())
    }
}

/// Driver timings short enough for paused-clock tests
pub fn fast_driver_config(max_parallel_tasks: usize) -> TaskDriverConfig {
    TaskDriverConfig {
        max_parallel_tasks,
        task_fetch_size_cap: 10,
        no_task_delay_ms: 1_000,
        task_failure_delay_ms: 5_000,
        random_delay_cap_ms: 0,
        max_task_run_time_ms: 10_000,
        heartbeat_interval_ms: 2_000,
        active_threshold_multiplier: 3,
    }
}

pub fn detection_payload(plan: Plan) -> String {
    TaskInfo::Detection(DetectionTaskInfo {
        alert_id: 1,
        start: 0,
        end: 100,
        plan: Some(plan),
    })
    .to_payload()
    .unwrap()
}

pub fn plan(name: &str, output_node: &str, nodes: Vec<PlanNodeBean>) -> Plan {
    Plan {
        name: name.to_string(),
        output_node: Some(output_node.to_string()),
        detection_interval: None,
        nodes,
    }
}

pub fn node(name: &str, node_type: &str) -> PlanNodeBean {
    PlanNodeBean::new(name, node_type)
}

pub fn input(source: &str) -> PlanNodeInput {
    PlanNodeInput::from_node(source)
}

/// Rows `(ts, met)` at the given timestamps
pub fn metric_rows(points: &[(i64, f64)]) -> Vec<Vec<Value>> {
    points
        .iter()
        .map(|(ts, met)| vec![json!(ts), json!(met)])
        .collect()
}
