//! Runs DETECTION tasks through the pipeline executor.
//!
//! The plan comes from a [`PlanSource`]; its detection interval is replaced
//! by the task's `[start, end)` window and every anomaly detector node that
//! does not name an alert gets the task's alert id. Each output of the plan's
//! output node becomes one [`TaskResult`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument};

use super::plan_source::{InlinePlanSource, PlanSource};
use crate::models::{DetectionTaskInfo, TaskInfo, TaskResult};
use crate::pipeline::operators::anomaly_detector::{AnomalyDetectorFactory, ALERT_ID_PARAM};
use crate::pipeline::{DetectionInterval, OperatorFactory, PipelineExecutor, Plan};
use crate::registry::{TaskContext, TaskRunner, TaskRunnerError};

pub struct PipelineTaskRunner {
    executor: PipelineExecutor,
    plan_source: Arc<dyn PlanSource>,
}

impl PipelineTaskRunner {
    pub fn new(executor: PipelineExecutor) -> Self {
        Self::with_plan_source(executor, Arc::new(InlinePlanSource))
    }

    pub fn with_plan_source(executor: PipelineExecutor, plan_source: Arc<dyn PlanSource>) -> Self {
        Self {
            executor,
            plan_source,
        }
    }

    async fn prepare_plan(&self, info: &DetectionTaskInfo) -> Result<Plan, TaskRunnerError> {
        let mut plan = self.plan_source.plan_for(info).await?;
        plan.detection_interval = Some(DetectionInterval::new(info.start, info.end));

        let detector_type = AnomalyDetectorFactory.node_type();
        for node in plan.nodes.iter_mut().filter(|n| n.node_type == detector_type) {
            node.params
                .entry(ALERT_ID_PARAM)
                .or_insert_with(|| json!(info.alert_id));
        }
        Ok(plan)
    }
}

#[async_trait]
impl TaskRunner for PipelineTaskRunner {
    #[instrument(skip(self, info, ctx), fields(task_id = ctx.task_id))]
    async fn execute(
        &self,
        info: TaskInfo,
        ctx: &TaskContext,
    ) -> Result<Vec<TaskResult>, TaskRunnerError> {
        let task_type = info.task_type();
        let TaskInfo::Detection(detection) = info else {
            return Err(TaskRunnerError::UnsupportedTaskInfo {
                runner: "PipelineTaskRunner",
                task_type,
            });
        };

        let plan = self.prepare_plan(&detection).await?;
        let outputs = self.executor.run(plan).await?;

        info!(
            alert_id = detection.alert_id,
            plan_name = %outputs.plan_name,
            output_count = outputs.outputs.len(),
            "Detection pipeline finished"
        );
        Ok(outputs
            .outputs
            .iter()
            .map(|(key, result)| TaskResult::new(key.clone(), result.kind(), result.summary()))
            .collect())
    }
}

impl std::fmt::Debug for PipelineTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineTaskRunner")
            .field("executor", &self.executor)
            .finish()
    }
}
