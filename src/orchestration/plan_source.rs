use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::DetectionTaskInfo;
use crate::pipeline::Plan;
use crate::registry::TaskRunnerError;

/// Resolves the plan a detection task runs
#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn plan_for(&self, info: &DetectionTaskInfo) -> Result<Plan, TaskRunnerError>;
}

/// Uses the plan embedded in the task payload
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePlanSource;

#[async_trait]
impl PlanSource for InlinePlanSource {
    async fn plan_for(&self, info: &DetectionTaskInfo) -> Result<Plan, TaskRunnerError> {
        info.plan.clone().ok_or_else(|| {
            TaskRunnerError::PlanUnavailable(format!(
                "detection task for alert {} carries no plan",
                info.alert_id
            ))
        })
    }
}

/// Plans registered per alert id. An inline plan in the payload wins.
#[derive(Debug, Default)]
pub struct InMemoryPlanSource {
    plans: RwLock<HashMap<i64, Plan>>,
}

impl InMemoryPlanSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, alert_id: i64, plan: Plan) {
        self.plans.write().insert(alert_id, plan);
    }
}

#[async_trait]
impl PlanSource for InMemoryPlanSource {
    async fn plan_for(&self, info: &DetectionTaskInfo) -> Result<Plan, TaskRunnerError> {
        if let Some(plan) = &info.plan {
            return Ok(plan.clone());
        }
        self.plans
            .read()
            .get(&info.alert_id)
            .cloned()
            .ok_or_else(|| {
                TaskRunnerError::PlanUnavailable(format!("no plan registered for alert {}", info.alert_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(plan: Option<Plan>) -> DetectionTaskInfo {
        DetectionTaskInfo {
            alert_id: 9,
            start: 0,
            end: 10,
            plan,
        }
    }

    fn plan(name: &str) -> Plan {
        Plan {
            name: name.to_string(),
            output_node: None,
            detection_interval: None,
            nodes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_inline_source_requires_plan() {
        let err = InlinePlanSource.plan_for(&info(None)).await.unwrap_err();
        assert!(matches!(err, TaskRunnerError::PlanUnavailable(_)));
    }

    #[tokio::test]
    async fn test_registered_plan_is_used_when_payload_has_none() {
        let source = InMemoryPlanSource::new();
        source.register(9, plan("registered"));

        assert_eq!(source.plan_for(&info(None)).await.unwrap().name, "registered");
        assert_eq!(
            source.plan_for(&info(Some(plan("inline")))).await.unwrap().name,
            "inline"
        );
    }
}
