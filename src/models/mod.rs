pub mod task;
pub mod task_info;
pub mod task_result;

// Re-export core models for easy access
pub use task::{job_name, NewTask, Task, TaskType};
pub use task_info::{
    DetectionTaskInfo, MonitorTaskInfo, MonitorType, NotificationTaskInfo, TaskInfo,
    TaskInfoError,
};
pub use task_result::TaskResult;
