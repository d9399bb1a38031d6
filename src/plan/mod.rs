//! 计划状态：多步骤任务执行的数据模型与归并器

mod reconciler;
mod types;

pub use reconciler::PlanReconciler;
pub use types::{PlanState, PlanStatus, PlanUpdate, Step, StepId, StepPatch, StepStatus};
