//! 计划状态归并器：把陆续到达的 `plan` 帧折叠成一个 PlanState
//!
//! 状态机：
//! - idle → executing：新目标的 started 帧初始化计划
//! - executing → executing：step_update 按 id 原地合并；running 的步骤成为 active
//! - executing → completed | failed：整体结束，清空 active
//! - any → idle：cleared 帧丢弃旧计划
//!
//! 每次变更都通过 `Arc::make_mut` 写入，外部持有的旧快照不会被原地修改。

use std::sync::Arc;

use super::types::{PlanState, PlanStatus, PlanUpdate, Step, StepPatch, StepStatus};

/// 计划状态归并器
#[derive(Debug, Default)]
pub struct PlanReconciler {
    state: Arc<PlanState>,
}

impl PlanReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前快照（廉价克隆）
    pub fn snapshot(&self) -> Arc<PlanState> {
        Arc::clone(&self.state)
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    /// 应用一条更新；返回状态是否发生变化
    pub fn apply(&mut self, update: PlanUpdate) -> bool {
        match update {
            PlanUpdate::Started { goal, steps } => {
                self.start(goal, steps);
                true
            }
            PlanUpdate::StepUpdate { step } => self.patch(step),
            PlanUpdate::Completed => self.finish(PlanStatus::Completed, None),
            PlanUpdate::Failed { reason } => self.finish(PlanStatus::Failed, reason),
            PlanUpdate::Cleared => {
                if *self.state == PlanState::default() {
                    return false;
                }
                tracing::debug!("Plan cleared (goal: {})", self.state.goal);
                self.state = Arc::new(PlanState::default());
                true
            }
        }
    }

    fn start(&mut self, goal: String, steps: Vec<Step>) {
        if self.state.is_active() && self.state.goal == goal {
            // 同一目标的完整快照：整体替换步骤，active 仅在仍指向现存步骤时保留
            let state = Arc::make_mut(&mut self.state);
            state.steps = steps;
            let still_exists = state
                .active_step_id
                .as_ref()
                .is_some_and(|id| state.steps.iter().any(|s| &s.id == id));
            if !still_exists {
                state.active_step_id = None;
            }
            return;
        }

        tracing::info!("Plan started: {} ({} steps)", goal, steps.len());
        self.state = Arc::new(PlanState {
            goal,
            status: PlanStatus::Executing,
            steps,
            active_step_id: None,
            error: None,
        });
    }

    fn patch(&mut self, patch: StepPatch) -> bool {
        if !self.state.is_active() {
            tracing::warn!(
                "Dropping step update for {} while plan is {:?}",
                patch.id,
                self.state.status
            );
            return false;
        }

        let state = Arc::make_mut(&mut self.state);
        let index = match state.steps.iter().position(|s| s.id == patch.id) {
            Some(index) => index,
            None => {
                state.steps.push(Step::pending(patch.id.clone()));
                state.steps.len() - 1
            }
        };
        state.steps[index].apply(&patch);

        match patch.status {
            Some(StepStatus::Running) => state.active_step_id = Some(patch.id),
            Some(_) if state.active_step_id.as_ref() == Some(&patch.id) => {
                state.active_step_id = None;
            }
            _ => {}
        }
        true
    }

    fn finish(&mut self, status: PlanStatus, reason: Option<String>) -> bool {
        if self.state.status == PlanStatus::Idle {
            tracing::warn!("Dropping plan {:?} signal without an active plan", status);
            return false;
        }
        let state = Arc::make_mut(&mut self.state);
        state.status = status;
        state.active_step_id = None;
        if reason.is_some() {
            state.error = reason;
        }
        true
    }
}
