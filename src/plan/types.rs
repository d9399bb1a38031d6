//! 计划执行状态的数据类型

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// 步骤 ID；后端可能发字符串或整数，`2` 与 `"2"` 视为同一步
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for StepId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepIdVisitor;

        impl<'de> serde::de::Visitor<'de> for StepIdVisitor {
            type Value = StepId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a step id string or integer")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<StepId, E> {
                Ok(StepId(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<StepId, E> {
                Ok(StepId(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<StepId, E> {
                Ok(StepId(v.to_string()))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<StepId, E> {
                Ok(StepId(v.to_string()))
            }
        }

        deserializer.deserialize_any(StepIdVisitor)
    }
}

/// 计划整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Idle,
    Executing,
    Completed,
    Failed,
}

/// 单个步骤状态；后端保证 pending → running → 终态 单向推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub dependencies: Vec<StepId>,
}

impl Step {
    /// 首次被补丁引用时创建的空步骤
    pub fn pending(id: StepId) -> Self {
        Self {
            id,
            action: String::new(),
            status: StepStatus::Pending,
            reasoning: String::new(),
            expected_output: String::new(),
            parameters: serde_json::Map::new(),
            dependencies: Vec::new(),
        }
    }

    /// 把补丁中出现的字段覆盖到本步骤（后写覆盖先写，不校验状态推进方向）
    pub fn apply(&mut self, patch: &StepPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(action) = &patch.action {
            self.action = action.clone();
        }
        if let Some(reasoning) = &patch.reasoning {
            self.reasoning = reasoning.clone();
        }
        if let Some(expected_output) = &patch.expected_output {
            self.expected_output = expected_output.clone();
        }
        if let Some(parameters) = &patch.parameters {
            self.parameters = parameters.clone();
        }
        if let Some(dependencies) = &patch.dependencies {
            self.dependencies = dependencies.clone();
        }
    }
}

/// 针对单个步骤的增量更新，未出现的字段保持不变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPatch {
    pub id: StepId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<StepId>>,
}

impl StepPatch {
    pub fn status(id: impl Into<StepId>, status: StepStatus) -> Self {
        Self {
            id: id.into(),
            status: Some(status),
            action: None,
            reasoning: None,
            expected_output: None,
            parameters: None,
            dependencies: None,
        }
    }
}

/// `plan` 帧携带的更新（按 `event` 字段区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlanUpdate {
    /// 新计划开始，或同一目标的完整快照
    Started {
        goal: String,
        #[serde(default)]
        steps: Vec<Step>,
    },
    /// 单步增量
    StepUpdate { step: StepPatch },
    /// 整体完成
    Completed,
    /// 整体失败
    Failed {
        #[serde(default)]
        reason: Option<String>,
    },
    /// 清空当前计划（会话重置等）
    Cleared,
}

/// 当前计划状态（执行进度的唯一来源）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanState {
    pub goal: String,
    pub status: PlanStatus,
    /// 按声明顺序排列
    pub steps: Vec<Step>,
    pub active_step_id: Option<StepId>,
    pub error: Option<String>,
}

impl PlanState {
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    pub fn active_step(&self) -> Option<&Step> {
        self.active_step_id.as_ref().and_then(|id| self.step(id))
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// 完成百分比（0–100）；没有步骤时为 0
    pub fn progress_percentage(&self) -> f64 {
        let total = self.total_steps();
        if total == 0 {
            return 0.0;
        }
        self.completed_steps() as f64 / total as f64 * 100.0
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Executing
    }
}
