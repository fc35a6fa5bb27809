//! 运行上下文：显式传递的 run/attempt 标识
//!
//! 替代进程级「当前 Agent 名」之类的全局状态：每个组件调用都拿到同一个
//! RunContext，结构化日志统一携带 run_id / user_id / attempt 字段。

use uuid::Uuid;

/// 一次流水线运行的标识；attempt 由 VerificationLoop 在每轮开始时更新
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: String,
    pub user_id: String,
    /// 当前起草尝试（1 起；检索阶段为 0）
    pub attempt: usize,
}

impl RunContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            attempt: 0,
        }
    }

    /// 进入第 n 次尝试的上下文副本
    pub fn for_attempt(&self, attempt: usize) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}
