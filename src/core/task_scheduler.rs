//! 步骤并发限制
//!
//! 批次内的步骤各自作为独立任务并发执行。
//! 配置了 max_concurrent_steps 时，同时在飞的步骤数受 Semaphore 限制；未配置则整个批次同时运行。

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// 任务调度器：可选地持有步骤许可
#[derive(Clone, Debug, Default)]
pub struct TaskScheduler {
    step_semaphore: Option<Arc<Semaphore>>,
}

impl TaskScheduler {
    /// None 表示不限制；Some(0) 按 1 处理
    pub fn new(max_concurrent_steps: Option<usize>) -> Self {
        Self {
            step_semaphore: max_concurrent_steps.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// 获取一个步骤执行许可；不限制时返回 None。仅在 Semaphore 被关闭时失败
    pub async fn acquire_step(&self) -> Result<Option<OwnedSemaphorePermit>, AcquireError> {
        match &self.step_semaphore {
            Some(semaphore) => semaphore.clone().acquire_owned().await.map(Some),
            None => Ok(None),
        }
    }

    /// 剩余许可数；不限制时为 None
    pub fn available_permits(&self) -> Option<usize> {
        self.step_semaphore.as_ref().map(|s| s.available_permits())
    }
}
