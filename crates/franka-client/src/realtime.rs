//! 实时调度适配
//!
//! 进入力矩控制循环前，请求提升当前线程的调度优先级。
//! 提升失败时按 `RealtimeConfig` 处理：`Enforce` 返回 `Realtime` 错误，
//! `Ignore` 记录警告后继续。

use crate::config::RealtimeConfig;
use crate::error::{FrankaError, Result};
use tracing::{info, warn};

/// 调度优先级提升能力
///
/// 默认实现为 `ThreadPriorityScheduler`，测试中可注入固定成功/失败的实现。
/// 会话需要能移动到专用控制线程上，因此实现必须是 `Send`。
pub trait RealtimeScheduler: Send {
    /// 提升调用线程的调度优先级，失败时返回诊断信息
    fn elevate(&self) -> std::result::Result<(), String>;
}

/// 基于 `thread-priority` 的调度器
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPriorityScheduler;

impl RealtimeScheduler for ThreadPriorityScheduler {
    #[cfg(feature = "realtime")]
    fn elevate(&self) -> std::result::Result<(), String> {
        use thread_priority::{ThreadPriority, set_current_thread_priority};

        set_current_thread_priority(ThreadPriority::Max).map_err(|e| {
            format!(
                "{:?}. On Linux, you may need to run with CAP_SYS_NICE or use rtkit",
                e
            )
        })
    }

    #[cfg(not(feature = "realtime"))]
    fn elevate(&self) -> std::result::Result<(), String> {
        Err("built without the `realtime` feature".to_string())
    }
}

/// 按策略请求实时调度
///
/// # 错误
///
/// `Enforce` 策略下提升失败返回 `ErrorKind::Realtime`。
pub fn acquire(policy: RealtimeConfig, scheduler: &dyn RealtimeScheduler) -> Result<()> {
    match scheduler.elevate() {
        Ok(()) => {
            info!("Control thread priority set to MAX (realtime)");
            Ok(())
        },
        Err(reason) => match policy {
            RealtimeConfig::Enforce => Err(FrankaError::realtime(format!(
                "unable to set realtime scheduling: {}",
                reason
            ))),
            RealtimeConfig::Ignore => {
                warn!(
                    "Failed to set realtime scheduling: {}. Continuing at default priority",
                    reason
                );
                Ok(())
            },
        },
    }
}
