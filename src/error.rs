use std::fmt;

/// 定时器错误类型 (Timer Error Type)
///
/// Operator-facing failures returned by the configuration builder and the
/// timer facade. User-task failures are reported through the unhandled
/// failure hook instead and never surface here.
///
/// 由配置构建器和定时器门面返回的操作错误。用户任务的失败通过未处理失败回调上报，
/// 不会出现在这里。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// 提交被拒绝：挂起的超时数量已达到上限
    /// Submission rejected: the number of pending timeouts reached the limit
    Rejected {
        pending: u64,
        limit: u64,
    },

    /// 操作在错误的状态下执行（定时器已关闭）
    /// Operation performed in the wrong state (timer already shut down)
    InvalidState {
        reason: &'static str,
    },

    /// 配置验证失败 (Configuration validation failed)
    InvalidConfiguration {
        field: &'static str,
        reason: String,
    },
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::Rejected { pending, limit } => {
                write!(
                    f,
                    "Submission rejected: {} pending timeouts, limit is {}",
                    pending, limit
                )
            }
            TimerError::InvalidState { reason } => {
                write!(f, "Invalid timer state: {}", reason)
            }
            TimerError::InvalidConfiguration { field, reason } => {
                write!(f, "Configuration validation failed ({}): {}", field, reason)
            }
        }
    }
}

impl std::error::Error for TimerError {}
