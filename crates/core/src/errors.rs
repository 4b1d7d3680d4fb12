use thiserror::Error;

/// 主机核算错误类型定义
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("无效的容量数据: {0}")]
    InvalidCapacity(String),

    #[error(
        "主机资源不足: {host} (请求 cores={requested_cores} memory={requested_memory}, \
         空闲 cores={idle_cores} memory={idle_memory})"
    )]
    InsufficientCapacity {
        host: String,
        requested_cores: u64,
        requested_memory: u64,
        idle_cores: u64,
        idle_memory: u64,
    },

    #[error("主机未找到: {id}")]
    UnknownHost { id: String },

    #[error("无效的标签 '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("无效的锁状态: {0}")]
    InvalidLockState(String),

    #[error("分配未找到: {id}")]
    UnknownAllocation { id: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn invalid_capacity<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCapacity(msg.into())
    }
    pub fn unknown_host<S: Into<String>>(id: S) -> Self {
        Self::UnknownHost { id: id.into() }
    }
    pub fn invalid_tag<T: Into<String>, R: Into<String>>(tag: T, reason: R) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            reason: reason.into(),
        }
    }
    pub fn invalid_lock_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidLockState(msg.into())
    }
    pub fn unknown_allocation<S: Into<String>>(id: S) -> Self {
        Self::UnknownAllocation { id: id.into() }
    }
    pub fn persistence_error<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 调度器应当换一台主机重试，而不是当作故障处理
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LedgerError::InsufficientCapacity { .. })
    }

    /// 在边界处同步拒绝的输入错误，从不部分生效
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidCapacity(_)
                | LedgerError::InvalidTag { .. }
                | LedgerError::InvalidLockState(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            LedgerError::InvalidCapacity(_) => "主机上报的硬件数据无效",
            LedgerError::InsufficientCapacity { .. } => "主机空闲资源不足，请选择其他主机",
            LedgerError::UnknownHost { .. } => "请求的主机不存在",
            LedgerError::InvalidTag { .. } => "标签格式不合法",
            LedgerError::InvalidLockState(_) => "不支持的锁状态变更",
            LedgerError::UnknownAllocation { .. } => "请求的分配不存在",
            LedgerError::Configuration(_) => "系统配置有误",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Internal(err.to_string())
    }
}
