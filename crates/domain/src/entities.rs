use chrono::{DateTime, Utc};
use host_ledger_core::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capacity::HostResources;
use crate::tags::TagSet;

/// 主机唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(Uuid);

impl HostId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
    pub fn parse(id: &str) -> LedgerResult<Self> {
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| LedgerError::unknown_host(id))
    }
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 分配（主机池）标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(Uuid);

impl AllocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
    pub fn parse(id: &str) -> LedgerResult<Self> {
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| LedgerError::unknown_allocation(id))
    }
}

impl Default for AllocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    /// 完整名称，例如 `film.prod`
    pub name: String,
    /// 写入主机标签集的短名
    pub tag: String,
}

impl Allocation {
    pub fn new(name: &str) -> Self {
        Self {
            id: AllocationId::new(),
            name: name.to_string(),
            tag: name.to_string(),
        }
    }
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }
}

/// 操作来源，用于锁状态变更审计
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    pub fn new<S: Into<String>>(actor: S) -> Self {
        Self(actor.into())
    }
    /// 由硬件上报触发的变更
    pub fn report() -> Self {
        Self("report".to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HardwareState {
    Up,
    Down,
    Rebooting,
    RebootWhenIdle,
    Startup,
    Unknown,
}

impl HardwareState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareState::Up => "UP",
            HardwareState::Down => "DOWN",
            HardwareState::Rebooting => "REBOOTING",
            HardwareState::RebootWhenIdle => "REBOOT_WHEN_IDLE",
            HardwareState::Startup => "STARTUP",
            HardwareState::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for HardwareState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(HardwareState::Up),
            "DOWN" => Ok(HardwareState::Down),
            "REBOOTING" => Ok(HardwareState::Rebooting),
            "REBOOT_WHEN_IDLE" => Ok(HardwareState::RebootWhenIdle),
            "STARTUP" => Ok(HardwareState::Startup),
            "UNKNOWN" => Ok(HardwareState::Unknown),
            _ => Err(LedgerError::Serialization(format!(
                "Invalid hardware state: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    Open,
    Locked,
    NimbyLocked,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Open => "OPEN",
            LockState::Locked => "LOCKED",
            LockState::NimbyLocked => "NIMBY_LOCKED",
        }
    }
}

impl std::str::FromStr for LockState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(LockState::Open),
            "LOCKED" => Ok(LockState::Locked),
            "NIMBY_LOCKED" => Ok(LockState::NimbyLocked),
            _ => Err(LedgerError::Serialization(format!("Invalid lock state: {s}"))),
        }
    }
}

/// 调度器每个核心可提供的超线程策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadMode {
    #[default]
    Auto,
    All,
    Variable,
}

impl ThreadMode {
    pub fn code(&self) -> i64 {
        match self {
            ThreadMode::Auto => 0,
            ThreadMode::All => 1,
            ThreadMode::Variable => 2,
        }
    }
    pub fn from_code(code: i64) -> LedgerResult<Self> {
        match code {
            0 => Ok(ThreadMode::Auto),
            1 => Ok(ThreadMode::All),
            2 => Ok(ThreadMode::Variable),
            _ => Err(LedgerError::Serialization(format!(
                "Invalid thread mode: {code}"
            ))),
        }
    }
}

/// 锁状态变更审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockChange {
    pub state: LockState,
    pub source: Source,
    pub at: DateTime<Utc>,
}

/// 主机上报的统计信息，不参与资源预留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    pub os: String,
    pub boot_time: DateTime<Utc>,
    /// 负载平均值 × 100
    pub load: u64,
    pub free_memory: u64,
    pub free_gpu_memory: u64,
}

/// 主机容量记录
///
/// 每台渲染主机一条。资源、标签与状态的变更通过各模块提供的方法进行，
/// 以维持 `0 ≤ idle ≤ total` 等不变量：
/// - 容量：`capacity` 模块（预留、释放、搁浅核心）
/// - 标签：`tags` 模块（手动标签与重算）
/// - 状态：`state` 模块（硬件状态、锁、重启标志、线程模式）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostRecord {
    pub id: HostId,
    pub name: String,
    pub allocation_id: Option<AllocationId>,
    pub resources: HostResources,
    pub stats: HostStats,
    pub nimby_enabled: bool,
    pub nimby_locked: bool,
    pub hardware_state: HardwareState,
    /// 管理员锁，只取 `Open` 或 `Locked`；NIMBY 锁单独保存在 `nimby_locked`
    pub lock_state: LockState,
    pub last_lock_change: Option<LockChange>,
    pub reboot_when_idle: bool,
    pub thread_mode: ThreadMode,
    pub tags: TagSet,
    pub hardware_tags: Vec<String>,
    pub manual_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostRecord {
    pub fn entity_description(&self) -> String {
        format!("主机 '{}' (ID: {})", self.name, self.id)
    }
}
