//! 领域仓储抽象
//!
//! 定义主机记录的持久化接口和分配目录接口。所有操作都是同步且有界的，
//! 实现方负责自身的并发安全。

use crate::entities::{Allocation, AllocationId, HostId, HostRecord};
use host_ledger_core::LedgerResult;

/// 主机记录仓储
pub trait HostRepository: Send + Sync {
    fn find_by_id(&self, id: HostId) -> LedgerResult<Option<HostRecord>>;
    /// 按规范化后的主机名查找
    fn find_by_name(&self, name: &str) -> LedgerResult<Option<HostRecord>>;
    fn find_all(&self) -> LedgerResult<Vec<HostRecord>>;
    /// 插入或整体替换
    fn save(&self, host: &HostRecord) -> LedgerResult<()>;
    fn delete(&self, id: HostId) -> LedgerResult<bool>;
}

/// 分配目录，为标签引擎解析分配标签
pub trait AllocationDirectory: Send + Sync {
    fn find(&self, id: AllocationId) -> LedgerResult<Option<Allocation>>;

    fn tag_for(&self, id: AllocationId) -> LedgerResult<Option<String>> {
        Ok(self.find(id)?.map(|a| a.tag))
    }

    /// 新主机默认加入的分配
    fn default_allocation(&self) -> LedgerResult<Option<Allocation>>;
}
