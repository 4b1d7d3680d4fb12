use std::collections::HashMap;
use std::sync::RwLock;

use host_ledger_core::{LedgerError, LedgerResult};
use host_ledger_domain::{normalize_tag, Allocation, AllocationDirectory, AllocationId};
use tracing::info;

/// 内存分配目录
#[derive(Debug, Default)]
pub struct InMemoryAllocationDirectory {
    allocations: RwLock<HashMap<AllocationId, Allocation>>,
    default: RwLock<Option<AllocationId>>,
}

impl InMemoryAllocationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册分配；短标签会被规范化，无法作为主机标签时返回 `InvalidTag`
    pub fn register(&self, mut allocation: Allocation) -> LedgerResult<AllocationId> {
        allocation.tag = normalize_tag(&allocation.tag)?;
        let id = allocation.id;
        self.allocations
            .write()
            .map_err(|_| LedgerError::persistence_error("分配目录写锁已损坏"))?
            .insert(id, allocation);
        Ok(id)
    }

    /// 设置新主机默认加入的分配，`None` 表示新主机保持未分配
    pub fn set_default(&self, id: Option<AllocationId>) -> LedgerResult<()> {
        if let Some(id) = id {
            if self.find(id)?.is_none() {
                return Err(LedgerError::unknown_allocation(id.to_string()));
            }
        }
        *self
            .default
            .write()
            .map_err(|_| LedgerError::persistence_error("分配目录写锁已损坏"))? = id;
        info!("默认分配设置为 {:?}", id);
        Ok(())
    }
}

impl AllocationDirectory for InMemoryAllocationDirectory {
    fn find(&self, id: AllocationId) -> LedgerResult<Option<Allocation>> {
        Ok(self
            .allocations
            .read()
            .map_err(|_| LedgerError::persistence_error("分配目录读锁已损坏"))?
            .get(&id)
            .cloned())
    }

    fn default_allocation(&self) -> LedgerResult<Option<Allocation>> {
        let id = *self
            .default
            .read()
            .map_err(|_| LedgerError::persistence_error("分配目录读锁已损坏"))?;
        match id {
            Some(id) => self.find(id),
            None => Ok(None),
        }
    }
}
