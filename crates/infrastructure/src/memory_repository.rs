use std::collections::HashMap;
use std::sync::RwLock;

use host_ledger_core::{LedgerError, LedgerResult};
use host_ledger_domain::{HostId, HostRecord, HostRepository};
use tracing::debug;

use crate::mapping::{host_from_row, host_to_row, HostRow};

#[derive(Debug, Default)]
struct HostTable {
    rows: HashMap<HostId, HostRow>,
    /// 主机名 -> 主键
    names: HashMap<String, HostId>,
}

/// 内存主机仓储
///
/// 记录以存储行的形式保存，读写都经过行映射，与关系型存储的行为保持一致。
#[derive(Debug, Default)]
pub struct InMemoryHostRepository {
    table: RwLock<HostTable>,
}

impl InMemoryHostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.read()?.rows.len())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, HostTable>> {
        self.table
            .read()
            .map_err(|_| LedgerError::persistence_error("主机表读锁已损坏"))
    }

    fn write(&self) -> LedgerResult<std::sync::RwLockWriteGuard<'_, HostTable>> {
        self.table
            .write()
            .map_err(|_| LedgerError::persistence_error("主机表写锁已损坏"))
    }
}

impl HostRepository for InMemoryHostRepository {
    fn find_by_id(&self, id: HostId) -> LedgerResult<Option<HostRecord>> {
        self.read()?.rows.get(&id).map(host_from_row).transpose()
    }

    fn find_by_name(&self, name: &str) -> LedgerResult<Option<HostRecord>> {
        let table = self.read()?;
        match table.names.get(name) {
            Some(id) => table.rows.get(id).map(host_from_row).transpose(),
            None => Ok(None),
        }
    }

    fn find_all(&self) -> LedgerResult<Vec<HostRecord>> {
        let table = self.read()?;
        let mut hosts = table
            .rows
            .values()
            .map(host_from_row)
            .collect::<LedgerResult<Vec<_>>>()?;
        hosts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hosts)
    }

    fn save(&self, host: &HostRecord) -> LedgerResult<()> {
        let row = host_to_row(host)?;
        let mut table = self.write()?;
        if let Some(existing) = table.names.get(&host.name) {
            if *existing != host.id {
                return Err(LedgerError::persistence_error(format!(
                    "主机名已存在: {}",
                    host.name
                )));
            }
        }
        table.names.insert(host.name.clone(), host.id);
        table.rows.insert(host.id, row);
        debug!("保存主机记录 {}", host.name);
        Ok(())
    }

    fn delete(&self, id: HostId) -> LedgerResult<bool> {
        let mut table = self.write()?;
        match table.rows.remove(&id) {
            Some(_) => {
                table.names.retain(|_, v| *v != id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
