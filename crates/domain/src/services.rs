//! # 主机管理服务
//!
//! 对外暴露主机核算的全部操作。服务本身不保存主机数据，只持有仓储、
//! 分配目录、配置和一张按主机名索引的锁表。
//!
//! 每个修改操作都遵循同样的流程：
//!
//! 1. 通过主机锁串行化同一台主机上的操作
//! 2. 从仓储加载记录
//! 3. 在副本上修改
//! 4. 只有成功时才写回仓储
//!
//! 不同主机之间只在锁表查找时短暂竞争，不存在全局锁。
//!
//! ```rust,ignore
//! let manager = HostManager::new(hosts, allocations, HostConfig::default());
//! let host = manager.create_or_update_host(&report)?;
//! manager.reserve(host.id, 100, GB)?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use host_ledger_core::config::HostConfig;
use host_ledger_core::{units, LedgerError, LedgerResult};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::capacity::ResourceRequest;
use crate::entities::{
    AllocationId, HardwareState, HostId, HostRecord, LockState, Source, ThreadMode,
};
use crate::naming::normalize_host_name;
use crate::report::{HardwareReport, ReportApplier};
use crate::repositories::{AllocationDirectory, HostRepository};
use crate::tags::normalize_tag;

/// 主机管理服务
pub struct HostManager {
    hosts: Arc<dyn HostRepository>,
    allocations: Arc<dyn AllocationDirectory>,
    applier: ReportApplier,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HostManager {
    pub fn new(
        hosts: Arc<dyn HostRepository>,
        allocations: Arc<dyn AllocationDirectory>,
        config: HostConfig,
    ) -> Self {
        Self {
            hosts,
            allocations,
            applier: ReportApplier::new(config),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HostConfig {
        self.applier.config()
    }

    fn host_lock(&self, name: &str) -> LedgerResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LedgerError::Internal("主机锁表已损坏".to_string()))?;
        Ok(locks.entry(name.to_string()).or_default().clone())
    }

    /// 只有没有其他线程持有或等待该锁时才移除表项
    fn forget_lock(&self, name: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(name);
            }
        }
    }

    fn load(&self, id: HostId) -> LedgerResult<HostRecord> {
        self.hosts
            .find_by_id(id)?
            .ok_or_else(|| LedgerError::unknown_host(id.to_string()))
    }

    fn allocation_tag(&self, allocation: Option<AllocationId>) -> LedgerResult<Option<String>> {
        match allocation {
            Some(id) => self.allocations.tag_for(id),
            None => Ok(None),
        }
    }

    /// 在主机锁内修改记录，成功时写回仓储
    fn mutate<T, F>(&self, id: HostId, op: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut HostRecord) -> LedgerResult<T>,
    {
        let name = self.load(id)?.name;
        let lock = self.host_lock(&name)?;
        let _guard = lock
            .lock()
            .map_err(|_| LedgerError::Internal(format!("主机锁已损坏: {name}")))?;

        let mut host = self.load(id)?;
        let result = op(&mut host)?;
        host.updated_at = Utc::now();
        self.hosts.save(&host)?;
        Ok(result)
    }

    /// 处理一次硬件上报：未知主机创建记录，已知主机按增量规则更新
    pub fn create_or_update_host(&self, report: &HardwareReport) -> LedgerResult<HostRecord> {
        let name = self.applier.host_name(report)?;
        let lock = self.host_lock(&name)?;
        let _guard = lock
            .lock()
            .map_err(|_| LedgerError::Internal(format!("主机锁已损坏: {name}")))?;

        let host = match self.hosts.find_by_name(&name)? {
            Some(mut host) => {
                let tag = self.allocation_tag(host.allocation_id)?;
                let delta = self.applier.apply(&mut host, report, tag.as_deref())?;
                if !delta.is_zero() {
                    debug!(
                        "主机 {} 资源重新发现: cores {:+}, memory {:+}",
                        host.name, delta.cores, delta.memory
                    );
                }
                host
            }
            None => {
                let allocation = self.allocations.default_allocation()?;
                let host = self.applier.create(report, allocation.as_ref())?;
                info!(
                    "注册新主机 {}: cores={}, memory={}, tags='{}'",
                    host.name,
                    units::format_cores(host.resources.cores.total()),
                    units::format_memory(host.resources.memory.total()),
                    host.tags
                );
                host
            }
        };

        self.hosts.save(&host)?;
        counter!("host_reports_applied_total").increment(1);
        Ok(host)
    }

    pub fn reserve(&self, id: HostId, cores: u64, memory: u64) -> LedgerResult<()> {
        self.reserve_resources(id, &ResourceRequest::new(cores, memory))
    }

    /// 预留资源；资源不足时返回可恢复错误且记录不变
    pub fn reserve_resources(&self, id: HostId, request: &ResourceRequest) -> LedgerResult<()> {
        let result = self.mutate(id, |host| host.reserve(request));
        match &result {
            Ok(()) => {
                counter!("host_reservations_total", "outcome" => "granted").increment(1);
                debug!(
                    "主机 {} 预留 cores={}, memory={}",
                    id, request.cores, request.memory
                );
            }
            Err(e) if e.is_recoverable() => {
                counter!("host_reservations_total", "outcome" => "insufficient").increment(1);
                debug!("{}", e);
            }
            Err(e) => warn!("主机 {} 预留失败: {}", id, e),
        }
        result
    }

    pub fn release(&self, id: HostId, cores: u64, memory: u64) -> LedgerResult<()> {
        self.release_resources(id, &ResourceRequest::new(cores, memory))
    }

    pub fn release_resources(&self, id: HostId, request: &ResourceRequest) -> LedgerResult<()> {
        self.mutate(id, |host| {
            host.release(request);
            Ok(())
        })?;
        counter!("host_releases_total").increment(1);
        Ok(())
    }

    pub fn stranded_core_units(&self, id: HostId) -> LedgerResult<u64> {
        let host = self.load(id)?;
        Ok(host.stranded_core_units(self.config().min_memory_per_core))
    }

    pub fn set_lock(&self, id: HostId, state: LockState, source: Source) -> LedgerResult<()> {
        let changed = self.mutate(id, |host| host.set_lock(state, source.clone()))?;
        if changed {
            info!("主机 {} 锁状态变更为 {} (来源: {})", id, state.as_str(), source);
        }
        Ok(())
    }

    pub fn set_nimby_lock(&self, id: HostId, locked: bool, source: Source) -> LedgerResult<()> {
        self.mutate(id, |host| Ok(host.set_nimby_lock(locked, source)))?;
        Ok(())
    }

    pub fn set_hardware_state(&self, id: HostId, state: HardwareState) -> LedgerResult<()> {
        let changed = self.mutate(id, |host| Ok(host.set_hardware_state(state)))?;
        if changed {
            info!("主机 {} 硬件状态变更为 {}", id, state.as_str());
        }
        Ok(())
    }

    pub fn set_thread_mode(&self, id: HostId, mode: ThreadMode) -> LedgerResult<()> {
        self.mutate(id, |host| {
            host.set_thread_mode(mode);
            Ok(())
        })
    }

    pub fn set_reboot_when_idle(&self, id: HostId, enabled: bool) -> LedgerResult<()> {
        self.mutate(id, |host| {
            host.set_reboot_when_idle(enabled);
            Ok(())
        })
    }

    /// 添加手动标签，返回是否新增
    pub fn add_manual_tag(&self, id: HostId, tag: &str) -> LedgerResult<bool> {
        self.mutate(id, |host| host.add_manual_tag(tag))
    }

    /// 移除手动标签，返回是否存在
    pub fn remove_manual_tag(&self, id: HostId, tag: &str) -> LedgerResult<bool> {
        self.mutate(id, |host| host.remove_manual_tag(tag))
    }

    pub fn recalculate_tags(&self, id: HostId) -> LedgerResult<HostRecord> {
        let unassigned = self.config().unassigned_tag.clone();
        self.mutate(id, |host| {
            let tag = self.allocation_tag(host.allocation_id)?;
            host.recalculate_tags(tag.as_deref(), &unassigned)?;
            Ok(host.clone())
        })
    }

    /// 更换分配并立即重算标签
    pub fn set_allocation(&self, id: HostId, allocation: Option<AllocationId>) -> LedgerResult<()> {
        let tag = match allocation {
            Some(alloc) => {
                let tag = self
                    .allocations
                    .find(alloc)?
                    .ok_or_else(|| LedgerError::unknown_allocation(alloc.to_string()))?
                    .tag;
                Some(normalize_tag(&tag)?)
            }
            None => None,
        };
        let unassigned = self.config().unassigned_tag.clone();
        self.mutate(id, |host| {
            host.recalculate_tags(tag.as_deref(), &unassigned)?;
            host.allocation_id = allocation;
            Ok(())
        })
    }

    pub fn update_os(&self, id: HostId, os: &str) -> LedgerResult<()> {
        let os = os.trim();
        if os.is_empty() {
            return Err(LedgerError::invalid_capacity("操作系统不能为空"));
        }
        self.mutate(id, |host| {
            host.stats.os = os.to_string();
            Ok(())
        })
    }

    pub fn get_host(&self, id: HostId) -> LedgerResult<HostRecord> {
        self.load(id)
    }

    /// 按主机名查找，接受完整域名
    pub fn find_host(&self, name: &str) -> LedgerResult<HostRecord> {
        let normalized = normalize_host_name(name, self.config());
        self.hosts
            .find_by_name(&normalized)?
            .ok_or_else(|| LedgerError::unknown_host(name))
    }

    /// 按主机名排序的全部主机
    pub fn list_hosts(&self) -> LedgerResult<Vec<HostRecord>> {
        self.hosts.find_all()
    }

    pub fn host_exists(&self, name: &str) -> LedgerResult<bool> {
        let normalized = normalize_host_name(name, self.config());
        Ok(self.hosts.find_by_name(&normalized)?.is_some())
    }

    pub fn is_host_up(&self, id: HostId) -> LedgerResult<bool> {
        Ok(self.load(id)?.is_up())
    }

    pub fn is_host_locked(&self, id: HostId) -> LedgerResult<bool> {
        Ok(self.load(id)?.is_locked())
    }

    pub fn is_nimby_host(&self, id: HostId) -> LedgerResult<bool> {
        Ok(self.load(id)?.is_nimby())
    }

    pub fn delete_host(&self, id: HostId) -> LedgerResult<()> {
        if self.delete_if(id, |_| true)? {
            Ok(())
        } else {
            Err(LedgerError::unknown_host(id.to_string()))
        }
    }

    /// 在主机锁内重新检查条件后删除
    fn delete_if<F>(&self, id: HostId, predicate: F) -> LedgerResult<bool>
    where
        F: FnOnce(&HostRecord) -> bool,
    {
        let name = self.load(id)?.name;
        let deleted = {
            let lock = self.host_lock(&name)?;
            let _guard = lock
                .lock()
                .map_err(|_| LedgerError::Internal(format!("主机锁已损坏: {name}")))?;
            match self.hosts.find_by_id(id)? {
                Some(host) if predicate(&host) => self.hosts.delete(id)?,
                _ => false,
            }
        };
        // 此时本线程的锁句柄已释放
        if deleted {
            self.forget_lock(&name);
            info!("删除主机 {}", name);
        }
        Ok(deleted)
    }

    /// 删除所有处于 DOWN 状态的主机，返回删除数量
    ///
    /// 保留策略由调用方决定。
    pub fn delete_down_hosts(&self) -> LedgerResult<usize> {
        let mut deleted = 0;
        for host in self.hosts.find_all()? {
            if host.hardware_state != HardwareState::Down {
                continue;
            }
            match self.delete_if(host.id, |h| h.hardware_state == HardwareState::Down) {
                Ok(true) => deleted += 1,
                Ok(false) | Err(LedgerError::UnknownHost { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if deleted > 0 {
            info!("清理了 {} 台 DOWN 状态的主机", deleted);
        }
        Ok(deleted)
    }
}
