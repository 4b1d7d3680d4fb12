//! # 上报应用
//!
//! 将主机的硬件上报换算为容量记录：首次上报创建记录，后续上报按增量规则
//! 更新总量和空闲量，同时刷新操作系统、启动时间、负载、NIMBY 状态和硬件标签。
//! 校验失败时记录不发生任何变化。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use host_ledger_core::config::HostConfig;
use host_ledger_core::units;
use host_ledger_core::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capacity::{CapacityDelta, HostResources, ReportedCapacity};
use crate::entities::{
    Allocation, HardwareState, HostId, HostRecord, HostStats, LockState, Source, ThreadMode,
};
use crate::naming::normalize_host_name;
use crate::tags::{canonical_hardware_tags, normalize_tag, TagSet};

/// 主机上报的原始硬件数据
///
/// 内存类字段单位为 KB；`cores_per_proc` 为百分之一核心。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareReport {
    pub name: String,
    /// 启动时间，Unix 秒
    pub boot_time: i64,
    pub total_memory: i64,
    pub free_memory: i64,
    pub total_swap: i64,
    pub free_swap: i64,
    pub total_mcp: i64,
    pub free_mcp: i64,
    pub num_procs: i64,
    pub cores_per_proc: i64,
    pub total_gpu_memory: i64,
    pub free_gpu_memory: i64,
    pub num_gpus: i64,
    /// 负载平均值 × 100
    pub load: i64,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub nimby_enabled: bool,
    pub nimby_locked: bool,
    pub state: HardwareState,
}

impl Default for HardwareReport {
    fn default() -> Self {
        Self {
            name: String::new(),
            boot_time: 0,
            total_memory: 0,
            free_memory: 0,
            total_swap: 0,
            free_swap: 0,
            total_mcp: 0,
            free_mcp: 0,
            num_procs: 0,
            cores_per_proc: 0,
            total_gpu_memory: 0,
            free_gpu_memory: 0,
            num_gpus: 0,
            load: 0,
            tags: Vec::new(),
            attributes: BTreeMap::new(),
            nimby_enabled: false,
            nimby_locked: false,
            state: HardwareState::Up,
        }
    }
}

fn pair(field: &str, total: i64, free: i64) -> LedgerResult<(u64, u64)> {
    let total = units::non_negative(&format!("total_{field}"), total)?;
    let free = units::non_negative(&format!("free_{field}"), free)?;
    if free > total {
        return Err(LedgerError::invalid_capacity(format!(
            "{field} 空闲量 {free} 大于总量 {total}"
        )));
    }
    Ok((total, free))
}

impl HardwareReport {
    /// 校验并换算为规范单位
    pub fn validate(&self) -> LedgerResult<ReportedCapacity> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid_capacity("主机名不能为空"));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LedgerError::invalid_capacity(format!(
                "主机名不能包含空白或控制字符: '{name}'"
            )));
        }
        let (memory, _) = pair("memory", self.total_memory, self.free_memory)?;
        let (swap_total, swap_free) = pair("swap", self.total_swap, self.free_swap)?;
        let (mcp_total, mcp_free) = pair("mcp", self.total_mcp, self.free_mcp)?;
        let (gpu_memory, _) = pair("gpu_memory", self.total_gpu_memory, self.free_gpu_memory)?;
        units::non_negative("load", self.load)?;
        self.boot_time_utc()?;

        Ok(ReportedCapacity {
            cores: units::core_units(self.cores_per_proc, self.num_procs)?,
            memory,
            swap_total,
            swap_free,
            mcp_total,
            mcp_free,
            gpu_memory,
            gpus: units::non_negative("num_gpus", self.num_gpus)?,
        })
    }

    pub fn boot_time_utc(&self) -> LedgerResult<DateTime<Utc>> {
        DateTime::from_timestamp(self.boot_time, 0).ok_or_else(|| {
            LedgerError::invalid_capacity(format!("启动时间超出范围: {}", self.boot_time))
        })
    }

    /// 属性覆盖优先，否则使用默认操作系统
    pub fn operating_system(&self, config: &HostConfig) -> String {
        self.attributes
            .get(&config.os_attribute)
            .map(|os| os.trim())
            .filter(|os| !os.is_empty())
            .unwrap_or(config.default_os.as_str())
            .to_string()
    }

    fn stats(&self, config: &HostConfig) -> LedgerResult<HostStats> {
        Ok(HostStats {
            os: self.operating_system(config),
            boot_time: self.boot_time_utc()?,
            load: self.load.max(0) as u64,
            free_memory: self.free_memory.max(0) as u64,
            free_gpu_memory: self.free_gpu_memory.max(0) as u64,
        })
    }
}

/// 上报应用器
#[derive(Debug, Clone, Default)]
pub struct ReportApplier {
    config: HostConfig,
}

impl ReportApplier {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// 规范化后的主机名，必须同时是合法标签
    pub fn host_name(&self, report: &HardwareReport) -> LedgerResult<String> {
        let name = normalize_host_name(&report.name, &self.config);
        normalize_tag(&name).map_err(|e| {
            LedgerError::invalid_capacity(format!("主机名 '{}' 无效: {e}", report.name))
        })?;
        Ok(name)
    }

    /// 由首次上报创建主机记录
    pub fn create(
        &self,
        report: &HardwareReport,
        allocation: Option<&Allocation>,
    ) -> LedgerResult<HostRecord> {
        let capacity = report.validate()?;
        let resources = HostResources::create(&capacity, self.config.reserved_system_memory)?;
        let now = Utc::now();

        let mut record = HostRecord {
            id: HostId::new(),
            name: self.host_name(report)?,
            allocation_id: allocation.map(|a| a.id),
            resources,
            stats: report.stats(&self.config)?,
            nimby_enabled: report.nimby_enabled,
            nimby_locked: report.nimby_locked,
            hardware_state: report.state,
            lock_state: LockState::Open,
            last_lock_change: None,
            reboot_when_idle: false,
            thread_mode: ThreadMode::Auto,
            tags: TagSet::new(),
            hardware_tags: canonical_hardware_tags(&report.tags),
            manual_tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        record.recalculate_tags(
            allocation.map(|a| a.tag.as_str()),
            &self.config.unassigned_tag,
        )?;
        debug!(
            "创建主机记录 {}: cores={}, memory={}",
            record.name,
            units::format_cores(record.resources.cores.total()),
            units::format_memory(record.resources.memory.total())
        );
        Ok(record)
    }

    /// 将后续上报应用到已有记录
    ///
    /// 全部在副本上完成，成功后整体替换原记录。
    pub fn apply(
        &self,
        record: &mut HostRecord,
        report: &HardwareReport,
        allocation_tag: Option<&str>,
    ) -> LedgerResult<CapacityDelta> {
        let capacity = report.validate()?;
        let mut next = record.clone();

        let delta = next
            .resources
            .apply_report(&capacity, self.config.reserved_system_memory)?;
        next.stats = report.stats(&self.config)?;
        next.nimby_enabled = report.nimby_enabled;
        next.set_nimby_lock(report.nimby_locked, Source::report());
        next.set_hardware_state(report.state);
        next.hardware_tags = canonical_hardware_tags(&report.tags);
        next.recalculate_tags(allocation_tag, &self.config.unassigned_tag)?;
        next.updated_at = Utc::now();

        *record = next;
        Ok(delta)
    }
}
