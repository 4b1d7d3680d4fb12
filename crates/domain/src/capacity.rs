//! # 容量模型
//!
//! 记录主机每个资源维度的总量与空闲量，负责系统内存保留、预留/释放，
//! 以及重新上报时按增量调整空闲量的规则。
//!
//! 重新上报时空闲量按总量的变化量平移（`idle_new = idle_old + Δceiling`，
//! 再截断到 `[0, ceiling_new]`），因此"先上报后预留"和"先预留后上报"
//! 收敛到同样的空闲值。

use host_ledger_core::units::{self, CORE_UNITS};
use host_ledger_core::{LedgerError, LedgerResult};
use serde::Serialize;
use tracing::warn;

use crate::entities::HostRecord;

/// 单个资源维度的 (总量, 空闲量)
///
/// `reserved` 只对内存非零：它从总量中扣除，空闲量永远不超过 `total - reserved`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourcePair {
    total: u64,
    idle: u64,
    reserved: u64,
}

impl ResourcePair {
    /// 新发现的可预留资源，全部空闲
    pub fn new(total: u64) -> Self {
        Self {
            total,
            idle: total,
            reserved: 0,
        }
    }

    /// 扣除系统保留量后的可预留资源
    pub fn with_reservation(total: u64, reserved: u64) -> LedgerResult<Self> {
        let ceiling = total.checked_sub(reserved).ok_or_else(|| {
            LedgerError::invalid_capacity(format!(
                "总量 {total} 小于系统保留量 {reserved}"
            ))
        })?;
        Ok(Self {
            total,
            idle: ceiling,
            reserved,
        })
    }

    /// 直接采用上报的 (总量, 空闲量)，例如交换分区和临时磁盘
    pub fn reported(total: u64, free: u64) -> LedgerResult<Self> {
        Self::restore(total, free, 0)
    }

    /// 从持久化数据恢复，校验不变量
    pub fn restore(total: u64, idle: u64, reserved: u64) -> LedgerResult<Self> {
        if reserved > total || idle > total - reserved {
            return Err(LedgerError::invalid_capacity(format!(
                "资源数据不一致: total={total}, idle={idle}, reserved={reserved}"
            )));
        }
        Ok(Self {
            total,
            idle,
            reserved,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }
    pub fn idle(&self) -> u64 {
        self.idle
    }
    pub fn reserved(&self) -> u64 {
        self.reserved
    }
    /// 空闲量的上限
    pub fn ceiling(&self) -> u64 {
        self.total - self.reserved
    }
    /// 已被工作占用的量
    pub fn in_use(&self) -> u64 {
        self.ceiling() - self.idle
    }
    pub fn is_fully_idle(&self) -> bool {
        self.idle == self.ceiling()
    }

    /// 按新的总量重新定基，保留当前占用量；返回可预留上限的变化量
    fn rebase(&mut self, total: u64, reserved: u64) -> LedgerResult<i64> {
        let rebased = Self::with_reservation(total, reserved)?;
        let delta = rebased.ceiling() as i128 - self.ceiling() as i128;
        let idle = (self.idle as i128 + delta).clamp(0, rebased.ceiling() as i128);
        *self = Self {
            idle: idle as u64,
            ..rebased
        };
        Ok(delta.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    fn take(&mut self, amount: u64) {
        self.idle -= amount;
    }

    /// 归还资源，超出上限的部分被截断；返回是否发生了截断
    fn give_back(&mut self, amount: u64) -> bool {
        let restored = self.idle.saturating_add(amount);
        self.idle = restored.min(self.ceiling());
        restored > self.ceiling()
    }
}

/// 经过单位换算和校验的上报容量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportedCapacity {
    pub cores: u64,
    pub memory: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub mcp_total: u64,
    pub mcp_free: u64,
    pub gpu_memory: u64,
    pub gpus: u64,
}

/// 一次资源请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResourceRequest {
    /// 核心单位（100 = 1 核）
    pub cores: u64,
    pub memory: u64,
    pub gpus: u64,
    pub gpu_memory: u64,
}

impl ResourceRequest {
    pub fn new(cores: u64, memory: u64) -> Self {
        Self {
            cores,
            memory,
            ..Self::default()
        }
    }
    pub fn with_gpus(mut self, gpus: u64, gpu_memory: u64) -> Self {
        self.gpus = gpus;
        self.gpu_memory = gpu_memory;
        self
    }
}

/// 一次上报引起的可预留上限变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CapacityDelta {
    pub cores: i64,
    pub memory: i64,
    pub gpu_memory: i64,
    pub gpus: i64,
}

impl CapacityDelta {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HostResources {
    pub cores: ResourcePair,
    pub memory: ResourcePair,
    pub swap: ResourcePair,
    pub mcp: ResourcePair,
    pub gpu_memory: ResourcePair,
    pub gpus: ResourcePair,
}

impl HostResources {
    /// 由首次上报建立容量记录
    pub fn create(reported: &ReportedCapacity, reserved_system_memory: u64) -> LedgerResult<Self> {
        Ok(Self {
            cores: ResourcePair::new(reported.cores),
            memory: ResourcePair::with_reservation(reported.memory, reserved_system_memory)?,
            swap: ResourcePair::reported(reported.swap_total, reported.swap_free)?,
            mcp: ResourcePair::reported(reported.mcp_total, reported.mcp_free)?,
            gpu_memory: ResourcePair::new(reported.gpu_memory),
            gpus: ResourcePair::new(reported.gpus),
        })
    }

    /// 应用新的上报：总量重新计算，空闲量按同样的增量平移
    ///
    /// 任何一个维度失败时记录保持不变。
    pub fn apply_report(
        &mut self,
        reported: &ReportedCapacity,
        reserved_system_memory: u64,
    ) -> LedgerResult<CapacityDelta> {
        let mut next = *self;
        let delta = CapacityDelta {
            cores: next.cores.rebase(reported.cores, 0)?,
            memory: next.memory.rebase(reported.memory, reserved_system_memory)?,
            gpu_memory: next.gpu_memory.rebase(reported.gpu_memory, 0)?,
            gpus: next.gpus.rebase(reported.gpus, 0)?,
        };
        next.swap = ResourcePair::reported(reported.swap_total, reported.swap_free)?;
        next.mcp = ResourcePair::reported(reported.mcp_total, reported.mcp_free)?;
        *self = next;
        Ok(delta)
    }

    pub fn can_fit(&self, request: &ResourceRequest) -> bool {
        request.cores <= self.cores.idle
            && request.memory <= self.memory.idle
            && request.gpus <= self.gpus.idle
            && request.gpu_memory <= self.gpu_memory.idle
    }

    pub fn reserve(&mut self, request: &ResourceRequest, host: &str) -> LedgerResult<()> {
        if !self.can_fit(request) {
            return Err(LedgerError::InsufficientCapacity {
                host: host.to_string(),
                requested_cores: request.cores,
                requested_memory: request.memory,
                idle_cores: self.cores.idle,
                idle_memory: self.memory.idle,
            });
        }
        self.cores.take(request.cores);
        self.memory.take(request.memory);
        self.gpus.take(request.gpus);
        self.gpu_memory.take(request.gpu_memory);
        Ok(())
    }

    /// 释放资源；重复释放被截断到上限，返回是否发生了截断
    pub fn release(&mut self, request: &ResourceRequest) -> bool {
        let clamped = [
            self.cores.give_back(request.cores),
            self.memory.give_back(request.memory),
            self.gpus.give_back(request.gpus),
            self.gpu_memory.give_back(request.gpu_memory),
        ];
        clamped.iter().any(|c| *c)
    }

    /// 因空闲内存不足而无法调度的空闲核心单位
    ///
    /// 空闲内存不超过每核心最小内存时，没有任何帧能被调度到该主机，
    /// 全部空闲核心向下取整到整核心即为搁浅核心；不足一个整核心的零头不计入。
    /// 最小内存为 0 时不计算搁浅。
    pub fn stranded_core_units(&self, min_memory_per_core: u64) -> u64 {
        if min_memory_per_core == 0 || self.memory.idle > min_memory_per_core {
            return 0;
        }
        units::floor_whole_cores(self.cores.idle)
    }
}

impl HostRecord {
    pub fn reserve(&mut self, request: &ResourceRequest) -> LedgerResult<()> {
        self.resources.reserve(request, &self.name)
    }

    pub fn release(&mut self, request: &ResourceRequest) {
        if self.resources.release(request) {
            warn!(
                "主机 {} 释放的资源超过已占用量，空闲量已截断到上限 (cores={}, memory={})",
                self.name, request.cores, request.memory
            );
        }
    }

    pub fn stranded_core_units(&self, min_memory_per_core: u64) -> u64 {
        self.resources.stranded_core_units(min_memory_per_core)
    }

    pub fn idle_cores(&self) -> u64 {
        self.resources.cores.idle()
    }

    pub fn idle_memory(&self) -> u64 {
        self.resources.memory.idle()
    }

    pub fn whole_idle_cores(&self) -> u64 {
        self.resources.cores.idle() / CORE_UNITS
    }
}
