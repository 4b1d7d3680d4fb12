//! # 主机状态机
//!
//! 硬件状态、管理员锁与 NIMBY 锁、重启标志和线程模式。硬件状态和线程模式
//! 没有转换限制；管理员锁和 NIMBY 锁相互独立，有效锁状态按
//! `LOCKED > NIMBY_LOCKED > OPEN` 合成。

use chrono::Utc;
use tracing::debug;

use crate::entities::{HardwareState, HostRecord, LockChange, LockState, Source, ThreadMode};
use host_ledger_core::{LedgerError, LedgerResult};

impl HostRecord {
    /// 对外可见的锁状态
    pub fn effective_lock_state(&self) -> LockState {
        if self.lock_state == LockState::Locked {
            LockState::Locked
        } else if self.nimby_locked {
            LockState::NimbyLocked
        } else {
            LockState::Open
        }
    }

    /// 管理员加锁或解锁，返回状态是否变化
    ///
    /// NIMBY 锁只能通过 [`HostRecord::set_nimby_lock`] 设置。
    pub fn set_lock(&mut self, state: LockState, source: Source) -> LedgerResult<bool> {
        if state == LockState::NimbyLocked {
            return Err(LedgerError::invalid_lock_state("NIMBY 锁不能通过管理员锁设置"));
        }
        if self.lock_state == state {
            return Ok(false);
        }
        debug!(
            "主机 {} 锁状态 {} -> {} (来源: {})",
            self.name,
            self.lock_state.as_str(),
            state.as_str(),
            source
        );
        self.lock_state = state;
        self.record_lock_change(source);
        Ok(true)
    }

    pub fn set_nimby_lock(&mut self, locked: bool, source: Source) -> bool {
        if self.nimby_locked == locked {
            return false;
        }
        self.nimby_locked = locked;
        self.record_lock_change(source);
        true
    }

    fn record_lock_change(&mut self, source: Source) {
        self.last_lock_change = Some(LockChange {
            state: self.effective_lock_state(),
            source,
            at: Utc::now(),
        });
    }

    pub fn set_hardware_state(&mut self, state: HardwareState) -> bool {
        let changed = self.hardware_state != state;
        self.hardware_state = state;
        changed
    }

    pub fn set_thread_mode(&mut self, mode: ThreadMode) {
        self.thread_mode = mode;
    }

    pub fn set_reboot_when_idle(&mut self, enabled: bool) {
        self.reboot_when_idle = enabled;
    }

    pub fn is_up(&self) -> bool {
        self.hardware_state == HardwareState::Up
    }

    /// 只看管理员锁
    pub fn is_locked(&self) -> bool {
        self.lock_state == LockState::Locked
    }

    pub fn is_nimby(&self) -> bool {
        self.nimby_enabled
    }

    /// 空闲核心等于总核心
    pub fn is_fully_idle(&self) -> bool {
        self.resources.cores.idle() == self.resources.cores.total()
    }

    pub fn should_reboot(&self) -> bool {
        self.reboot_when_idle && self.is_fully_idle()
    }

    /// 锁状态是否允许分派；NIMBY 主机只在完全空闲时可用
    pub fn is_dispatchable(&self) -> bool {
        self.effective_lock_state() == LockState::Open
            && (!self.nimby_enabled || self.is_fully_idle())
    }
}
