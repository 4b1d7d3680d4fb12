//! # 单位换算
//!
//! 所有内存类资源（内存、交换分区、临时磁盘、GPU显存）统一以 KB 为规范单位，
//! 核心数使用定点表示：1 个逻辑核心 = 100 个核心单位。
//! 其他模块只能通过这里的常量和函数进行换算。

use crate::errors::{LedgerError, LedgerResult};

/// 每个规范内存单位对应的字节数
pub const BYTES_PER_UNIT: u64 = 1024;

pub const KB: u64 = 1;
pub const MB: u64 = 1024 * KB;
pub const MB512: u64 = 512 * MB;
pub const GB: u64 = 1024 * MB;
pub const GB2: u64 = 2 * GB;
pub const GB4: u64 = 4 * GB;
pub const GB8: u64 = 8 * GB;
pub const GB16: u64 = 16 * GB;
pub const GB32: u64 = 32 * GB;

/// 每个逻辑核心的定点单位数
pub const CORE_UNITS: u64 = 100;

/// 计算主机总核心单位数
///
/// `cores_per_proc` 已经是百分之一核心单位（400 = 4.00 核）。
pub fn core_units(cores_per_proc: i64, num_procs: i64) -> LedgerResult<u64> {
    if cores_per_proc < 0 || num_procs < 0 {
        return Err(LedgerError::invalid_capacity(format!(
            "核心数不能为负: cores_per_proc={cores_per_proc}, num_procs={num_procs}"
        )));
    }
    (num_procs as u64)
        .checked_mul(cores_per_proc as u64)
        .ok_or_else(|| {
            LedgerError::invalid_capacity(format!(
                "核心数溢出: cores_per_proc={cores_per_proc}, num_procs={num_procs}"
            ))
        })
}

pub const fn units_from_bytes(bytes: u64) -> u64 {
    bytes / BYTES_PER_UNIT
}

pub const fn bytes_from_units(units: u64) -> u64 {
    units * BYTES_PER_UNIT
}

/// 向下取整到整核心
pub const fn floor_whole_cores(units: u64) -> u64 {
    units / CORE_UNITS * CORE_UNITS
}

/// 将校验过的上报数值转换为非负单位数
pub fn non_negative(field: &str, value: i64) -> LedgerResult<u64> {
    u64::try_from(value)
        .map_err(|_| LedgerError::invalid_capacity(format!("{field} 不能为负: {value}")))
}

pub fn format_memory(units: u64) -> String {
    if units >= GB {
        format!("{:.1}G", units as f64 / GB as f64)
    } else if units >= MB {
        format!("{:.1}M", units as f64 / MB as f64)
    } else {
        format!("{units}K")
    }
}

pub fn format_cores(units: u64) -> String {
    format!("{:.2}", units as f64 / CORE_UNITS as f64)
}
