//! 主机记录与存储行之间的映射
//!
//! 行以列名到 JSON 值的映射表示，列名沿用主机表的命名约定
//! （`pk_` 主键、`str_` 字符串、`int_` 整数、`b_` 布尔、`ts_` 时间）。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use host_ledger_core::{LedgerError, LedgerResult};
use host_ledger_domain::{
    AllocationId, HostId, HostRecord, HostResources, HostStats, LockChange, LockState, ResourcePair,
    Source, TagSet, ThreadMode,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub type HostRow = BTreeMap<String, Value>;

fn get<T: DeserializeOwned>(row: &HostRow, column: &str) -> LedgerResult<T> {
    let value = row
        .get(column)
        .ok_or_else(|| LedgerError::Serialization(format!("缺少列: {column}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| LedgerError::Serialization(format!("列 {column} 解析失败: {e}")))
}

fn put<T: Serialize>(row: &mut HostRow, column: &str, value: T) -> LedgerResult<()> {
    row.insert(column.to_string(), serde_json::to_value(value)?);
    Ok(())
}

fn get_pair(
    row: &HostRow,
    total: &str,
    idle: &str,
    reserved: Option<&str>,
) -> LedgerResult<ResourcePair> {
    let reserved = match reserved {
        Some(column) => get(row, column)?,
        None => 0,
    };
    ResourcePair::restore(get(row, total)?, get(row, idle)?, reserved)
}

fn put_pair(row: &mut HostRow, total: &str, idle: &str, pair: &ResourcePair) -> LedgerResult<()> {
    put(row, total, pair.total())?;
    put(row, idle, pair.idle())
}

fn tag_list(stored: &str) -> LedgerResult<Vec<String>> {
    Ok(TagSet::from_storage_string(stored)?.as_slice().to_vec())
}

pub fn host_to_row(host: &HostRecord) -> LedgerResult<HostRow> {
    let mut row = HostRow::new();
    let r = &host.resources;

    put(&mut row, "pk_host", host.id)?;
    put(&mut row, "str_name", &host.name)?;
    put(&mut row, "pk_alloc", host.allocation_id)?;

    put_pair(&mut row, "int_cores", "int_cores_idle", &r.cores)?;
    put_pair(&mut row, "int_mem", "int_mem_idle", &r.memory)?;
    put(&mut row, "int_mem_reserved", r.memory.reserved())?;
    put_pair(&mut row, "int_swap", "int_swap_free", &r.swap)?;
    put_pair(&mut row, "int_mcp", "int_mcp_free", &r.mcp)?;
    put_pair(&mut row, "int_gpu_mem", "int_gpu_mem_idle", &r.gpu_memory)?;
    put_pair(&mut row, "int_gpus", "int_gpus_idle", &r.gpus)?;

    put(&mut row, "str_os", &host.stats.os)?;
    put(&mut row, "ts_booted", host.stats.boot_time)?;
    put(&mut row, "int_load", host.stats.load)?;
    put(&mut row, "int_mem_free", host.stats.free_memory)?;
    put(&mut row, "int_gpu_mem_free", host.stats.free_gpu_memory)?;

    put(&mut row, "b_nimby", host.nimby_enabled)?;
    put(&mut row, "b_nimby_locked", host.nimby_locked)?;
    put(&mut row, "str_state", host.hardware_state)?;
    put(&mut row, "str_lock_state", host.lock_state)?;
    let lock_change = host.last_lock_change.as_ref();
    put(&mut row, "str_lock_change_state", lock_change.map(|c| c.state))?;
    put(&mut row, "str_lock_source", lock_change.map(|c| &c.source))?;
    put(&mut row, "ts_lock_changed", lock_change.map(|c| c.at))?;
    put(&mut row, "b_reboot_idle", host.reboot_when_idle)?;
    put(&mut row, "int_thread_mode", host.thread_mode.code())?;

    put(&mut row, "str_tags", host.tags.to_storage_string())?;
    put(&mut row, "str_hw_tags", host.hardware_tags.join(" "))?;
    put(&mut row, "str_manual_tags", host.manual_tags.join(" "))?;

    put(&mut row, "ts_created", host.created_at)?;
    put(&mut row, "ts_updated", host.updated_at)?;
    Ok(row)
}

pub fn host_from_row(row: &HostRow) -> LedgerResult<HostRecord> {
    let resources = HostResources {
        cores: get_pair(row, "int_cores", "int_cores_idle", None)?,
        memory: get_pair(row, "int_mem", "int_mem_idle", Some("int_mem_reserved"))?,
        swap: get_pair(row, "int_swap", "int_swap_free", None)?,
        mcp: get_pair(row, "int_mcp", "int_mcp_free", None)?,
        gpu_memory: get_pair(row, "int_gpu_mem", "int_gpu_mem_idle", None)?,
        gpus: get_pair(row, "int_gpus", "int_gpus_idle", None)?,
    };

    let lock_change_at: Option<DateTime<Utc>> = get(row, "ts_lock_changed")?;
    let lock_change_source: Option<Source> = get(row, "str_lock_source")?;
    let lock_change_state: Option<LockState> = get(row, "str_lock_change_state")?;
    let last_lock_change = match (lock_change_state, lock_change_source, lock_change_at) {
        (Some(state), Some(source), Some(at)) => Some(LockChange { state, source, at }),
        _ => None,
    };

    Ok(HostRecord {
        id: get::<HostId>(row, "pk_host")?,
        name: get(row, "str_name")?,
        allocation_id: get::<Option<AllocationId>>(row, "pk_alloc")?,
        resources,
        stats: HostStats {
            os: get(row, "str_os")?,
            boot_time: get(row, "ts_booted")?,
            load: get(row, "int_load")?,
            free_memory: get(row, "int_mem_free")?,
            free_gpu_memory: get(row, "int_gpu_mem_free")?,
        },
        nimby_enabled: get(row, "b_nimby")?,
        nimby_locked: get(row, "b_nimby_locked")?,
        hardware_state: get(row, "str_state")?,
        lock_state: get(row, "str_lock_state")?,
        last_lock_change,
        reboot_when_idle: get(row, "b_reboot_idle")?,
        thread_mode: ThreadMode::from_code(get(row, "int_thread_mode")?)?,
        tags: TagSet::from_storage_string(&get::<String>(row, "str_tags")?)?,
        hardware_tags: tag_list(&get::<String>(row, "str_hw_tags")?)?,
        manual_tags: tag_list(&get::<String>(row, "str_manual_tags")?)?,
        created_at: get(row, "ts_created")?,
        updated_at: get(row, "ts_updated")?,
    })
}
