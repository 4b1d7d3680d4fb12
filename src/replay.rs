//! 硬件上报回放

use std::path::Path;

use anyhow::{Context, Result};
use host_ledger_core::units;
use host_ledger_domain::{HardwareReport, HostManager, HostRecord};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
    pub swept: usize,
}

/// 读取 JSON 数组格式的上报文件
pub async fn load_reports(path: &Path) -> Result<Vec<HardwareReport>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取上报文件失败: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("解析上报文件失败: {}", path.display()))
}

/// 按顺序应用上报，被拒绝的上报记录日志后跳过
pub fn replay(manager: &HostManager, reports: &[HardwareReport]) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for report in reports {
        match manager.create_or_update_host(report) {
            Ok(_) => summary.applied += 1,
            Err(e) => {
                warn!("拒绝主机 '{}' 的上报: {}", report.name, e);
                summary.rejected += 1;
            }
        }
    }
    info!(
        "回放完成: 应用 {} 条, 拒绝 {} 条",
        summary.applied, summary.rejected
    );
    summary
}

pub fn describe_host(host: &HostRecord, min_memory_per_core: u64) -> String {
    let r = &host.resources;
    format!(
        "{:<24} {:<16} {:<12} cores {}/{} mem {}/{} stranded {} tags [{}]",
        host.name,
        host.hardware_state.as_str(),
        host.effective_lock_state().as_str(),
        units::format_cores(r.cores.idle()),
        units::format_cores(r.cores.total()),
        units::format_memory(r.memory.idle()),
        units::format_memory(r.memory.total()),
        units::format_cores(host.stranded_core_units(min_memory_per_core)),
        host.tags
    )
}
