use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use host_ledger_core::config::AppConfig;
use host_ledger_core::logging::init_logging;
use host_ledger_core::LogFormat;
use host_ledger_domain::HostManager;
use host_ledger_infrastructure::{InMemoryAllocationDirectory, InMemoryHostRepository};
use tracing::info;

mod replay;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("host-ledger")
        .version("1.0.0")
        .about("渲染农场主机资源与标签核算")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("reports")
                .short('r')
                .long("reports")
                .value_name("FILE")
                .help("JSON 数组格式的硬件上报文件")
                .required(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("sweep-down")
                .long("sweep-down")
                .help("回放后删除处于 DOWN 状态的主机")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = AppConfig::load(matches.get_one::<String>("config").map(String::as_str))
        .context("加载配置失败")?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.parse::<LogFormat>()?;
    }
    init_logging(
        &config.observability.log_level,
        config.observability.log_format,
    )?;

    let reports_path = matches
        .get_one::<String>("reports")
        .map(PathBuf::from)
        .context("缺少上报文件参数")?;
    info!("回放上报文件: {}", reports_path.display());

    let manager = HostManager::new(
        Arc::new(InMemoryHostRepository::new()),
        Arc::new(InMemoryAllocationDirectory::new()),
        config.host.clone(),
    );

    let reports = replay::load_reports(&reports_path).await?;
    let mut summary = replay::replay(&manager, &reports);
    if matches.get_flag("sweep-down") {
        summary.swept = manager.delete_down_hosts()?;
    }

    for host in manager.list_hosts()? {
        println!(
            "{}",
            replay::describe_host(&host, config.host.min_memory_per_core)
        );
    }
    println!(
        "applied={} rejected={} swept={}",
        summary.applied, summary.rejected, summary.swept
    );
    Ok(())
}
