//! 主机名规范化

use std::net::IpAddr;

use host_ledger_core::config::HostConfig;

/// 将上报的主机名转换为存储名
///
/// - IP 地址原样保留
/// - 启用长名称时去掉第一个匹配的配置域名后缀
/// - 否则只保留第一段
pub fn normalize_host_name(raw: &str, config: &HostConfig) -> String {
    let raw = raw.trim();
    if raw.parse::<IpAddr>().is_ok() {
        return raw.to_string();
    }
    let name = raw.trim_end_matches('.').to_lowercase();

    if config.use_long_names {
        for domain in &config.fqdn_domains {
            let suffix = format!(".{}", domain.trim_start_matches('.').to_lowercase());
            if let Some(stripped) = name.strip_suffix(&suffix) {
                if !stripped.is_empty() {
                    return stripped.to_string();
                }
            }
        }
        return name;
    }

    match name.split_once('.') {
        Some((short, _)) if !short.is_empty() => short.to_string(),
        _ => name,
    }
}
