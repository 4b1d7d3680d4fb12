use serde::{Deserialize, Serialize};

use crate::units::{GB, MB, MB512};

/// 主机核算配置
///
/// 内存类数值均为规范单位（KB）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// 创建主机时从总内存中扣除的系统保留内存
    pub reserved_system_memory: u64,
    /// 每个可调度核心需要的最小空闲内存，用于计算搁浅核心
    pub min_memory_per_core: u64,
    /// 使用长主机名时需要剥离的域名后缀
    pub fqdn_domains: Vec<String>,
    /// 为 true 时只剥离已配置的域名后缀，否则只保留第一段主机名
    pub use_long_names: bool,
    /// 上报属性中覆盖操作系统的键名
    pub os_attribute: String,
    /// 上报中未携带操作系统属性时使用的默认值
    pub default_os: String,
    /// 未分配主机使用的分配标签
    pub unassigned_tag: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            reserved_system_memory: MB512,
            min_memory_per_core: GB + MB512,
            fqdn_domains: Vec::new(),
            use_long_names: false,
            os_attribute: "SP_OS".to_string(),
            default_os: "linux".to_string(),
            unassigned_tag: "unassigned".to_string(),
        }
    }
}

impl HostConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.os_attribute.trim().is_empty() {
            return Err(anyhow::anyhow!("操作系统属性键不能为空"));
        }

        if self.default_os.trim().is_empty() {
            return Err(anyhow::anyhow!("默认操作系统不能为空"));
        }

        if self.unassigned_tag.trim().is_empty()
            || self.unassigned_tag.chars().any(char::is_whitespace)
        {
            return Err(anyhow::anyhow!(
                "未分配标签无效: '{}'",
                self.unassigned_tag
            ));
        }

        if self.min_memory_per_core != 0 && self.min_memory_per_core < MB {
            return Err(anyhow::anyhow!(
                "每核心最小内存过小: {}KB，应为 0 或不小于 {}KB",
                self.min_memory_per_core,
                MB
            ));
        }

        if let Some(domain) = self
            .fqdn_domains
            .iter()
            .find(|d| d.trim().trim_matches('.').is_empty())
        {
            return Err(anyhow::anyhow!("域名后缀无效: '{domain}'"));
        }

        Ok(())
    }
}
