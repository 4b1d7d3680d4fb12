//! 配置管理
//!
//! 主机核算引擎的配置以显式结构体传入各组件，不依赖全局环境查找。
//! 加载顺序：默认值 → TOML 配置文件 → 环境变量（前缀 `HOST_LEDGER`）。

pub mod models;

pub use models::{AppConfig, HostConfig, LogFormat, ObservabilityConfig};
