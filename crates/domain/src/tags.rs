//! # 标签引擎
//!
//! 主机标签集由三类来源合成：分配标签、主机名、硬件标签，再加上管理员
//! 手动添加的标签。重算时按固定顺序重建，结果与上一次状态无关：
//!
//! 1. 分配标签（没有分配时为 `unassigned`）
//! 2. 主机名（小写）
//! 3. 硬件标签（规范化、去重、升序）
//! 4. 手动标签（插入顺序）
//!
//! 同一个标签只出现一次，先出现的位置优先。

use host_ledger_core::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::HostRecord;

/// 持久化和展示时使用的分隔符
pub const TAG_DELIMITER: char = ' ';
pub const MAX_TAG_LENGTH: usize = 64;

/// 去掉首尾空白并转为小写，拒绝空标签、超长标签和内部空白/控制字符
pub fn normalize_tag(raw: &str) -> LedgerResult<String> {
    let tag = raw.trim().to_lowercase();
    if tag.is_empty() {
        return Err(LedgerError::invalid_tag(raw, "标签不能为空"));
    }
    if tag.chars().count() > MAX_TAG_LENGTH {
        return Err(LedgerError::invalid_tag(
            raw,
            format!("标签长度不能超过 {MAX_TAG_LENGTH} 个字符"),
        ));
    }
    if tag.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LedgerError::invalid_tag(raw, "标签不能包含空白或控制字符"));
    }
    Ok(tag)
}

/// 有序、去重的标签集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个已规范化的标签；已存在时保持原位置并返回 false
    pub fn insert(&mut self, tag: String) -> bool {
        if self.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_storage_string(&self) -> String {
        self.0.join(&TAG_DELIMITER.to_string())
    }

    /// 解析持久化字符串，逐个重新规范化
    pub fn from_storage_string(stored: &str) -> LedgerResult<Self> {
        let mut set = Self::new();
        for part in stored.split(TAG_DELIMITER).filter(|p| !p.is_empty()) {
            set.insert(normalize_tag(part)?);
        }
        Ok(set)
    }
}

impl std::fmt::Display for TagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_storage_string())
    }
}

/// 规范化上报的硬件标签：小写、去重、升序
///
/// 无效标签被丢弃，不影响其余标签。
pub fn canonical_hardware_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = raw
        .into_iter()
        .filter_map(|t| match normalize_tag(t.as_ref()) {
            Ok(tag) => Some(tag),
            Err(e) => {
                debug!("丢弃无效的硬件标签: {}", e);
                None
            }
        })
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// 重算标签集所需的全部输入
#[derive(Debug, Clone, Copy)]
pub struct TagSources<'a> {
    /// 分配的短标签，`None` 时使用未分配标签
    pub allocation_tag: Option<&'a str>,
    pub unassigned_tag: &'a str,
    pub host_name: &'a str,
    pub hardware_tags: &'a [String],
    pub manual_tags: &'a [String],
}

/// 按固定顺序从来源重建标签集
///
/// 任何来源标签无效时返回 `InvalidTag`，不会产生缺少分配标签或主机名的标签集。
pub fn recalculate_tags(sources: &TagSources<'_>) -> LedgerResult<TagSet> {
    let mut set = TagSet::new();
    let allocation = sources.allocation_tag.unwrap_or(sources.unassigned_tag);
    let head = [allocation, sources.host_name];
    for tag in head
        .into_iter()
        .chain(sources.hardware_tags.iter().map(String::as_str))
        .chain(sources.manual_tags.iter().map(String::as_str))
    {
        set.insert(normalize_tag(tag)?);
    }
    Ok(set)
}

impl HostRecord {
    /// 添加手动标签，标签集在下一次重算时更新
    pub fn add_manual_tag(&mut self, raw: &str) -> LedgerResult<bool> {
        let tag = normalize_tag(raw)?;
        if self.manual_tags.contains(&tag) {
            return Ok(false);
        }
        self.manual_tags.push(tag);
        Ok(true)
    }

    /// 只移除手动标签；分配、主机名和硬件标签不受影响
    pub fn remove_manual_tag(&mut self, raw: &str) -> LedgerResult<bool> {
        let tag = normalize_tag(raw)?;
        let before = self.manual_tags.len();
        self.manual_tags.retain(|t| t != &tag);
        Ok(self.manual_tags.len() != before)
    }

    /// 重算并整体替换标签集；失败时原标签集保持不变
    pub fn recalculate_tags(
        &mut self,
        allocation_tag: Option<&str>,
        unassigned_tag: &str,
    ) -> LedgerResult<()> {
        self.tags = recalculate_tags(&TagSources {
            allocation_tag,
            unassigned_tag,
            host_name: &self.name,
            hardware_tags: &self.hardware_tags,
            manual_tags: &self.manual_tags,
        })?;
        Ok(())
    }
}
