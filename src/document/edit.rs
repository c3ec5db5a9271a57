//! DirectEditor：不经过 LLM、按变更文档直接改写简历
//!
//! 板块定位：先精确匹配标题，再取 " - " 前的主标题做包含匹配。
//! 条目定位：先按 item_id，找不到时退回第一个条目。

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::editor::{AppliedChange, ChangeApplier};
use crate::core::AgentError;
use crate::document::{ExperienceItem, GenericItem, Resume, Section};
use crate::workflow::{ChangeOperation, PendingChange};

const SKILL_KEYWORDS: &[&str] = &[
    "技能", "技术", "专长", "技术栈", "skill", "tech stack", "technologies",
];

/// 确定性改写器
#[derive(Debug, Clone, Default)]
pub struct DirectEditor;

impl DirectEditor {
    pub fn new() -> Self {
        Self
    }

    /// 在文档副本上执行变更；失败时原文档不受影响
    pub fn apply_to(&self, change: &PendingChange, document: &Resume) -> Result<AppliedChange, AgentError> {
        let mut doc = document.clone();
        tracing::info!(
            task_id = change.task_id,
            section = %change.section_title,
            operation = ?change.operation,
            "Applying change"
        );
        let summary = match change.operation {
            ChangeOperation::UpdateBasics => update_basics(&mut doc, change)?,
            ChangeOperation::UpdateListSection => update_list_section(&mut doc, change)?,
            ChangeOperation::UpdateFreeformSection => update_freeform_section(&mut doc, change)?,
            ChangeOperation::AddItem => add_item(&mut doc, change)?,
        };
        Ok(AppliedChange {
            document: doc,
            messages: vec![summary],
        })
    }
}

#[async_trait]
impl ChangeApplier for DirectEditor {
    async fn apply(&self, change: &PendingChange, document: &Resume) -> Result<AppliedChange, AgentError> {
        self.apply_to(change, document)
    }
}

fn content_of(change: &PendingChange) -> Option<&str> {
    change
        .change_str("content")
        .filter(|c| !c.trim().is_empty())
        .or_else(|| Some(change.preview_text.as_str()).filter(|c| !c.trim().is_empty()))
}

fn find_section<'a>(doc: &'a mut Resume, title: &str) -> Option<&'a mut Section> {
    let idx = locate_section(doc, title)?;
    doc.sections.get_mut(idx)
}

fn locate_section(doc: &Resume, title: &str) -> Option<usize> {
    let title = title.trim();
    if let Some(i) = doc.sections.iter().position(|s| s.title() == title) {
        return Some(i);
    }
    let main = title.split(" - ").next().unwrap_or(title).trim();
    if main.is_empty() {
        return None;
    }
    doc.sections.iter().position(|s| {
        let t = s.title();
        !t.is_empty() && (t == main || t.contains(main) || main.contains(t))
    })
}

/// 把草稿拆成列表行：去掉 `-`、`•`、`*` 以及 `1.`、`2、`、`10)` 这类前缀
pub fn parse_list_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(strip_list_prefix)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn strip_list_prefix(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(['-', '•', '*']) {
        return rest.trim();
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if (1..=2).contains(&digits) {
        let rest = &line[digits..];
        for sep in ['.', '、', ')', '）'] {
            if let Some(r) = rest.strip_prefix(sep) {
                return r.trim();
            }
        }
    }
    line
}

fn highlights_from(change: &PendingChange) -> Option<Vec<String>> {
    if let Some(content) = content_of(change) {
        let lines = parse_list_lines(content);
        return Some(if lines.is_empty() {
            vec![content.trim().to_string()]
        } else {
            lines
        });
    }
    match change.changes.get("highlights") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        ),
        _ => None,
    }
}

fn update_basics(doc: &mut Resume, change: &PendingChange) -> Result<String, AgentError> {
    let mut fields: Vec<(String, String)> = ["name", "email", "phone", "label", "links"]
        .iter()
        .filter_map(|k| match change.changes.get(*k) {
            Some(Value::String(s)) => Some((k.to_string(), s.clone())),
            Some(Value::Array(items)) => Some((
                k.to_string(),
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            )),
            _ => None,
        })
        .collect();

    if fields.is_empty() {
        if let Some(content) = content_of(change) {
            fields = parse_basics_lines(content);
        }
    }
    if fields.is_empty() {
        return Err(AgentError::ChangeFailed(
            "no basics fields found in change".to_string(),
        ));
    }

    let basics = &mut doc.basics;
    let mut updated = Vec::new();
    for (key, value) in fields {
        match key.as_str() {
            "name" => basics.name = value,
            "email" => basics.email = Some(value),
            "phone" => basics.phone = Some(value),
            "label" => basics.label = Some(value),
            "links" => {
                basics.links = value
                    .split([',', '，', ' '])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            }
            _ => continue,
        }
        updated.push(key);
    }
    Ok(format!("Basics updated: {}", updated.join(", ")))
}

/// 解析 "邮箱：a@b.com" / "Email: a@b.com" 这类行
fn parse_basics_lines(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let line = strip_list_prefix(line);
            let (key, value) = line.split_once([':', '：'])?;
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            let key = match key.trim().to_lowercase().as_str() {
                "name" | "姓名" => "name",
                "email" | "e-mail" | "邮箱" => "email",
                "phone" | "tel" | "电话" | "手机" => "phone",
                "label" | "title" | "职位" | "头衔" => "label",
                "links" | "link" | "website" | "链接" | "主页" => "links",
                _ => return None,
            };
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn update_experience_items(
    items: &mut [ExperienceItem],
    change: &PendingChange,
    section_title: &str,
) -> Result<String, AgentError> {
    let highlights = highlights_from(change).ok_or_else(|| {
        AgentError::ChangeFailed(format!("section '{}' has nothing to update", section_title))
    })?;
    let by_id = change
        .item_id
        .as_deref()
        .and_then(|id| items.iter().position(|i| i.id == id));
    if change.item_id.is_some() && by_id.is_none() {
        tracing::warn!(item_id = ?change.item_id, "Item not found, falling back to first item");
    }
    let item = match by_id {
        Some(i) => &mut items[i],
        None => items.first_mut().ok_or_else(|| {
            AgentError::ChangeFailed(format!("section '{}' has no items", section_title))
        })?,
    };
    let old = item.highlights.len();
    item.highlights = highlights;
    tracing::info!(item = %item.title, old, new = item.highlights.len(), "Highlights replaced");
    Ok(format!(
        "Experience updated: {} ({} highlights)",
        item.title,
        item.highlights.len()
    ))
}

fn update_generic_items(
    items: &mut Vec<GenericItem>,
    change: &PendingChange,
    section_title: &str,
) -> Result<String, AgentError> {
    let content = content_of(change).map(str::to_string);

    let lower = section_title.to_lowercase();
    if SKILL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        if let Some(content) = &content {
            let skills = parse_list_lines(content);
            if !skills.is_empty() {
                *items = skills.into_iter().map(GenericItem::new).collect();
                return Ok(format!("Skill list updated: {} entries", items.len()));
            }
        }
    }

    let by_id = change
        .item_id
        .as_deref()
        .and_then(|id| items.iter().position(|i| i.id == id));
    let item = match by_id {
        Some(i) => &mut items[i],
        None => items.first_mut().ok_or_else(|| {
            AgentError::ChangeFailed(format!("section '{}' has no items", section_title))
        })?,
    };

    let mut fields = Vec::new();
    if let Some(description) = change.change_str("description").map(String::from).or(content) {
        item.description = Some(description);
        fields.push("description");
    }
    if by_id.is_some() {
        if let Some(title) = change.change_str("title") {
            item.title = title.to_string();
            fields.push("title");
        }
        if let Some(subtitle) = change.change_str("subtitle") {
            item.subtitle = Some(subtitle.to_string());
            fields.push("subtitle");
        }
    }
    if fields.is_empty() {
        return Err(AgentError::ChangeFailed(format!(
            "section '{}' has nothing to update",
            section_title
        )));
    }
    Ok(format!("Item updated: {} ({})", item.title, fields.join(", ")))
}

fn update_list_section(doc: &mut Resume, change: &PendingChange) -> Result<String, AgentError> {
    let title = change.section_title.clone();
    match find_section(doc, &title) {
        Some(Section::Experience { items, .. }) => update_experience_items(items, change, &title),
        Some(Section::Generic { items, .. }) => update_generic_items(items, change, &title),
        Some(Section::Text { content, .. }) => replace_text(content, change, &title),
        None => Err(AgentError::ChangeFailed(format!(
            "experience section not found: {} (available: {})",
            title,
            doc.section_titles().join(", ")
        ))),
    }
}

fn update_freeform_section(doc: &mut Resume, change: &PendingChange) -> Result<String, AgentError> {
    let title = change.section_title.clone();
    match find_section(doc, &title) {
        Some(Section::Generic { items, .. }) => update_generic_items(items, change, &title),
        Some(Section::Text { content, .. }) => replace_text(content, change, &title),
        Some(Section::Experience { items, .. }) => update_experience_items(items, change, &title),
        None => Err(AgentError::ChangeFailed(format!(
            "section not found: {} (available: {})",
            title,
            doc.section_titles().join(", ")
        ))),
    }
}

fn replace_text(target: &mut String, change: &PendingChange, title: &str) -> Result<String, AgentError> {
    let content = content_of(change).ok_or_else(|| {
        AgentError::ChangeFailed(format!("section '{}' has nothing to update", title))
    })?;
    *target = content.trim().to_string();
    Ok(format!("Text updated: {}", title))
}

fn add_item(doc: &mut Resume, change: &PendingChange) -> Result<String, AgentError> {
    let title = change.section_title.clone();
    let item_title = change
        .change_str("title")
        .map(String::from)
        .unwrap_or_else(|| title.clone());
    let content = content_of(change).map(str::to_string);

    match find_section(doc, &title) {
        Some(Section::Experience { items, .. }) => {
            let mut item = ExperienceItem::new(
                item_title.clone(),
                change.change_str("organization").unwrap_or_default(),
            );
            item.highlights = highlights_from(change).unwrap_or_default();
            items.push(item);
            Ok(format!("Experience added: {}", item_title))
        }
        Some(Section::Generic { items, .. }) => {
            let mut item = GenericItem::new(item_title.clone());
            item.description = content;
            items.push(item);
            Ok(format!("Item added: {}", item_title))
        }
        Some(Section::Text { content: text, .. }) => {
            let addition = content.ok_or_else(|| {
                AgentError::ChangeFailed(format!("section '{}' has nothing to add", title))
            })?;
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(addition.trim());
            Ok(format!("Text extended: {}", title))
        }
        None => Err(AgentError::ChangeFailed(format!("section not found: {}", title))),
    }
}
