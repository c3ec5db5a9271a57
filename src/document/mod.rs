//! 简历文档模型
//!
//! 工作流操作的领域文档：基本信息 + 有序板块（经历 / 通用列表 / 纯文本）。
//! 核心编排层只把它当作不透明文档整体替换，具体修改由 `edit` 中的改写器完成。

pub mod edit;

use serde::{Deserialize, Serialize};

pub use edit::DirectEditor;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basics {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl Default for Basics {
    fn default() -> Self {
        Self {
            name: "您的姓名".to_string(),
            label: None,
            email: None,
            phone: None,
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceItem {
    #[serde(default = "new_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

impl ExperienceItem {
    pub fn new(title: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            organization: organization.into(),
            date_start: None,
            date_end: None,
            location: None,
            highlights: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericItem {
    #[serde(default = "new_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GenericItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            subtitle: None,
            date: None,
            description: None,
        }
    }
}

/// 简历板块，按 `type` 字段区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Section {
    Experience {
        #[serde(default = "new_id")]
        id: String,
        title: String,
        #[serde(default)]
        items: Vec<ExperienceItem>,
    },
    Generic {
        #[serde(default = "new_id")]
        id: String,
        title: String,
        #[serde(default)]
        items: Vec<GenericItem>,
    },
    Text {
        #[serde(default = "new_id")]
        id: String,
        title: String,
        #[serde(default)]
        content: String,
    },
}

impl Section {
    pub fn experience(title: impl Into<String>, items: Vec<ExperienceItem>) -> Self {
        Section::Experience {
            id: new_id(),
            title: title.into(),
            items,
        }
    }

    pub fn generic(title: impl Into<String>, items: Vec<GenericItem>) -> Self {
        Section::Generic {
            id: new_id(),
            title: title.into(),
            items,
        }
    }

    pub fn text(title: impl Into<String>, content: impl Into<String>) -> Self {
        Section::Text {
            id: new_id(),
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Section::Experience { title, .. }
            | Section::Generic { title, .. }
            | Section::Text { title, .. } => title,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Section::Experience { .. } => "experience",
            Section::Generic { .. } => "generic",
            Section::Text { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resume {
    #[serde(default)]
    pub basics: Basics,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Resume {
    pub fn section_titles(&self) -> Vec<&str> {
        self.sections.iter().map(Section::title).collect()
    }

    /// 渲染为纯文本，供 planning 之外的提示词引用
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.basics.name);
        if let Some(label) = &self.basics.label {
            out.push_str(" | ");
            out.push_str(label);
        }
        out.push('\n');
        for section in &self.sections {
            out.push_str(&format!("\n## {}\n", section.title()));
            match section {
                Section::Experience { items, .. } => {
                    for item in items {
                        out.push_str(&format!("### {} @ {}\n", item.title, item.organization));
                        for h in &item.highlights {
                            out.push_str(&format!("- {}\n", h));
                        }
                    }
                }
                Section::Generic { items, .. } => {
                    for item in items {
                        match &item.description {
                            Some(d) => out.push_str(&format!("- {}: {}\n", item.title, d)),
                            None => out.push_str(&format!("- {}\n", item.title)),
                        }
                    }
                }
                Section::Text { content, .. } => {
                    out.push_str(content);
                    out.push('\n');
                }
            }
        }
        out
    }
}
