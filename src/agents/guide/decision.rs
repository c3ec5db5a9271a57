//! guide 的决策记录与宽松解析
//!
//! LLM 输出是不可信输入：字段缺失、枚举越界、甚至不是 JSON 都不会报错，而是就地收敛为安全值。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::extract_json_block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    ContinueAsking,
    ProposeDraft,
    RequestConfirm,
    ConfirmFinish,
}

impl NextAction {
    pub const ALL: [NextAction; 4] = [
        NextAction::ContinueAsking,
        NextAction::ProposeDraft,
        NextAction::RequestConfirm,
        NextAction::ConfirmFinish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NextAction::ContinueAsking => "CONTINUE_ASKING",
            NextAction::ProposeDraft => "PROPOSE_DRAFT",
            NextAction::RequestConfirm => "REQUEST_CONFIRM",
            NextAction::ConfirmFinish => "CONFIRM_FINISH",
        }
    }

    /// 不在枚举内的值一律视为 CONTINUE_ASKING
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(label))
            .unwrap_or(NextAction::ContinueAsking)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserIntent {
    #[default]
    Continue,
    Backtrack,
}

impl UserIntent {
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("BACKTRACK") {
            UserIntent::Backtrack
        } else {
            UserIntent::Continue
        }
    }
}

/// 一轮对话的决策
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub thought: String,
    pub intent: UserIntent,
    pub target_section: Option<String>,
    pub next_action: NextAction,
    pub reply_to_user: String,
    pub draft_content: Option<String>,
}

impl Decision {
    /// 只有回复、继续追问的决策
    pub fn ask(thought: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            intent: UserIntent::Continue,
            target_section: None,
            next_action: NextAction::ContinueAsking,
            reply_to_user: reply.into(),
            draft_content: None,
        }
    }

    /// 解析 LLM 原始输出，永不失败
    pub fn parse(raw: &str) -> Self {
        let value = extract_json_block(raw)
            .and_then(|block| serde_json::from_str::<Value>(block).ok())
            .filter(Value::is_object);

        let Some(value) = value else {
            tracing::warn!("Guide output is not a JSON object, treating as plain reply");
            return Self::ask("unstructured output", raw.trim());
        };

        let text = |key: &str| -> Option<String> {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let raw_action = text("next_action").unwrap_or_default();
        let next_action = NextAction::from_label(&raw_action);
        if next_action.as_str() != raw_action.to_ascii_uppercase() {
            tracing::warn!(next_action = %raw_action, "Invalid next_action, falling back to CONTINUE_ASKING");
        }

        let draft_content = match value.get("draft_content") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Array(lines)) => {
                let joined = lines
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("\n");
                (!joined.trim().is_empty()).then_some(joined)
            }
            _ => None,
        };

        Self {
            thought: text("thought").unwrap_or_default(),
            intent: text("intent")
                .map(|i| UserIntent::from_label(&i))
                .unwrap_or_default(),
            target_section: text("target_section"),
            next_action,
            reply_to_user: text("reply_to_user").unwrap_or_default(),
            draft_content,
        }
    }
}
