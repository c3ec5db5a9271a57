//! plan：诊断简历并产出修订计划
//!
//! 无状态 Agent。LLM 输出按 Plan 的 JSON Schema 校验：缺少 section 的任务被丢弃，
//! 编号重排为 1..n，状态一律为 PENDING，策略名宽松解析。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::{AgentError, SessionState};
use crate::llm::{extract_json_block, LlmClient};
use crate::memory::Message;
use crate::workflow::{Plan, Task, TaskStatus, TaskStrategy};

use super::{
    Agent, AgentAction, AgentContent, AgentInput, AgentMessage, AgentOutput, PLAN_AGENT,
};

pub struct PlanAgent {
    llm: Arc<dyn LlmClient>,
}

impl PlanAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn system_prompt() -> String {
        let schema = schemars::schema_for!(Plan);
        let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
        format!(
            "# 角色\n你是一位资深招聘顾问，负责诊断简历与目标岗位之间的差距。\n\n\
             # 要求\n\
             1. 找出最值得修改的几处内容，每处生成一个任务，按重要性排序。\n\
             2. section 使用简历中的板块标题；针对具体条目时写成 \"板块 - 条目\"，并给出 item_id。\n\
             3. 经历类内容用 DEEP_DIVE 策略，技能清单类内容用 FILTER 策略。\n\
             4. original_text 摘录原文，diagnosis 说明问题，goal 说明修改目标。\n\n\
             # 输出\n只输出一个符合以下 JSON Schema 的对象：\n{}",
            schema
        )
    }

    fn user_prompt(intent: &str, session: &SessionState) -> String {
        let resume = serde_json::to_string_pretty(&session.document).unwrap_or_default();
        format!("# 求职意向\n{}\n\n# 简历（JSON）\n{}", intent, resume)
    }
}

/// 解析并校验 LLM 给出的计划
pub fn parse_plan(raw: &str) -> Result<Plan, AgentError> {
    let trimmed = raw.trim();
    let block = trimmed
        .starts_with('[')
        .then_some(trimmed)
        .or_else(|| extract_json_block(raw))
        .ok_or_else(|| AgentError::JsonParseError("no JSON found in plan output".to_string()))?;
    let value: Value =
        serde_json::from_str(block).map_err(|e| AgentError::JsonParseError(e.to_string()))?;

    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => obj
            .get("tasks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .ok_or_else(|| AgentError::JsonParseError("plan has no tasks array".to_string()))?,
        _ => return Err(AgentError::JsonParseError("plan is not an object".to_string())),
    };

    let text = |v: &Value, key: &str| -> Option<String> {
        v.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let tasks = items
        .iter()
        .filter_map(|item| {
            let section = text(item, "section")?;
            Some(Task {
                id: 0,
                status: TaskStatus::Pending,
                section,
                strategy: text(item, "strategy")
                    .map(|s| TaskStrategy::from_label(&s))
                    .unwrap_or_default(),
                original_text: text(item, "original_text").unwrap_or_default(),
                diagnosis: text(item, "diagnosis").unwrap_or_default(),
                goal: text(item, "goal").unwrap_or_default(),
                item_id: text(item, "item_id"),
            })
        })
        .enumerate()
        .map(|(i, mut task)| {
            task.id = i as u32 + 1;
            task
        })
        .collect::<Vec<_>>();

    if tasks.len() < items.len() {
        tracing::warn!(
            dropped = items.len() - tasks.len(),
            "Dropped plan tasks without a section"
        );
    }
    Ok(Plan::new(tasks))
}

#[async_trait]
impl Agent for PlanAgent {
    fn name(&self) -> &str {
        PLAN_AGENT
    }

    fn description(&self) -> &str {
        "Diagnoses the document against the user's goal and produces an ordered revision plan"
    }

    async fn invoke(
        &mut self,
        input: &AgentInput,
        session: &SessionState,
    ) -> Result<AgentOutput, AgentError> {
        let intent = if input.content.trim().is_empty() {
            session.user_intent.clone().unwrap_or_default()
        } else {
            input.content.clone()
        };
        let messages = vec![
            Message::system(Self::system_prompt()),
            Message::user(Self::user_prompt(&intent, session)),
        ];
        let raw = self.llm.complete(&messages).await?;
        let plan = parse_plan(&raw)?;
        tracing::info!(tasks = plan.len(), "Plan produced");

        let summary = format!("Plan ready: {} task(s)", plan.len());
        Ok(AgentOutput::new(AgentAction::Finish, summary.clone())
            .with_content(AgentContent::Plan(plan))
            .with_message(AgentMessage::info(PLAN_AGENT, summary)))
    }

    async fn stream(
        &mut self,
        input: &AgentInput,
        session: &SessionState,
        events: &mpsc::UnboundedSender<AgentMessage>,
    ) -> Result<AgentOutput, AgentError> {
        let _ = events.send(AgentMessage::info(PLAN_AGENT, "Analyzing document..."));
        let output = self.invoke(input, session).await?;
        for m in &output.messages {
            let _ = events.send(m.clone());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Resume;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_parse_plan_normalizes_tasks() {
        let raw = r#"Here you go:
        {"tasks": [
            {"id": 7, "status": "COMPLETED", "section": "Work Experience - Acme", "strategy": "STAR_STORYTELLING",
             "original_text": "did stuff", "diagnosis": "vague", "goal": "quantify", "item_id": "exp-1"},
            {"section": "", "diagnosis": "no section"},
            {"section": "Skills", "strategy": "KEYWORD_FILTER"}
        ]}"#;
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.tasks[0].id, 1);
        assert_eq!(plan.tasks[0].status, TaskStatus::Pending);
        assert_eq!(plan.tasks[0].strategy, TaskStrategy::DeepDive);
        assert_eq!(plan.tasks[0].item_id.as_deref(), Some("exp-1"));
        assert_eq!(plan.tasks[1].id, 2);
        assert_eq!(plan.tasks[1].strategy, TaskStrategy::Filter);
    }

    #[test]
    fn test_parse_plan_rejects_garbage() {
        assert!(matches!(parse_plan("no plan here"), Err(AgentError::JsonParseError(_))));
        assert!(matches!(parse_plan(r#"{"foo": 1}"#), Err(AgentError::JsonParseError(_))));
    }

    #[test]
    fn test_parse_plan_accepts_bare_array() {
        let plan = parse_plan(r#"[{"section": "Summary"}]"#).unwrap();
        assert_eq!(plan.tasks[0].section, "Summary");
    }

    #[tokio::test]
    async fn test_invoke_uses_intent_and_schema() {
        let mock = Arc::new(MockLlmClient::scripted([r#"{"tasks": [{"section": "Summary"}]}"#]));
        let mut agent = PlanAgent::new(mock.clone());
        let session = SessionState::new(Resume::default());
        let out = agent
            .invoke(&AgentInput::new("Backend engineer at Acme"), &session)
            .await
            .unwrap();
        assert_eq!(out.action, AgentAction::Finish);
        assert!(matches!(out.content, AgentContent::Plan(ref p) if p.len() == 1));

        let request = mock.request(0).unwrap();
        assert!(request[0].content.contains("\"tasks\""));
        assert!(request[1].content.contains("Backend engineer at Acme"));
    }
}
