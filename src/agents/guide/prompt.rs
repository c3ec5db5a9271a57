//! guide 的 System Prompt 拼装：按状态 + 策略给出指引，并附带任务流转上下文

use crate::core::SessionState;
use crate::workflow::{Task, TaskStatus, TaskStrategy};

use super::GuideState;

/// 开场白使用的触发消息
pub const OPENING_TRIGGER: &str = "请开始引导我优化这个部分。";

const DECISION_SCHEMA: &str = r#"{
  "thought": "string, 你的分析过程",
  "intent": "CONTINUE | BACKTRACK, 用户是否想回到之前的某个板块",
  "target_section": "string, intent 为 BACKTRACK 时的目标板块名，可省略",
  "next_action": "CONTINUE_ASKING | PROPOSE_DRAFT | REQUEST_CONFIRM | CONFIRM_FINISH",
  "reply_to_user": "string, 直接展示给用户的回复",
  "draft_content": "string, 可直接写入简历的草稿；PROPOSE_DRAFT / REQUEST_CONFIRM 时必填"
}"#;

/// 任务流转上下文：进度、已跳过的任务、是否刚跳过上一个任务
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowContext {
    pub total: usize,
    pub completed: usize,
    pub skipped: Vec<String>,
    pub first_after_skip: bool,
}

impl WorkflowContext {
    pub fn from_session(session: &SessionState, history_empty: bool) -> Self {
        let progress = session.progress();
        let skipped = progress
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Skipped)
            .map(|t| t.section.clone())
            .collect();
        let previous_skipped = session
            .current_task_index
            .checked_sub(1)
            .and_then(|i| session.task(i))
            .map(|t| t.status == TaskStatus::Skipped)
            .unwrap_or(false);
        Self {
            total: progress.total,
            completed: progress.completed,
            skipped,
            first_after_skip: previous_skipped && history_empty,
        }
    }

    fn render(&self) -> String {
        if self.skipped.is_empty() && !self.first_after_skip {
            return String::new();
        }
        let mut lines = vec![
            "# 任务流转".to_string(),
            format!(
                "进度：已完成 {}/{}，已跳过 {}/{}",
                self.completed,
                self.total,
                self.skipped.len(),
                self.total
            ),
        ];
        if !self.skipped.is_empty() {
            lines.push(format!("用户跳过了：{}", self.skipped.join("、")));
        }
        if self.first_after_skip {
            lines.push(
                "用户刚跳过了上一个任务，用轻松的语气切入当前板块，不要给用户压力。".to_string(),
            );
        }
        lines.join("\n") + "\n"
    }
}

fn state_instruction(state: GuideState, strategy: TaskStrategy) -> &'static str {
    match (state, strategy) {
        (GuideState::Discovery, TaskStrategy::Filter) => {
            "当前状态：DISCOVERY（技能筛选）\n\
             直接对照岗位给出保留 / 删除 / 补充建议，并请用户确认。\n\
             可选动作：CONTINUE_ASKING, PROPOSE_DRAFT"
        }
        (GuideState::Discovery, TaskStrategy::DeepDive) => {
            "当前状态：DISCOVERY（信息挖掘）\n\
             围绕诊断结果提问，一次只问一两个具体问题，暂不提供草稿。\n\
             可选动作：CONTINUE_ASKING, PROPOSE_DRAFT"
        }
        (GuideState::Drafting, _) => {
            "当前状态：DRAFTING（草稿撰写）\n\
             用户认可草稿时用 REQUEST_CONFIRM；提出修改或补充信息时用 PROPOSE_DRAFT 更新草稿。\n\
             \"好，但是...\" 属于修改意见。\n\
             可选动作：PROPOSE_DRAFT, REQUEST_CONFIRM"
        }
        (GuideState::Confirming, _) => {
            "当前状态：CONFIRMING（等待确认）\n\
             用户同意执行（\"确认\"、\"就这样\"）时用 CONFIRM_FINISH；要求再改时用 PROPOSE_DRAFT。\n\
             可选动作：CONFIRM_FINISH, PROPOSE_DRAFT"
        }
        (GuideState::Finished, _) => {
            "当前状态：FINISHED（已完成）\n\
             修改已提交。用户想改回这个板块时 intent 设为 BACKTRACK；想改其他板块时同时给出 target_section。"
        }
    }
}

fn strategy_instruction(strategy: TaskStrategy) -> &'static str {
    match strategy {
        TaskStrategy::DeepDive => {
            "# 策略：DEEP_DIVE\n\
             用 STAR（情境、任务、行动、结果）挖掘细节，优先追问可量化的结果。"
        }
        TaskStrategy::Filter => {
            "# 策略：FILTER\n\
             以目标岗位关键词为准做减法和加法，不追问长故事。"
        }
    }
}

fn first_turn_instruction(strategy: TaskStrategy) -> &'static str {
    match strategy {
        TaskStrategy::DeepDive => {
            "# 第一轮\n先用一两句话指出诊断出的问题，再提出第一个引导问题。next_action 必须是 CONTINUE_ASKING。"
        }
        TaskStrategy::Filter => {
            "# 第一轮\n先给出筛选分析，再询问用户是否有需要补充的技能。next_action 必须是 CONTINUE_ASKING。"
        }
    }
}

/// 组装 System Prompt
pub fn system_prompt(
    task: &Task,
    state: GuideState,
    first_turn: bool,
    context: &WorkflowContext,
) -> String {
    let first = if first_turn {
        first_turn_instruction(task.strategy)
    } else {
        ""
    };
    format!(
        "# 角色\n你是一位资深简历顾问，通过对话帮助用户优化简历中的一个板块。\n\n\
         # 任务\n任务 ID: {id}\n板块: {section}\n原文: \"{original}\"\n诊断: \"{diagnosis}\"\n目标: \"{goal}\"\n\n\
         {context}\
         # 状态机\n{state}\n{first}\n\n\
         {strategy}\n\n\
         # 输出格式\n只输出一个 JSON 对象：\n{schema}\n\n\
         # 注意\n1. 不编造用户没有的经历或成果。\n\
         2. 用户不想改这个板块时，尊重决定并提示可以使用「跳过」。\n",
        id = task.id,
        section = task.section,
        original = task.original_text,
        diagnosis = task.diagnosis,
        goal = task.goal,
        context = context.render(),
        state = state_instruction(state, task.strategy),
        first = first,
        strategy = strategy_instruction(task.strategy),
        schema = DECISION_SCHEMA,
    )
}

/// LLM 不可用时的模板开场白
pub fn fallback_opening(task: &Task) -> String {
    let diagnosis = if task.diagnosis.is_empty() {
        "这一部分还有提升空间".to_string()
    } else {
        task.diagnosis.clone()
    };
    let goal = if task.goal.is_empty() {
        "让它更贴合目标岗位".to_string()
    } else {
        task.goal.clone()
    };
    format!(
        "我们来看「{}」。\n\n诊断：{}\n目标：{}\n\n能先说说这段经历里你最有成就感的一件事吗？",
        task.section, diagnosis, goal
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Resume;
    use crate::workflow::Plan;

    #[test]
    fn test_prompt_varies_by_state_and_strategy() {
        let task = Task::new(1, "专业技能").with_strategy(TaskStrategy::Filter);
        let ctx = WorkflowContext::default();
        let p = system_prompt(&task, GuideState::Discovery, true, &ctx);
        assert!(p.contains("技能筛选"));
        assert!(p.contains("# 第一轮"));
        assert!(p.contains("FILTER"));

        let p = system_prompt(&task, GuideState::Confirming, false, &ctx);
        assert!(p.contains("CONFIRM_FINISH"));
        assert!(!p.contains("# 第一轮"));
        assert!(!p.contains("# 任务流转"));
    }

    #[test]
    fn test_workflow_context_after_skip() {
        let mut session = SessionState::new(Resume::default());
        session.plan = Some(Plan::new(vec![Task::new(1, "Summary"), Task::new(2, "Skills")]));
        session.skip_current_task();

        let ctx = WorkflowContext::from_session(&session, true);
        assert_eq!(ctx.skipped, vec!["Summary".to_string()]);
        assert!(ctx.first_after_skip);
        let rendered = ctx.render();
        assert!(rendered.contains("已跳过 1/2"));
        assert!(rendered.contains("刚跳过"));

        assert!(!WorkflowContext::from_session(&session, false).first_after_skip);
    }

    #[test]
    fn test_fallback_opening_uses_diagnosis() {
        let task = Task::new(1, "Work").with_diagnosis("缺少量化结果", "补充数据");
        let text = fallback_opening(&task);
        assert!(text.contains("Work"));
        assert!(text.contains("缺少量化结果"));
    }
}
