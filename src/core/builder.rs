//! 编排器构建器：统一注册 plan / guide / editor 三个 Agent
//!
//! CLI 与测试共用同一套组装逻辑，避免两边注册的 Agent 不一致。

use std::sync::Arc;

use crate::agents::{AgentRegistry, ChangeApplier, EditorAgent, GuideAgent, PlanAgent};
use crate::core::{Orchestrator, Router, SessionState};
use crate::document::DirectEditor;
use crate::llm::LlmClient;

/// 编排器构建器
pub struct OrchestratorBuilder {
    llm: Arc<dyn LlmClient>,
    applier: Arc<dyn ChangeApplier>,
    routes: Vec<(String, String)>,
    routers: Vec<(String, Router)>,
}

impl OrchestratorBuilder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            applier: Arc::new(DirectEditor::new()),
            routes: Vec::new(),
            routers: Vec::new(),
        }
    }

    /// 替换 editor 使用的变更执行方
    pub fn with_applier(mut self, applier: Arc<dyn ChangeApplier>) -> Self {
        self.applier = applier;
        self
    }

    pub fn with_route(mut self, from: &str, to: &str) -> Self {
        self.routes.push((from.to_string(), to.to_string()));
        self
    }

    pub fn with_router<F>(mut self, from: &str, router: F) -> Self
    where
        F: Fn(&SessionState) -> Option<String> + Send + Sync + 'static,
    {
        self.routers.push((from.to_string(), Arc::new(router)));
        self
    }

    /// 构建注册表（工厂共享同一个 LLM 客户端）
    pub fn build_registry(&self) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        let llm = self.llm.clone();
        registry.register(move || PlanAgent::new(llm.clone()));
        let llm = self.llm.clone();
        registry.register(move || GuideAgent::new(llm.clone()));
        let applier = self.applier.clone();
        registry.register(move || EditorAgent::new(applier.clone()));
        registry
    }

    pub fn build(self) -> Orchestrator {
        let registry = self.build_registry();
        tracing::info!(agents = ?registry.names(), "Orchestrator ready");
        let mut orchestrator = Orchestrator::new(registry);
        for (from, to) in &self.routes {
            orchestrator.set_route(from, to);
        }
        for (from, router) in self.routers {
            orchestrator.set_router(&from, move |s| router(s));
        }
        orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{EDITOR_AGENT, GUIDE_AGENT, PLAN_AGENT};
    use crate::llm::MockLlmClient;

    #[test]
    fn test_build_registers_all_agents() {
        let orch = OrchestratorBuilder::new(Arc::new(MockLlmClient::new())).build();
        assert_eq!(orch.registry().names(), vec![EDITOR_AGENT, GUIDE_AGENT, PLAN_AGENT]);
    }

    #[test]
    fn test_custom_routes_applied() {
        let orch = OrchestratorBuilder::new(Arc::new(MockLlmClient::new()))
            .with_route(EDITOR_AGENT, PLAN_AGENT)
            .build();
        let session = SessionState::new(Default::default());
        let out = crate::agents::AgentOutput::new(crate::agents::AgentAction::Finish, "");
        assert_eq!(orch.next_agent(EDITOR_AGENT, &session, &out).as_deref(), Some(PLAN_AGENT));
    }
}
