//! Agent 注册表：名字 -> 工厂
//!
//! 保存工厂而不是实例，每次调用都拿到干净的 Agent，再由 Orchestrator 从检查点恢复。

use std::collections::HashMap;
use std::sync::Arc;

use super::Agent;

pub type AgentFactory = Arc<dyn Fn() -> Box<dyn Agent> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    factories: HashMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工厂；名字取自工厂产出实例的 name()，重复注册覆盖旧值
    pub fn register<A, F>(&mut self, factory: F) -> &mut Self
    where
        A: Agent + 'static,
        F: Fn() -> A + Send + Sync + 'static,
    {
        let name = factory().name().to_string();
        tracing::debug!(agent = %name, "Agent registered");
        self.factories
            .insert(name, Arc::new(move || Box::new(factory()) as Box<dyn Agent>));
        self
    }

    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Agent>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentAction, AgentInput, AgentOutput};
    use crate::core::{AgentError, SessionState};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(
            &mut self,
            input: &AgentInput,
            _session: &SessionState,
        ) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput::new(AgentAction::Finish, input.content.clone()))
        }
    }

    #[tokio::test]
    async fn test_register_and_instantiate() {
        let mut registry = AgentRegistry::new();
        registry.register(|| Echo);
        assert!(registry.contains("echo"));
        assert_eq!(registry.names(), vec!["echo".to_string()]);
        assert!(registry.instantiate("missing").is_none());

        let mut agent = registry.instantiate("echo").unwrap();
        let session = SessionState::new(Default::default());
        let out = agent.invoke(&AgentInput::new("hi"), &session).await.unwrap();
        assert_eq!(out.thought, "hi");
        assert!(agent.opening(&session).await.is_err());
    }
}
