use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use toll_agent::Agent;

/// Agent variants addressable by id, built once at startup.
pub struct AgentRegistry {
    agents: DashMap<String, Arc<Agent>>,
    default_id: String,
}

impl AgentRegistry {
    pub fn new(default_id: impl Into<String>) -> Self {
        Self {
            agents: DashMap::new(),
            default_id: default_id.into(),
        }
    }

    pub fn with_agents(
        default_id: impl Into<String>,
        agents: impl IntoIterator<Item = Arc<Agent>>,
    ) -> Self {
        let registry = Self::new(default_id);
        for agent in agents {
            registry.register(agent);
        }
        registry
    }

    pub fn register(&self, agent: Arc<Agent>) {
        info!(agent = %agent.id, "agent registered");
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.get(id).map(|a| Arc::clone(a.value()))
    }

    /// The requested agent if registered, otherwise the default one.
    pub fn resolve(&self, requested: Option<&str>) -> Option<Arc<Agent>> {
        requested
            .and_then(|id| self.get(id))
            .or_else(|| self.get(&self.default_id))
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Drop every registered agent.
    pub fn reset(&self) {
        self.agents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toll_agent::ScriptedModel;

    fn agent(id: &str) -> Arc<Agent> {
        Agent::builder(id, Arc::new(ScriptedModel::sequence([]))).build()
    }

    #[test]
    fn unknown_or_missing_id_falls_back_to_default() {
        let registry =
            AgentRegistry::with_agents("triage-agent", [agent("triage-agent"), agent("web-agent")]);

        assert_eq!(registry.resolve(Some("web-agent")).unwrap().id, "web-agent");
        assert_eq!(registry.resolve(Some("nope")).unwrap().id, "triage-agent");
        assert_eq!(registry.resolve(None).unwrap().id, "triage-agent");
        assert_eq!(registry.ids(), ["triage-agent", "web-agent"]);

        registry.reset();
        assert!(registry.resolve(None).is_none());
    }
}
