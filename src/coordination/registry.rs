//! Agent registry.
//!
//! Tracks known agents and their availability. Agents are kept in id order so
//! that idle-agent selection is reproducible.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::{Agent, AgentId, AgentState};
use crate::coordination::events::{Event, EventBus};
use crate::error::{Error, Result};

/// Registry of simulated agents.
pub struct AgentRegistry {
    /// Shared event bus.
    bus: Arc<EventBus>,
    /// Agents by id.
    agents: BTreeMap<AgentId, Agent>,
}

impl AgentRegistry {
    /// Create an empty registry publishing to `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            agents: BTreeMap::new(),
        }
    }

    /// Register an agent in the `Idle` state.
    pub fn register_agent(&mut self, agent: Agent) -> Result<()> {
        if self.agents.contains_key(&agent.id) {
            return Err(Error::DuplicateAgent { id: agent.id });
        }

        let id = agent.id.clone();
        log::debug!("Registering agent {} ({})", id, agent.name);
        self.agents.insert(
            id.clone(),
            Agent {
                state: AgentState::Idle,
                ..agent
            },
        );
        self.bus.publish(Event::agent_state_changed(id, AgentState::Idle));
        Ok(())
    }

    /// The idle agent with the lowest id, if any.
    pub fn idle_agent(&self) -> Option<&Agent> {
        self.agents.values().find(|a| a.is_idle())
    }

    /// Set an agent's state and publish the change.
    ///
    /// Publishes even when the state is unchanged. Returns the previous state.
    pub fn set_agent_state(&mut self, id: &AgentId, state: AgentState) -> Result<AgentState> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| Error::AgentNotFound { id: id.clone() })?;
        let previous = std::mem::replace(&mut agent.state, state);
        self.bus.publish(Event::agent_state_changed(id.clone(), state));
        Ok(previous)
    }

    /// Look up an agent.
    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// All agents in id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn idle_count(&self) -> usize {
        self.agents.values().filter(|a| a.is_idle()).count()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
