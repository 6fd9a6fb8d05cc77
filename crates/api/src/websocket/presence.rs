//! Presence registry
//!
//! Maps live connections to the customer or agent behind them. Purely
//! transient: entries vanish on disconnect and are rebuilt when the client
//! joins again.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use livechat_shared::{AgentId, ConversationId, CustomerId};

/// Who is behind a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Customer {
        customer_id: CustomerId,
        conversation_id: ConversationId,
    },
    Agent {
        agent_id: AgentId,
    },
}

#[derive(Default)]
struct Entries {
    by_connection: HashMap<Uuid, Presence>,
    /// Latest connection of each agent, for targeted delivery
    agent_connections: HashMap<AgentId, Uuid>,
}

impl Entries {
    fn drop_agent_route(&mut self, connection_id: &Uuid, previous: Option<&Presence>) {
        if let Some(Presence::Agent { agent_id }) = previous {
            if self.agent_connections.get(agent_id) == Some(connection_id) {
                self.agent_connections.remove(agent_id);
            }
        }
    }
}

/// Connection identity bookkeeping, scoped to one server instance
#[derive(Default)]
pub struct PresenceRegistry {
    entries: RwLock<Entries>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer connection; returns the entry it replaced
    pub async fn register_customer(
        &self,
        connection_id: Uuid,
        customer_id: CustomerId,
        conversation_id: ConversationId,
    ) -> Option<Presence> {
        let mut entries = self.entries.write().await;
        let previous = entries.by_connection.insert(
            connection_id,
            Presence::Customer {
                customer_id,
                conversation_id,
            },
        );
        entries.drop_agent_route(&connection_id, previous.as_ref());
        previous
    }

    /// Register an agent connection. The newest connection of an agent
    /// receives direct deliveries.
    pub async fn register_agent(&self, connection_id: Uuid, agent_id: AgentId) -> Option<Presence> {
        let mut entries = self.entries.write().await;
        let previous = entries.by_connection.insert(
            connection_id,
            Presence::Agent {
                agent_id: agent_id.clone(),
            },
        );
        entries.drop_agent_route(&connection_id, previous.as_ref());
        entries.agent_connections.insert(agent_id, connection_id);
        previous
    }

    pub async fn get(&self, connection_id: &Uuid) -> Option<Presence> {
        self.entries.read().await.by_connection.get(connection_id).cloned()
    }

    /// Conversation followed by a customer connection
    pub async fn customer_conversation(&self, connection_id: &Uuid) -> Option<ConversationId> {
        match self.get(connection_id).await {
            Some(Presence::Customer {
                conversation_id, ..
            }) => Some(conversation_id),
            _ => None,
        }
    }

    pub async fn agent_connection(&self, agent_id: &AgentId) -> Option<Uuid> {
        self.entries.read().await.agent_connections.get(agent_id).copied()
    }

    /// Drop every entry for a connection
    pub async fn remove(&self, connection_id: &Uuid) -> Option<Presence> {
        let mut entries = self.entries.write().await;
        let previous = entries.by_connection.remove(connection_id);
        entries.drop_agent_route(connection_id, previous.as_ref());
        previous
    }

    /// (customer connections, agent connections)
    pub async fn counts(&self) -> (usize, usize) {
        let entries = self.entries.read().await;
        let agents = entries
            .by_connection
            .values()
            .filter(|p| matches!(p, Presence::Agent { .. }))
            .count();
        (entries.by_connection.len() - agents, agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_customer_registration_and_removal() {
        let registry = PresenceRegistry::new();
        let conn = Uuid::new_v4();
        let conversation_id = ConversationId::new();

        registry
            .register_customer(conn, CustomerId::from("c1"), conversation_id)
            .await;
        assert_eq!(registry.customer_conversation(&conn).await, Some(conversation_id));
        assert_eq!(registry.counts().await, (1, 0));

        assert!(registry.remove(&conn).await.is_some());
        assert_eq!(registry.customer_conversation(&conn).await, None);
        assert!(registry.remove(&conn).await.is_none());
    }

    #[tokio::test]
    async fn test_latest_agent_connection_wins() {
        let registry = PresenceRegistry::new();
        let agent = AgentId::from("ag1");
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.register_agent(first, agent.clone()).await;
        registry.register_agent(second, agent.clone()).await;
        assert_eq!(registry.agent_connection(&agent).await, Some(second));

        // Dropping the stale connection keeps the live route
        registry.remove(&first).await;
        assert_eq!(registry.agent_connection(&agent).await, Some(second));

        registry.remove(&second).await;
        assert_eq!(registry.agent_connection(&agent).await, None);
    }

    #[tokio::test]
    async fn test_agent_connection_is_not_a_customer() {
        let registry = PresenceRegistry::new();
        let conn = Uuid::new_v4();
        registry.register_agent(conn, AgentId::from("ag1")).await;

        assert_eq!(registry.customer_conversation(&conn).await, None);
        assert_eq!(registry.counts().await, (0, 1));
    }
}
