//! # Agent Model
//!
//! Durable record for a registered worker process. Maps to the `agents`
//! table. The row's `state` column is mutated only through the registry's
//! compare-and-swap transition API; heartbeat ingestion only advances
//! `last_seen` (max-wins, mirrored by the `agents_touch_last_seen` trigger).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::state_machine::states::AgentState;

/// A registered agent with its lifecycle state and identity metadata.
///
/// Rows are created on first registration and soft-retired (state `shutdown`)
/// on deregistration; the engine never physically deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub configuration: serde_json::Value,
    pub state: AgentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Registration payload (no generated fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub agent_id: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub configuration: serde_json::Value,
}

impl NewAgent {
    pub fn new(agent_id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            capabilities: Vec::new(),
            configuration: serde_json::json!({}),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }
}

/// Raw row shape; `state` and `capabilities` need decoding into their domain
/// types after fetch.
#[derive(Debug, FromRow)]
struct AgentRow {
    agent_id: String,
    agent_type: String,
    capabilities: serde_json::Value,
    configuration: serde_json::Value,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_seen: Option<DateTime<Utc>>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = sqlx::Error;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let capabilities = serde_json::from_value(row.capabilities)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Agent {
            agent_id: row.agent_id,
            agent_type: row.agent_type,
            capabilities,
            configuration: row.configuration,
            state,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_seen: row.last_seen,
        })
    }
}

const SELECT_COLUMNS: &str = "agent_id, agent_type, capabilities, configuration, state, \
     created_at, updated_at, last_seen";

impl Agent {
    /// Insert or update by `agent_id`. Metadata is always refreshed; `state`
    /// is written as given (the registry decides whether re-registration
    /// resets it).
    pub async fn upsert(pool: &PgPool, agent: &Agent) -> Result<Agent, sqlx::Error> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            INSERT INTO agents
                (agent_id, agent_type, capabilities, configuration, state,
                 created_at, updated_at, last_seen)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (agent_id) DO UPDATE SET
                agent_type = EXCLUDED.agent_type,
                capabilities = EXCLUDED.capabilities,
                configuration = EXCLUDED.configuration,
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            RETURNING agent_id, agent_type, capabilities, configuration, state,
                      created_at, updated_at, last_seen
            "#,
        )
        .bind(&agent.agent_id)
        .bind(&agent.agent_type)
        .bind(serde_json::json!(agent.capabilities))
        .bind(&agent.configuration)
        .bind(agent.state.to_string())
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .bind(agent.last_seen)
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    pub async fn find_by_agent_id(
        pool: &PgPool,
        agent_id: &str,
    ) -> Result<Option<Agent>, sqlx::Error> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM agents WHERE agent_id = $1"
        ))
        .bind(agent_id)
        .fetch_optional(pool)
        .await?;

        row.map(Agent::try_from).transpose()
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Agent>, sqlx::Error> {
        let rows = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM agents ORDER BY agent_id"
        ))
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Agent::try_from).collect()
    }

    /// Persist a state change decided by the registry's CAS.
    pub async fn update_state(
        pool: &PgPool,
        agent_id: &str,
        state: AgentState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE agents SET state = $2, updated_at = $3 WHERE agent_id = $1")
            .bind(agent_id)
            .bind(state.to_string())
            .bind(updated_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Max-wins `last_seen` advance; out-of-order heartbeats never move it
    /// backwards.
    pub async fn touch_last_seen(
        pool: &PgPool,
        agent_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE agents
            SET last_seen = GREATEST(COALESCE(last_seen, $2), $2),
                updated_at = NOW()
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .bind(seen_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
