//! Parameter definitions for the knowledge-graph MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EntityInput {
    /// Unique entity name.
    #[schemars(description = "Unique entity name")]
    pub name: String,

    /// Kind of entity, e.g. `"module"`, `"service"`, `"person"`.
    #[schemars(description = "Kind of entity, e.g. 'module', 'service', 'person'")]
    pub entity_type: String,

    /// Initial free-text observation lines.
    #[schemars(description = "Initial free-text observation lines")]
    pub observations: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RelationInput {
    /// Source entity name.
    #[schemars(description = "Source entity name")]
    pub from: String,

    /// Target entity name.
    #[schemars(description = "Target entity name")]
    pub to: String,

    /// Relation label, e.g. `"depends_on"`.
    #[schemars(description = "Relation label, e.g. 'depends_on'")]
    pub relation_type: String,
}

/// Parameters for the `graph_create_entities` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateEntitiesParams {
    pub entities: Vec<EntityInput>,
}

/// Parameters for the `graph_create_relations` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateRelationsParams {
    pub relations: Vec<RelationInput>,
}

/// Parameters for the `graph_add_observations` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddObservationsParams {
    /// Entity to append to.
    #[schemars(description = "Entity to append observation lines to")]
    pub entity_name: String,

    /// Lines to append; exact duplicates are skipped.
    #[schemars(description = "Observation lines to append; exact duplicates are skipped")]
    pub observations: Vec<String>,
}

/// Parameters for the `graph_search_nodes` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchNodesParams {
    /// Case-insensitive match against names and observation lines.
    #[schemars(description = "Case-insensitive substring to match against entity names and observations")]
    pub query: String,
}

/// Parameters for the `graph_open_nodes` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct OpenNodesParams {
    /// Entity names to return in full.
    #[schemars(description = "Entity names to return in full")]
    pub names: Vec<String>,
}

/// Parameters for the `graph_read` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadGraphParams {}
