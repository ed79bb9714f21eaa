//! Parameter definitions for the session MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `session_start` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionStartParams {
    /// Name of the agent opening the session.
    #[schemars(description = "Name of the agent opening the session, e.g. 'claude-code'")]
    pub agent: String,
}

/// Parameters for the `session_end` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionEndParams {
    /// What happened this session, for the next session's context bundle.
    #[schemars(description = "Summary of what happened this session")]
    pub summary: Option<String>,
}

/// Parameters for the `session_context` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionContextParams {
    /// Session id to view.
    #[schemars(description = "Session id to view")]
    pub id: String,
}
