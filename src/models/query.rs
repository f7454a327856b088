//! Request payloads of the public API surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One prior turn of the conversation, newest last.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Body of `POST /api/ask`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AskRequest {
    pub question: String,
    /// BCP-47-ish tag; falls back to the configured default language.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

/// Body of `POST /api/conversations/:id/clarify`: the original question plus
/// the user's answers, keyed by the clarification question index.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClarifyAnswersRequest {
    pub question: String,
    #[serde(default)]
    pub language: Option<String>,
    pub answers: BTreeMap<u32, String>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

/// Body of `POST /api/knowledge/expand`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpandKnowledgeRequest {
    pub query: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpandKnowledgeResponse {
    pub documents_ingested: usize,
    pub sources_succeeded: usize,
}
