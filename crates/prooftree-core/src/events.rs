//! The event schema (spec §4.D): every event carries `type`, `timestamp`, `seq`,
//! plus payload fields that are enumerated here as a tagged sum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node's immutable creation fields, as carried by `node_created`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNode {
    pub id: String,
    pub node_type: String,
    pub statement: String,
    pub inference_rule: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub validation_deps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewDefinition {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewExternal {
    pub id: String,
    pub name: String,
    pub source: String,
    pub content_hash: String,
}

/// The envelope wrapping every payload with the fields common to all events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
    #[serde(flatten)]
    pub payload: P,
}

/// The tagged sum of event payloads (spec §4.D). Dispatches on `type`, snake_case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ProofInitialized {
        conjecture: String,
        author: String,
    },
    NodeCreated {
        node: NewNode,
    },
    NodeAmended {
        node_id: String,
        previous_statement: String,
        new_statement: String,
        owner: String,
    },
    NodesClaimed {
        node_ids: Vec<String>,
        owner: String,
        lease_expires: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    NodesReleased {
        node_ids: Vec<String>,
        owner: String,
    },
    LockReaped {
        node_id: String,
    },
    NodeValidated {
        node_id: String,
    },
    NodeAdmitted {
        node_id: String,
    },
    NodeRefuted {
        node_id: String,
    },
    NodeArchived {
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ChallengeRaised {
        challenge_id: String,
        node_id: String,
        target_field: String,
        reason: String,
    },
    ChallengeResolved {
        challenge_id: String,
    },
    ChallengeWithdrawn {
        challenge_id: String,
    },
    DefAdded {
        definition: NewDefinition,
    },
    ExternalAdded {
        external: NewExternal,
    },
    ExternalUpdated {
        id: String,
        notes: String,
    },
    LemmaExtracted {
        lemma: String,
    },
    ScopeOpened {
        node_id: String,
        statement: String,
    },
    ScopeClosed {
        node_id: String,
        discharged_by: String,
    },
    TaintRecomputed {
        node_id: String,
        new_taint: String,
    },
}

impl EventPayload {
    /// The `type` discriminator string, matching the serde tag exactly.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ProofInitialized { .. } => "proof_initialized",
            Self::NodeCreated { .. } => "node_created",
            Self::NodeAmended { .. } => "node_amended",
            Self::NodesClaimed { .. } => "nodes_claimed",
            Self::NodesReleased { .. } => "nodes_released",
            Self::LockReaped { .. } => "lock_reaped",
            Self::NodeValidated { .. } => "node_validated",
            Self::NodeAdmitted { .. } => "node_admitted",
            Self::NodeRefuted { .. } => "node_refuted",
            Self::NodeArchived { .. } => "node_archived",
            Self::ChallengeRaised { .. } => "challenge_raised",
            Self::ChallengeResolved { .. } => "challenge_resolved",
            Self::ChallengeWithdrawn { .. } => "challenge_withdrawn",
            Self::DefAdded { .. } => "def_added",
            Self::ExternalAdded { .. } => "external_added",
            Self::ExternalUpdated { .. } => "external_updated",
            Self::LemmaExtracted { .. } => "lemma_extracted",
            Self::ScopeOpened { .. } => "scope_opened",
            Self::ScopeClosed { .. } => "scope_closed",
            Self::TaintRecomputed { .. } => "taint_recomputed",
        }
    }
}

/// A persisted event: envelope fields plus a typed payload.
pub type Event = Envelope<EventPayload>;

/// Lenient fallback for forward-compatible readers (`log`/`watch` cursors):
/// any object with `type`/`timestamp`/`seq` is accepted, unknown fields kept
/// verbatim in `fields` rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub type_name: String,
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}
