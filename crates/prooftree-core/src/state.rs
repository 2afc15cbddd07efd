//! The state folder (spec §4.E): pure replay of an ordered event stream into
//! an in-memory snapshot. Folding never performs I/O; it consumes whatever
//! `Vec<Event>` the caller already read from the ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::{Event, EventPayload};
use crate::ids::NodeId;
use crate::taint::Taint;

/// Epistemic state of a node (spec §3). Terminal once reached, except that
/// `taint_recomputed` may still update the derived `taint` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpistemicState {
    Pending,
    Validated,
    Admitted,
    Refuted,
    Archived,
}

impl EpistemicState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Primary workflow state stored on the node. `Blocked` is never stored here —
/// it is a derived view computed by [`State::workflow_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Available,
    Claimed,
}

/// The derived, user-facing workflow state including the `blocked` view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Available,
    Claimed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: String,
    pub statement: String,
    pub amendment_history: Vec<String>,
    pub inference_rule: String,
    pub dependencies: Vec<NodeId>,
    pub validation_deps: Vec<NodeId>,
    pub epistemic_state: EpistemicState,
    pub claim_state: ClaimState,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claim_lease_expires: Option<DateTime<Utc>>,
    pub context: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct External {
    pub id: String,
    pub name: String,
    pub source: String,
    pub content_hash: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Open,
    Resolved,
    Withdrawn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub target_node: NodeId,
    pub target_field: String,
    pub reason: String,
    pub status: ChallengeStatus,
    pub raised_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A scope opened by a `local_assume` node. Active iff `discharged_by` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub introduced_by: NodeId,
    pub statement: String,
    pub discharged_by: Option<NodeId>,
}

/// The full folded snapshot (spec §4.E): nodes, externals, definitions,
/// challenges, and the scope table. The lock table is not separately
/// represented — claim fields live on [`Node`] directly, matching the rule
/// that workflow claim state is folded from `nodes_claimed`/`nodes_released`/
/// `lock_reaped` events rather than tracked out-of-band.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    pub nodes: BTreeMap<NodeId, Node>,
    pub externals: BTreeMap<String, External>,
    pub definitions: BTreeMap<String, Definition>,
    pub challenges: BTreeMap<String, Challenge>,
    pub scopes: BTreeMap<NodeId, ScopeEntry>,
    pub taints: BTreeMap<NodeId, Taint>,
    /// Standalone lemma statements extracted from the proof tree via
    /// `lemma_extracted`, in emission order.
    pub lemmas: Vec<String>,
    pub highest_seq: u64,
}

impl State {
    /// Fold an ordered event stream into a snapshot, starting from empty.
    /// Strict: an unknown `type` or a consistency violation aborts with
    /// `LedgerCorrupt` (the lenient reading used by `log`/`watch` lives
    /// outside core, over [`crate::events::RawEvent`]).
    pub fn fold(events: &[Event]) -> Result<Self> {
        let mut state = Self::default();
        for event in events {
            state.apply(event)?;
        }
        Ok(state)
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::LedgerCorrupt(format!("event references missing node {id}")))
    }

    fn apply(&mut self, event: &Event) -> Result<()> {
        self.highest_seq = self.highest_seq.max(event.seq);
        match &event.payload {
            EventPayload::ProofInitialized { .. } => {}
            EventPayload::NodeCreated { node } => {
                let id = NodeId::parse(&node.id)
                    .map_err(|e| Error::LedgerCorrupt(format!("bad node id in event: {e}")))?;
                let dependencies = parse_ids(&node.dependencies)?;
                let validation_deps = parse_ids(&node.validation_deps)?;
                if self.nodes.contains_key(&id) {
                    return Err(Error::LedgerCorrupt(format!(
                        "duplicate node_created for {id}"
                    )));
                }
                self.nodes.insert(
                    id.clone(),
                    Node {
                        id,
                        node_type: node.node_type.clone(),
                        statement: node.statement.clone(),
                        amendment_history: Vec::new(),
                        inference_rule: node.inference_rule.clone(),
                        dependencies,
                        validation_deps,
                        epistemic_state: EpistemicState::Pending,
                        claim_state: ClaimState::Available,
                        claimed_by: None,
                        claimed_at: None,
                        claim_lease_expires: None,
                        context: Vec::new(),
                    },
                );
            }
            EventPayload::NodeAmended {
                node_id,
                previous_statement,
                new_statement,
                owner: _,
            } => {
                let id = NodeId::parse(node_id)?;
                let node = self.node_mut(&id)?;
                node.amendment_history.push(previous_statement.clone());
                node.statement = new_statement.clone();
            }
            EventPayload::NodesClaimed {
                node_ids,
                owner,
                lease_expires,
                role: _,
            } => {
                for node_id in node_ids {
                    let id = NodeId::parse(node_id)?;
                    let node = self.node_mut(&id)?;
                    node.claim_state = ClaimState::Claimed;
                    node.claimed_by = Some(owner.clone());
                    node.claimed_at = Some(event.timestamp);
                    node.claim_lease_expires = Some(*lease_expires);
                }
            }
            EventPayload::NodesReleased { node_ids, owner: _ } => {
                for node_id in node_ids {
                    let id = NodeId::parse(node_id)?;
                    let node = self.node_mut(&id)?;
                    node.claim_state = ClaimState::Available;
                    node.claimed_by = None;
                    node.claimed_at = None;
                    node.claim_lease_expires = None;
                }
            }
            EventPayload::LockReaped { node_id } => {
                let id = NodeId::parse(node_id)?;
                let node = self.node_mut(&id)?;
                node.claim_state = ClaimState::Available;
                node.claimed_by = None;
                node.claimed_at = None;
                node.claim_lease_expires = None;
            }
            EventPayload::NodeValidated { node_id } => {
                let id = NodeId::parse(node_id)?;
                self.transition_terminal(&id, EpistemicState::Validated)?;
            }
            EventPayload::NodeAdmitted { node_id } => {
                let id = NodeId::parse(node_id)?;
                self.transition_terminal(&id, EpistemicState::Admitted)?;
            }
            EventPayload::NodeRefuted { node_id } => {
                let id = NodeId::parse(node_id)?;
                self.transition_terminal(&id, EpistemicState::Refuted)?;
            }
            EventPayload::NodeArchived { node_id, .. } => {
                let id = NodeId::parse(node_id)?;
                self.transition_terminal(&id, EpistemicState::Archived)?;
            }
            EventPayload::ChallengeRaised {
                challenge_id,
                node_id,
                target_field,
                reason,
            } => {
                let target_node = NodeId::parse(node_id)?;
                self.challenges.insert(
                    challenge_id.clone(),
                    Challenge {
                        id: challenge_id.clone(),
                        target_node,
                        target_field: target_field.clone(),
                        reason: reason.clone(),
                        status: ChallengeStatus::Open,
                        raised_at: event.timestamp,
                        closed_at: None,
                    },
                );
            }
            EventPayload::ChallengeResolved { challenge_id } => {
                self.close_challenge(challenge_id, ChallengeStatus::Resolved, event.timestamp)?;
            }
            EventPayload::ChallengeWithdrawn { challenge_id } => {
                self.close_challenge(challenge_id, ChallengeStatus::Withdrawn, event.timestamp)?;
            }
            EventPayload::DefAdded { definition } => {
                self.definitions.insert(
                    definition.name.clone(),
                    Definition {
                        name: definition.name.clone(),
                        body: definition.body.clone(),
                    },
                );
            }
            EventPayload::ExternalAdded { external } => {
                self.externals.insert(
                    external.id.clone(),
                    External {
                        id: external.id.clone(),
                        name: external.name.clone(),
                        source: external.source.clone(),
                        content_hash: external.content_hash.clone(),
                        notes: String::new(),
                    },
                );
            }
            EventPayload::ExternalUpdated { id, notes } => {
                let external = self.externals.get_mut(id).ok_or_else(|| {
                    Error::LedgerCorrupt(format!("external_updated references missing {id}"))
                })?;
                external.notes = notes.clone();
            }
            EventPayload::LemmaExtracted { lemma } => {
                self.lemmas.push(lemma.clone());
            }
            EventPayload::ScopeOpened { node_id, statement } => {
                let id = NodeId::parse(node_id)?;
                if !self
                    .nodes
                    .get(&id)
                    .is_some_and(|n| n.node_type == "local_assume")
                {
                    return Err(Error::LedgerCorrupt(format!(
                        "scope_opened on non-local_assume node {id}"
                    )));
                }
                self.scopes.insert(
                    id.clone(),
                    ScopeEntry {
                        introduced_by: id,
                        statement: statement.clone(),
                        discharged_by: None,
                    },
                );
            }
            EventPayload::ScopeClosed {
                node_id,
                discharged_by,
            } => {
                let id = NodeId::parse(node_id)?;
                let discharger = NodeId::parse(discharged_by)?;
                let scope = self.scopes.get_mut(&id).ok_or_else(|| {
                    Error::LedgerCorrupt(format!("scope_closed without scope_opened for {id}"))
                })?;
                scope.discharged_by = Some(discharger);
            }
            EventPayload::TaintRecomputed { node_id, new_taint } => {
                let id = NodeId::parse(node_id)?;
                let taint = Taint::parse(new_taint).ok_or_else(|| {
                    Error::LedgerCorrupt(format!("unknown taint value {new_taint:?}"))
                })?;
                self.taints.insert(id, taint);
            }
        }
        Ok(())
    }

    fn transition_terminal(&mut self, id: &NodeId, target: EpistemicState) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.epistemic_state.is_terminal() {
            tracing::warn!(
                "[fold] rejecting transition of {id} out of terminal state {:?} to {target:?}",
                node.epistemic_state
            );
            return Err(Error::LedgerCorrupt(format!(
                "transition of node {id} out of terminal state {:?} to {target:?}",
                node.epistemic_state
            )));
        }
        node.epistemic_state = target;
        Ok(())
    }

    fn close_challenge(
        &mut self,
        challenge_id: &str,
        status: ChallengeStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let challenge = self.challenges.get_mut(challenge_id).ok_or_else(|| {
            Error::LedgerCorrupt(format!("closing unknown challenge {challenge_id}"))
        })?;
        if challenge.status != ChallengeStatus::Open {
            return Err(Error::LedgerCorrupt(format!(
                "double-close of challenge {challenge_id}"
            )));
        }
        challenge.status = status;
        challenge.closed_at = Some(at);
        Ok(())
    }

    /// The derived workflow state of a node (spec §4.E): `blocked` whenever
    /// any `validation_deps` entry is neither `validated` nor `admitted` and
    /// the node is not currently claimed.
    pub fn workflow_state(&self, id: &NodeId) -> Option<WorkflowState> {
        let node = self.nodes.get(id)?;
        if node.claim_state == ClaimState::Claimed {
            return Some(WorkflowState::Claimed);
        }
        let blocked = node.validation_deps.iter().any(|dep| {
            self.nodes.get(dep).is_none_or(|d| {
                !matches!(
                    d.epistemic_state,
                    EpistemicState::Validated | EpistemicState::Admitted
                )
            })
        });
        Some(if blocked {
            WorkflowState::Blocked
        } else {
            WorkflowState::Available
        })
    }

    /// Scopes whose `introduced_by` is an ancestor of `id` and which are
    /// still active (not yet discharged).
    pub fn containing_scopes(&self, id: &NodeId) -> Vec<&ScopeEntry> {
        self.scopes
            .values()
            .filter(|s| s.discharged_by.is_none() && s.introduced_by.is_strict_ancestor_of(id))
            .collect()
    }

    /// Nodes whose `validation_deps` (directly) include `id`.
    pub fn validation_dependents(&self, id: &NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.validation_deps.contains(id))
            .map(|n| n.id.clone())
            .collect()
    }
}

fn parse_ids(raw: &[String]) -> Result<Vec<NodeId>> {
    raw.iter().map(|s| NodeId::parse(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Envelope, NewNode};
    use chrono::Utc;

    fn event(seq: u64, payload: EventPayload) -> Event {
        Envelope {
            timestamp: Utc::now(),
            seq,
            payload,
        }
    }

    fn new_node(id: &str, val_deps: &[&str]) -> NewNode {
        NewNode {
            id: id.to_string(),
            node_type: "claim".to_string(),
            statement: "s".to_string(),
            inference_rule: "assumption".to_string(),
            dependencies: vec![],
            validation_deps: val_deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn fold_creates_node_in_pending_available_state() {
        let events = vec![event(
            1,
            EventPayload::NodeCreated {
                node: new_node("1", &[]),
            },
        )];
        let state = State::fold(&events).unwrap();
        let node = state.nodes.get(&NodeId::parse("1").unwrap()).unwrap();
        assert_eq!(node.epistemic_state, EpistemicState::Pending);
        assert_eq!(node.claim_state, ClaimState::Available);
    }

    #[test]
    fn blocked_view_derives_from_unmet_validation_deps() {
        let events = vec![
            event(
                1,
                EventPayload::NodeCreated {
                    node: new_node("1", &[]),
                },
            ),
            event(
                2,
                EventPayload::NodeCreated {
                    node: new_node("1.1", &["1"]),
                },
            ),
        ];
        let state = State::fold(&events).unwrap();
        let id = NodeId::parse("1.1").unwrap();
        assert!(matches!(
            state.workflow_state(&id),
            Some(WorkflowState::Blocked)
        ));
    }

    #[test]
    fn terminal_transition_cannot_be_rewritten() {
        let events = vec![
            event(
                1,
                EventPayload::NodeCreated {
                    node: new_node("1", &[]),
                },
            ),
            event(
                2,
                EventPayload::NodeValidated {
                    node_id: "1".to_string(),
                },
            ),
            event(
                3,
                EventPayload::NodeRefuted {
                    node_id: "1".to_string(),
                },
            ),
        ];
        let err = State::fold(&events).unwrap_err();
        assert!(matches!(err, Error::LedgerCorrupt(_)));
    }

    #[test]
    fn amend_pushes_previous_statement_to_history() {
        let events = vec![
            event(
                1,
                EventPayload::NodeCreated {
                    node: new_node("1", &[]),
                },
            ),
            event(
                2,
                EventPayload::NodeAmended {
                    node_id: "1".to_string(),
                    previous_statement: "s".to_string(),
                    new_statement: "v2".to_string(),
                    owner: "a".to_string(),
                },
            ),
        ];
        let state = State::fold(&events).unwrap();
        let node = state.nodes.get(&NodeId::parse("1").unwrap()).unwrap();
        assert_eq!(node.statement, "v2");
        assert_eq!(node.amendment_history, vec!["s".to_string()]);
    }

    #[test]
    fn double_resolve_is_ledger_corrupt() {
        let events = vec![
            event(
                1,
                EventPayload::NodeCreated {
                    node: new_node("1", &[]),
                },
            ),
            event(
                2,
                EventPayload::ChallengeRaised {
                    challenge_id: "c1".to_string(),
                    node_id: "1".to_string(),
                    target_field: "statement".to_string(),
                    reason: "vague".to_string(),
                },
            ),
            event(
                3,
                EventPayload::ChallengeResolved {
                    challenge_id: "c1".to_string(),
                },
            ),
            event(
                4,
                EventPayload::ChallengeResolved {
                    challenge_id: "c1".to_string(),
                },
            ),
        ];
        let err = State::fold(&events).unwrap_err();
        assert!(matches!(err, Error::LedgerCorrupt(_)));
    }

    #[test]
    fn determinism_refolding_same_prefix_is_bit_identical() {
        let events = vec![
            event(
                1,
                EventPayload::NodeCreated {
                    node: new_node("1", &[]),
                },
            ),
            event(
                2,
                EventPayload::NodeValidated {
                    node_id: "1".to_string(),
                },
            ),
        ];
        let a = serde_json::to_string(&State::fold(&events).unwrap()).unwrap();
        let b = serde_json::to_string(&State::fold(&events).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
