//! The service layer (spec §4.F): the only component that emits events.
//! Every command folds the current ledger, validates preconditions against
//! that snapshot, and — only on success — appends one or more events. A
//! validation failure never touches the ledger.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Envelope, EventPayload, NewDefinition, NewExternal, NewNode};
use crate::ids::NodeId;
use crate::ledger::Ledger;
use crate::locks::{LockRecord, LockRegistry};
use crate::paths;
use crate::state::{ChallengeStatus, ClaimState, EpistemicState, State};
use crate::taint;

/// Outcome of a (possibly multi-node) claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Busy { node: NodeId, owner: String },
}

/// Entry point for every proof-directory mutation. Cheap to construct per
/// command, matching the "short-lived process" scheduling model (spec §5).
pub struct Service {
    proof_dir: PathBuf,
    config: Config,
}

impl Service {
    pub fn new(proof_dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            proof_dir: proof_dir.into(),
            config,
        }
    }

    /// The configuration this service was constructed with (lease defaults,
    /// retry/fsync policy), so callers (e.g. the CLI) can fall back to the
    /// same defaults the service itself would use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ledger(&self) -> Ledger {
        Ledger::open(paths::ledger_dir(&self.proof_dir), &self.config)
    }

    fn locks(&self) -> LockRegistry {
        LockRegistry::open(paths::locks_dir(&self.proof_dir))
    }

    /// Fold the full ledger into the current snapshot.
    pub fn state(&self) -> Result<State> {
        self.ledger().sweep_temp_files()?;
        let events = self.ledger().read_all()?;
        State::fold(&events)
    }

    fn node<'a>(&self, state: &'a State, id: &NodeId) -> Result<&'a crate::state::Node> {
        state
            .nodes
            .get(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    fn append(&self, payload: EventPayload) -> Result<u64> {
        self.ledger().append(Envelope {
            timestamp: Utc::now(),
            seq: 0,
            payload,
        })
    }

    fn recompute_taint(&self, state: &mut State, start: &NodeId) -> Result<()> {
        for (id, value) in taint::recompute_from(state, start) {
            tracing::debug!("[taint] {id} -> {}", value.as_str());
            self.append(EventPayload::TaintRecomputed {
                node_id: id.to_string(),
                new_taint: value.as_str().to_string(),
            })?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------- init

    pub fn init(&self, conjecture: &str, author: &str) -> Result<()> {
        if self.ledger().count()? > 0 {
            return Err(Error::AlreadyInitialized);
        }
        self.append(EventPayload::ProofInitialized {
            conjecture: conjecture.to_string(),
            author: author.to_string(),
        })?;
        self.append(EventPayload::NodeCreated {
            node: NewNode {
                id: NodeId::root().to_string(),
                node_type: "claim".to_string(),
                statement: conjecture.to_string(),
                inference_rule: "assumption".to_string(),
                dependencies: vec![],
                validation_deps: vec![],
            },
        })?;
        let mut state = self.state()?;
        self.recompute_taint(&mut state, &NodeId::root())?;
        Ok(())
    }

    // --------------------------------------------------------- create_node

    #[allow(clippy::too_many_arguments)]
    pub fn create_node(
        &self,
        id: &NodeId,
        node_type: &str,
        statement: &str,
        inference: &str,
        dependencies: &[NodeId],
        validation_deps: &[NodeId],
    ) -> Result<()> {
        let state = self.state()?;
        if statement.trim().is_empty() {
            return Err(Error::MissingField("statement".into()));
        }
        if state.nodes.contains_key(id) {
            return Err(Error::NodeAlreadyExists(id.to_string()));
        }
        if let Some(parent) = id.parent() {
            if !state.nodes.contains_key(&parent) {
                return Err(Error::NodeNotFound(parent.to_string()));
            }
        }
        for dep in dependencies.iter().chain(validation_deps.iter()) {
            if !state.nodes.contains_key(dep) {
                return Err(Error::NodeNotFound(dep.to_string()));
            }
        }
        if introduces_cycle(&state, id, validation_deps) {
            return Err(Error::ValidationCycle(id.to_string()));
        }
        self.append(EventPayload::NodeCreated {
            node: NewNode {
                id: id.to_string(),
                node_type: node_type.to_string(),
                statement: statement.to_string(),
                inference_rule: inference.to_string(),
                dependencies: dependencies.iter().map(ToString::to_string).collect(),
                validation_deps: validation_deps.iter().map(ToString::to_string).collect(),
            },
        })?;
        let mut state = self.state()?;
        self.recompute_taint(&mut state, id)?;
        Ok(())
    }

    /// Convenience: asserts `owner` holds the parent's claim, then creates a
    /// child with no reference or validation dependencies.
    pub fn refine(
        &self,
        parent: &NodeId,
        owner: &str,
        child_id: &NodeId,
        statement: &str,
        inference: &str,
    ) -> Result<()> {
        self.refine_with_all_deps(parent, owner, child_id, statement, inference, &[], &[])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn refine_with_all_deps(
        &self,
        parent: &NodeId,
        owner: &str,
        child_id: &NodeId,
        statement: &str,
        inference: &str,
        dependencies: &[NodeId],
        validation_deps: &[NodeId],
    ) -> Result<()> {
        let state = self.state()?;
        let parent_node = self.node(&state, parent)?;
        if parent_node.claimed_by.as_deref() != Some(owner) {
            return Err(Error::NotOwner {
                node: parent.to_string(),
                owner: owner.to_string(),
            });
        }
        let node_type = parent_node.node_type.clone();
        drop(state);
        self.create_node(
            child_id,
            &node_type,
            statement,
            inference,
            dependencies,
            validation_deps,
        )
    }

    // ------------------------------------------------------------- amend

    pub fn amend(&self, id: &NodeId, owner: &str, new_statement: &str) -> Result<()> {
        if new_statement.trim().is_empty() {
            return Err(Error::MissingField("new_statement".into()));
        }
        let state = self.state()?;
        let node = self.node(&state, id)?;
        if node.epistemic_state != EpistemicState::Pending {
            return Err(Error::NotPending(id.to_string()));
        }
        if let Some(claimed_by) = &node.claimed_by {
            if claimed_by != owner {
                return Err(Error::NotOwner {
                    node: id.to_string(),
                    owner: owner.to_string(),
                });
            }
        }
        // Open question resolution: amending a field under open challenge is
        // rejected rather than silently allowed (spec §9).
        if state
            .challenges
            .values()
            .any(|c| c.target_node == *id && c.status == ChallengeStatus::Open)
        {
            return Err(Error::OpenChallenges(id.to_string()));
        }
        let previous_statement = node.statement.clone();
        self.append(EventPayload::NodeAmended {
            node_id: id.to_string(),
            previous_statement,
            new_statement: new_statement.to_string(),
            owner: owner.to_string(),
        })?;
        Ok(())
    }

    // ------------------------------------------------------------ claim

    /// All-or-nothing claim over `node_ids`, acquired in ascending order.
    pub fn claim(
        &self,
        node_ids: &[NodeId],
        owner: &str,
        lease: Duration,
        role: Option<&str>,
    ) -> Result<ClaimOutcome> {
        let mut ordered: Vec<NodeId> = node_ids.to_vec();
        ordered.sort();
        let locks = self.locks();
        let mut state = self.state()?;

        // Phase 0: existence / availability, reaping expired leases as found.
        for id in &ordered {
            let node = self.node(&state, id)?;
            if node.claim_state == ClaimState::Claimed {
                if let Some(record) = locks.read(id)? {
                    let grace = chrono::Duration::from_std(self.config.reap_grace).unwrap_or_default();
                    if record.is_reapable(Utc::now(), grace) {
                        tracing::info!(
                            "[claim] reaping expired lease on {id} (was held by {})",
                            record.owner
                        );
                        self.append(EventPayload::LockReaped {
                            node_id: id.to_string(),
                        })?;
                        locks.remove(id)?;
                        state = self.state()?;
                        continue;
                    }
                }
                let owner = state.nodes.get(id).and_then(|n| n.claimed_by.clone());
                tracing::debug!("[claim] {id} busy, held by {owner:?}");
                return Ok(ClaimOutcome::Busy {
                    node: id.clone(),
                    owner: owner.unwrap_or_default(),
                });
            }
        }

        // Phase 1: acquire lock files in order; roll back on first failure
        // (spec §4.C "all-or-nothing"). A lock file can outlive its matching
        // ledger claim (e.g. the process that claimed it crashed before
        // releasing) while the fold still shows the node `Available`; such a
        // stale file is reaped here too rather than only in Phase 0.
        let grace = chrono::Duration::from_std(self.config.reap_grace).unwrap_or_default();
        let lease_expires = Utc::now() + chrono::Duration::from_std(lease).unwrap_or_default();
        let mut acquired = Vec::new();
        let mut outcome = None;
        for id in &ordered {
            let record = LockRecord {
                owner: owner.to_string(),
                lease_expires,
                seq: state.highest_seq,
            };
            if locks.try_create(id, &record)? {
                acquired.push(id.clone());
                continue;
            }
            let existing = locks.read(id)?;
            if let Some(stale) = existing.as_ref().filter(|r| r.is_reapable(Utc::now(), grace)) {
                tracing::info!(
                    "[claim] reaping stale lock file on {id} with no matching claim (was held by {})",
                    stale.owner
                );
                self.append(EventPayload::LockReaped {
                    node_id: id.to_string(),
                })?;
                locks.remove(id)?;
                if locks.try_create(id, &record)? {
                    acquired.push(id.clone());
                    continue;
                }
            }
            let current_owner = locks.read(id)?.map(|r| r.owner).unwrap_or_default();
            outcome = Some(ClaimOutcome::Busy {
                node: id.clone(),
                owner: current_owner,
            });
            break;
        }
        if let Some(busy) = outcome {
            for id in &acquired {
                locks.remove(id)?;
            }
            return Ok(busy);
        }

        self.append(EventPayload::NodesClaimed {
            node_ids: ordered.iter().map(ToString::to_string).collect(),
            owner: owner.to_string(),
            lease_expires,
            role: role.map(ToString::to_string),
        })?;
        Ok(ClaimOutcome::Claimed)
    }

    pub fn release(&self, node_ids: &[NodeId], owner: &str) -> Result<()> {
        let state = self.state()?;
        for id in node_ids {
            let node = self.node(&state, id)?;
            if node.claimed_by.as_deref() != Some(owner) {
                return Err(Error::NotOwner {
                    node: id.to_string(),
                    owner: owner.to_string(),
                });
            }
        }
        let locks = self.locks();
        for id in node_ids {
            locks.remove(id)?;
        }
        self.append(EventPayload::NodesReleased {
            node_ids: node_ids.iter().map(ToString::to_string).collect(),
            owner: owner.to_string(),
        })?;
        Ok(())
    }

    // ----------------------------------------------------- epistemic ops

    pub fn accept(&self, id: &NodeId) -> Result<()> {
        let state = self.state()?;
        let node = self.node(&state, id)?;
        if node.epistemic_state != EpistemicState::Pending {
            return Err(Error::NotPending(id.to_string()));
        }
        let unmet: Vec<String> = node
            .validation_deps
            .iter()
            .filter(|dep| {
                !state.nodes.get(*dep).is_some_and(|d| {
                    matches!(
                        d.epistemic_state,
                        EpistemicState::Validated | EpistemicState::Admitted
                    )
                })
            })
            .map(ToString::to_string)
            .collect();
        if !unmet.is_empty() {
            return Err(Error::UnmetValidationDeps {
                node: id.to_string(),
                deps: unmet,
            });
        }
        if state
            .challenges
            .values()
            .any(|c| c.target_node == *id && c.status == ChallengeStatus::Open)
        {
            return Err(Error::OpenChallenges(id.to_string()));
        }
        self.append(EventPayload::NodeValidated {
            node_id: id.to_string(),
        })?;
        let mut state = self.state()?;
        self.recompute_taint(&mut state, id)?;
        Ok(())
    }

    pub fn admit(&self, id: &NodeId) -> Result<()> {
        self.require_pending(id)?;
        self.append(EventPayload::NodeAdmitted {
            node_id: id.to_string(),
        })?;
        let mut state = self.state()?;
        self.recompute_taint(&mut state, id)?;
        Ok(())
    }

    pub fn refute(&self, id: &NodeId) -> Result<()> {
        self.require_pending(id)?;
        self.append(EventPayload::NodeRefuted {
            node_id: id.to_string(),
        })?;
        let mut state = self.state()?;
        self.recompute_taint(&mut state, id)?;
        Ok(())
    }

    pub fn archive(&self, id: &NodeId, reason: Option<&str>) -> Result<()> {
        self.require_pending(id)?;
        self.append(EventPayload::NodeArchived {
            node_id: id.to_string(),
            reason: reason.map(ToString::to_string),
        })?;
        let mut state = self.state()?;
        self.recompute_taint(&mut state, id)?;
        Ok(())
    }

    fn require_pending(&self, id: &NodeId) -> Result<()> {
        let state = self.state()?;
        let node = self.node(&state, id)?;
        if node.epistemic_state != EpistemicState::Pending {
            return Err(Error::NotPending(id.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------- challenges

    pub fn challenge_raise(&self, node_id: &NodeId, target_field: &str, reason: &str) -> Result<String> {
        let state = self.state()?;
        self.node(&state, node_id)?;
        let challenge_id = format!("c{}", state.challenges.len() + 1);
        self.append(EventPayload::ChallengeRaised {
            challenge_id: challenge_id.clone(),
            node_id: node_id.to_string(),
            target_field: target_field.to_string(),
            reason: reason.to_string(),
        })?;
        Ok(challenge_id)
    }

    pub fn challenge_resolve(&self, challenge_id: &str) -> Result<()> {
        self.close_challenge(challenge_id, EventPayload::ChallengeResolved {
            challenge_id: challenge_id.to_string(),
        })
    }

    pub fn challenge_withdraw(&self, challenge_id: &str) -> Result<()> {
        self.close_challenge(challenge_id, EventPayload::ChallengeWithdrawn {
            challenge_id: challenge_id.to_string(),
        })
    }

    fn close_challenge(&self, challenge_id: &str, payload: EventPayload) -> Result<()> {
        let state = self.state()?;
        let challenge = state
            .challenges
            .get(challenge_id)
            .ok_or_else(|| Error::ChallengeNotFound(challenge_id.to_string()))?;
        if challenge.status != ChallengeStatus::Open {
            return Err(Error::ChallengeAlreadyClosed(challenge_id.to_string()));
        }
        self.append(payload)?;
        Ok(())
    }

    // ---------------------------------------------------------- scopes

    pub fn open_scope(&self, node_id: &NodeId, statement: &str) -> Result<()> {
        let state = self.state()?;
        let node = self.node(&state, node_id)?;
        if node.node_type != "local_assume" {
            return Err(Error::NotLocalAssume(node_id.to_string()));
        }
        self.append(EventPayload::ScopeOpened {
            node_id: node_id.to_string(),
            statement: statement.to_string(),
        })?;
        Ok(())
    }

    pub fn close_scope(&self, node_id: &NodeId, discharged_by: &NodeId) -> Result<()> {
        let state = self.state()?;
        let scope = state
            .scopes
            .get(node_id)
            .ok_or_else(|| Error::NoActiveScope(node_id.to_string()))?;
        if scope.discharged_by.is_some() {
            return Err(Error::NoActiveScope(node_id.to_string()));
        }
        if !node_id.is_ancestor_of_or_eq(discharged_by) {
            return Err(Error::NotDescendant {
                scope: node_id.to_string(),
                discharger: discharged_by.to_string(),
            });
        }
        self.append(EventPayload::ScopeClosed {
            node_id: node_id.to_string(),
            discharged_by: discharged_by.to_string(),
        })?;
        Ok(())
    }

    // -------------------------------------------------------- externals

    pub fn add_external(&self, name: &str, source: &str) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(source.as_bytes());
        let digest = hex::encode(hasher.finalize());
        let id = digest[..12].to_string();
        let state = self.state()?;
        if state.externals.contains_key(&id) {
            return Err(Error::ExternalAlreadyExists(id));
        }
        self.append(EventPayload::ExternalAdded {
            external: NewExternal {
                id: id.clone(),
                name: name.to_string(),
                source: source.to_string(),
                content_hash: digest.clone(),
            },
        })?;
        self.materialize_external(&id, name, source, &digest, "")?;
        Ok(id)
    }

    pub fn verify_external(&self, id: &str, note: &str) -> Result<()> {
        let state = self.state()?;
        let external = state
            .externals
            .get(id)
            .ok_or_else(|| Error::ExternalNotFound(id.to_string()))?;
        let notes = if external.notes.is_empty() {
            note.to_string()
        } else {
            format!("{}; {note}", external.notes)
        };
        let (name, source, content_hash) = (
            external.name.clone(),
            external.source.clone(),
            external.content_hash.clone(),
        );
        self.append(EventPayload::ExternalUpdated {
            id: id.to_string(),
            notes: notes.clone(),
        })?;
        self.materialize_external(id, &name, &source, &content_hash, &notes)?;
        Ok(())
    }

    /// Write the addressable `externals/<id>.json` file (spec §3, §6). This is
    /// a fast-lookup materialization of the same data already durable in the
    /// ledger, matching the lock registry's pattern of an auxiliary file next
    /// to the authoritative event stream.
    fn materialize_external(
        &self,
        id: &str,
        name: &str,
        source: &str,
        content_hash: &str,
        notes: &str,
    ) -> Result<()> {
        let path = paths::externals_dir(&self.proof_dir).join(format!("{id}.json"));
        let body = serde_json::to_vec_pretty(&crate::state::External {
            id: id.to_string(),
            name: name.to_string(),
            source: source.to_string(),
            content_hash: content_hash.to_string(),
            notes: notes.to_string(),
        })?;
        paths::write_file_atomic(&path, &body)?;
        Ok(())
    }

    /// Record a standalone lemma statement extracted from the proof tree
    /// (spec §4.D `lemma_extracted`). Unlike `create_node`, a lemma is not
    /// itself a tree node — it is a citable derived fact, kept in an
    /// append-only list rather than the node map.
    pub fn extract_lemma(&self, lemma: &str) -> Result<()> {
        if lemma.trim().is_empty() {
            return Err(Error::MissingField("lemma".into()));
        }
        self.append(EventPayload::LemmaExtracted {
            lemma: lemma.to_string(),
        })?;
        Ok(())
    }

    pub fn add_definition(&self, name: &str, body: &str) -> Result<()> {
        self.append(EventPayload::DefAdded {
            definition: NewDefinition {
                name: name.to_string(),
                body: body.to_string(),
            },
        })?;
        let path = paths::definitions_dir(&self.proof_dir).join(format!("{name}.json"));
        let bytes = serde_json::to_vec_pretty(&crate::state::Definition {
            name: name.to_string(),
            body: body.to_string(),
        })?;
        paths::write_file_atomic(&path, &bytes)?;
        Ok(())
    }
}

fn introduces_cycle(state: &State, new_id: &NodeId, validation_deps: &[NodeId]) -> bool {
    // A brand-new node can only introduce a cycle if one of its validation
    // deps transitively depends on it — impossible since `new_id` does not
    // yet exist in any other node's `validation_deps`. Kept as an explicit
    // DFS guard so the invariant stays checked if that assumption ever
    // changes (e.g. a future `add_validation_dep` mutation).
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack: Vec<NodeId> = validation_deps.to_vec();
    while let Some(id) = stack.pop() {
        if id == *new_id {
            return true;
        }
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(node) = state.nodes.get(&id) {
            stack.extend(node.validation_deps.iter().cloned());
        }
    }
    false
}

/// Resolve the default proof directory: the current working directory.
pub fn default_proof_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Make a [`Service`] for `dir`, falling back to [`default_proof_dir`] when
/// `dir` is `None` (spec §6: `dir` defaults to the current directory).
pub fn service_for(dir: Option<&Path>, config: Config) -> Service {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(default_proof_dir);
    Service::new(dir, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn service(dir: &Path) -> Service {
        Service::new(dir, Config::default())
    }

    #[test]
    fn scenario_init_and_accept_root() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P=>Q", "a").unwrap();
        svc.accept(&NodeId::root()).unwrap();
        let state = svc.state().unwrap();
        let root = state.nodes.get(&NodeId::root()).unwrap();
        assert_eq!(root.epistemic_state, EpistemicState::Validated);
        let events = svc.ledger().read_all().unwrap();
        let types: Vec<_> = events.iter().map(|e| e.payload.type_name()).collect();
        assert!(types.starts_with(&["proof_initialized", "node_created", "node_validated"]));
    }

    /// `init` on a brand-new proof must produce exactly these three events,
    /// with no spurious `taint_recomputed` for the still-clean root.
    #[test]
    fn init_emits_exactly_proof_initialized_and_node_created() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let events = svc.ledger().read_all().unwrap();
        let types: Vec<_> = events.iter().map(|e| e.payload.type_name()).collect();
        assert_eq!(types, vec!["proof_initialized", "node_created"]);
    }

    #[test]
    fn scenario_blocked_acceptance() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let n11 = NodeId::parse("1.1").unwrap();
        let n12 = NodeId::parse("1.2").unwrap();
        svc.create_node(&n11, "claim", "step", "modus_ponens", &[], &[])
            .unwrap();
        svc.create_node(&n12, "claim", "uses 1.1", "modus_ponens", &[], &[n11.clone()])
            .unwrap();
        let err = svc.accept(&n12).unwrap_err();
        assert!(matches!(err, Error::UnmetValidationDeps { .. }));
        svc.accept(&n11).unwrap();
        svc.accept(&n12).unwrap();
    }

    /// Five threads race to claim the same node through independent `Service`
    /// handles over one shared proof directory; exactly one must win.
    /// Grounded in the same `Barrier`-synchronized pattern used by the
    /// reference `ClaimCoordinator` test suite's
    /// `test_concurrent_claim_attempts_serialize`.
    #[test]
    fn concurrent_claims_on_shared_directory_serialize_to_one_winner() {
        use std::sync::{Arc, Barrier};

        let dir = tempdir().unwrap();
        let dir_path = Arc::new(dir.path().to_path_buf());
        let setup = Service::new(dir_path.as_path(), Config::default());
        setup.init("P", "a").unwrap();

        let barrier = Arc::new(Barrier::new(5));
        let successes = Arc::new(std::sync::Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let dir_path = Arc::clone(&dir_path);
                let barrier = Arc::clone(&barrier);
                let successes = Arc::clone(&successes);
                std::thread::spawn(move || {
                    let svc = Service::new(dir_path.as_path(), Config::default());
                    barrier.wait();
                    if let Ok(ClaimOutcome::Claimed) =
                        svc.claim(&[NodeId::root()], &format!("agent-{i}"), Duration::from_secs(60), None)
                    {
                        successes.lock().unwrap().push(i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(
            successes.lock().unwrap().len(),
            1,
            "exactly one thread should win the claim on node 1"
        );
    }

    /// A lock file can survive a crash of the process that wrote it without
    /// a matching `nodes_claimed` ever landing in the ledger, leaving the
    /// fold `Available` while `locks/` still holds a (now-expired) file.
    /// `claim` must reap it rather than report `Busy` forever.
    #[test]
    fn claim_reaps_stale_lock_file_with_no_matching_claim_event() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let root = NodeId::root();
        let stale = LockRecord {
            owner: "ghost".to_string(),
            lease_expires: Utc::now() - chrono::Duration::seconds(1),
            seq: 0,
        };
        assert!(svc.locks().try_create(&root, &stale).unwrap());
        let state = svc.state().unwrap();
        assert_eq!(
            state.nodes.get(&root).unwrap().claim_state,
            ClaimState::Available
        );
        let outcome = svc
            .claim(&[root.clone()], "A", Duration::from_secs(60), None)
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);
        let events = svc.ledger().read_all().unwrap();
        let types: Vec<_> = events.iter().map(|e| e.payload.type_name()).collect();
        assert!(types.contains(&"lock_reaped"));
    }

    #[test]
    fn scenario_claim_contention_and_reap() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let root = NodeId::root();
        let lease = Duration::from_millis(50);
        let first = svc.claim(&[root.clone()], "A", lease, None).unwrap();
        assert_eq!(first, ClaimOutcome::Claimed);
        let second = svc.claim(&[root.clone()], "B", Duration::from_secs(5), None).unwrap();
        assert!(matches!(second, ClaimOutcome::Busy { .. }));
        std::thread::sleep(Duration::from_millis(80));
        let third = svc.claim(&[root.clone()], "C", Duration::from_secs(5), None).unwrap();
        assert_eq!(third, ClaimOutcome::Claimed);
        let events = svc.ledger().read_all().unwrap();
        let types: Vec<_> = events.iter().map(|e| e.payload.type_name()).collect();
        assert!(types.contains(&"lock_reaped"));
    }

    #[test]
    fn scenario_taint_propagation() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let n11 = NodeId::parse("1.1").unwrap();
        let n12 = NodeId::parse("1.2").unwrap();
        svc.create_node(&n11, "claim", "a1", "assumption", &[], &[]).unwrap();
        svc.create_node(&n12, "claim", "a2", "assumption", &[], &[n11.clone()])
            .unwrap();
        svc.admit(&n11).unwrap();
        let state = svc.state().unwrap();
        assert_eq!(state.taints.get(&n11), Some(&crate::taint::Taint::SelfAdmitted));
        assert_eq!(state.taints.get(&n12), Some(&crate::taint::Taint::Tainted));
        svc.accept(&n12).unwrap();
        let state = svc.state().unwrap();
        assert_eq!(state.taints.get(&n12), Some(&crate::taint::Taint::Tainted));
    }

    #[test]
    fn scenario_amendment_history() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let n11 = NodeId::parse("1.1").unwrap();
        svc.create_node(&n11, "claim", "v1", "assumption", &[], &[]).unwrap();
        svc.claim(&[n11.clone()], "A", Duration::from_secs(60), None).unwrap();
        svc.amend(&n11, "A", "v2").unwrap();
        let state = svc.state().unwrap();
        let node = state.nodes.get(&n11).unwrap();
        assert_eq!(node.statement, "v2");
        assert_eq!(node.amendment_history, vec!["v1".to_string()]);
    }

    #[test]
    fn scenario_challenge_cycle() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let n11 = NodeId::parse("1.1").unwrap();
        svc.create_node(&n11, "claim", "v1", "assumption", &[], &[]).unwrap();
        let challenge_id = svc.challenge_raise(&n11, "statement", "vague").unwrap();
        let err = svc.accept(&n11).unwrap_err();
        assert!(matches!(err, Error::OpenChallenges(_)));
        svc.challenge_resolve(&challenge_id).unwrap();
        svc.accept(&n11).unwrap();
        let err = svc.challenge_resolve(&challenge_id).unwrap_err();
        assert!(matches!(err, Error::ChallengeAlreadyClosed(_)));
    }

    #[test]
    fn refine_requires_parent_claim() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let child = NodeId::parse("1.1").unwrap();
        let err = svc
            .refine(&NodeId::root(), "A", &child, "s", "modus_ponens")
            .unwrap_err();
        assert!(matches!(err, Error::NotOwner { .. }));
        svc.claim(&[NodeId::root()], "A", Duration::from_secs(60), None)
            .unwrap();
        svc.refine(&NodeId::root(), "A", &child, "s", "modus_ponens")
            .unwrap();
    }

    #[test]
    fn externals_are_content_addressed_and_verifiable() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let id = svc.add_external("paper", "https://example.com").unwrap();
        let id2 = svc.add_external("paper", "https://example.com");
        assert!(matches!(id2, Err(Error::ExternalAlreadyExists(_))));
        svc.verify_external(&id, "checked by reviewer").unwrap();
        let state = svc.state().unwrap();
        assert_eq!(state.externals.get(&id).unwrap().notes, "checked by reviewer");
        let materialized = dir.path().join("externals").join(format!("{id}.json"));
        assert!(materialized.exists());
        let on_disk: crate::state::External =
            serde_json::from_slice(&std::fs::read(materialized).unwrap()).unwrap();
        assert_eq!(on_disk.notes, "checked by reviewer");
    }

    #[test]
    fn definitions_are_materialized_as_files() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        svc.add_definition("continuity", "for all eps > 0 ...").unwrap();
        let path = dir.path().join("definitions").join("continuity.json");
        let on_disk: crate::state::Definition =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(on_disk.body, "for all eps > 0 ...");
        let state = svc.state().unwrap();
        assert_eq!(state.definitions.get("continuity").unwrap().body, "for all eps > 0 ...");
    }

    #[test]
    fn lemma_extraction_is_appended_and_folded_in_order() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        svc.extract_lemma("every Cauchy sequence converges").unwrap();
        svc.extract_lemma("the intermediate value theorem holds").unwrap();
        let err = svc.extract_lemma("  ").unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
        let state = svc.state().unwrap();
        assert_eq!(
            state.lemmas,
            vec![
                "every Cauchy sequence converges".to_string(),
                "the intermediate value theorem holds".to_string(),
            ]
        );
    }

    #[test]
    fn scope_open_close_requires_local_assume_and_descendant() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.init("P", "a").unwrap();
        let assume = NodeId::parse("1.1").unwrap();
        svc.create_node(&assume, "local_assume", "suppose not P", "assumption", &[], &[])
            .unwrap();
        let err = svc.open_scope(&NodeId::root(), "bad").unwrap_err();
        assert!(matches!(err, Error::NotLocalAssume(_)));
        svc.open_scope(&assume, "suppose not P").unwrap();
        let contradiction = NodeId::parse("1.1.1").unwrap();
        svc.create_node(&contradiction, "claim", "contradiction", "assumption", &[], &[])
            .unwrap();
        svc.close_scope(&assume, &contradiction).unwrap();
        let state = svc.state().unwrap();
        assert!(state.scopes.get(&assume).unwrap().discharged_by.is_some());
    }
}
