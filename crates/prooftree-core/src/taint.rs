//! Scope and taint (spec §4.G): the lattice `clean ⊑ tainted`, `clean ⊑
//! unresolved`, with `self_admitted`/`tainted` incomparable to `unresolved`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::NodeId;
use crate::state::{EpistemicState, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taint {
    Clean,
    SelfAdmitted,
    Tainted,
    Unresolved,
}

impl Taint {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(Self::Clean),
            "self_admitted" => Some(Self::SelfAdmitted),
            "tainted" => Some(Self::Tainted),
            "unresolved" => Some(Self::Unresolved),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::SelfAdmitted => "self_admitted",
            Self::Tainted => "tainted",
            Self::Unresolved => "unresolved",
        }
    }

    /// Join under the lattice: `clean` is bottom; `self_admitted`/`tainted`
    /// and `unresolved` are mutually incomparable, each absorbing `clean`.
    fn join(self, other: Self) -> Self {
        use Taint::{Clean, SelfAdmitted, Tainted, Unresolved};
        match (self, other) {
            (Clean, x) | (x, Clean) => x,
            (SelfAdmitted, SelfAdmitted) => SelfAdmitted,
            (Tainted, Tainted)
            | (SelfAdmitted, Tainted)
            | (Tainted, SelfAdmitted) => Tainted,
            (Unresolved, Unresolved) => Unresolved,
            // Incomparable pairs: a node cannot simultaneously be
            // "dependency unresolved" and "dependency admitted" under one
            // validation dep, but across multiple deps both signals can
            // arise; tainted/self_admitted (resolved-but-suspect) outranks
            // unresolved (simply incomplete) when both are observed.
            (Unresolved, SelfAdmitted | Tainted) | (SelfAdmitted | Tainted, Unresolved) => Tainted,
        }
    }
}

/// Recompute taint for `start` and every node that transitively lists it in
/// `validation_deps`, returning the nodes whose taint value changed (in the
/// order they were recomputed) so the caller can emit `taint_recomputed`.
pub fn recompute_from(state: &mut State, start: &NodeId) -> Vec<(NodeId, Taint)> {
    let mut changed = Vec::new();
    let mut queue = std::collections::VecDeque::new();
    let mut queued: BTreeSet<NodeId> = BTreeSet::new();
    queue.push_back(start.clone());
    queued.insert(start.clone());

    while let Some(id) = queue.pop_front() {
        let Some(node) = state.nodes.get(&id) else {
            continue;
        };
        let own = match node.epistemic_state {
            EpistemicState::Admitted => Taint::SelfAdmitted,
            _ => Taint::Clean,
        };
        let mut dep_taint = Taint::Clean;
        for dep in &node.validation_deps {
            let dep_value = match state.nodes.get(dep) {
                None => Taint::Unresolved,
                Some(dep_node) => {
                    let resolved = matches!(
                        dep_node.epistemic_state,
                        EpistemicState::Validated | EpistemicState::Admitted
                    );
                    let existing = state.taints.get(dep).copied().unwrap_or(Taint::Clean);
                    if !resolved {
                        Taint::Unresolved
                    } else if dep_node.epistemic_state == EpistemicState::Admitted
                        || existing != Taint::Clean
                    {
                        Taint::Tainted
                    } else {
                        Taint::Clean
                    }
                }
            };
            dep_taint = dep_taint.join(dep_value);
        }
        let new_value = own.join(dep_taint);
        let previous = state.taints.get(&id).copied().unwrap_or(Taint::Clean);
        if previous != new_value {
            state.taints.insert(id.clone(), new_value);
            changed.push((id.clone(), new_value));
            for dependent in state.validation_dependents(&id) {
                if queued.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
    }
    changed
}

/// All taint values as an ordered map, for tests and rendering.
pub fn snapshot(state: &State) -> BTreeMap<NodeId, Taint> {
    state.taints.clone()
}
