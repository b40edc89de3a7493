//! Paths: named collections of branches grouped by stage.
//!
//! The bot context owns one `global` path; scenes create ephemeral scoped
//! paths that take precedence for their participants. Branch order within a
//! stage is registration order, and a duplicate id replaces the earlier
//! branch.

use serde_json::Value;

use crate::branches::{Action, Branch, BranchCallback, BranchPredicate, Matcher};
use crate::conditions::Conditions;
use crate::nlu::NluCriteria;
use crate::thought::Stage;

/// A named set of branches, one ordered collection per branch stage.
#[derive(Clone, Debug, Default)]
pub struct Path {
    /// Scope name; `global` for the process-wide path.
    pub scope: String,
    listen: Vec<Branch>,
    understand: Vec<Branch>,
    serve: Vec<Branch>,
    act: Vec<Branch>,
}

impl Path {
    /// Create a path with the given scope name.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Default::default()
        }
    }

    /// The process-wide default path.
    pub fn global() -> Self {
        Self::new("global")
    }

    fn collection(&self, stage: Stage) -> Option<&Vec<Branch>> {
        match stage {
            Stage::Listen => Some(&self.listen),
            Stage::Understand => Some(&self.understand),
            Stage::Serve => Some(&self.serve),
            Stage::Act => Some(&self.act),
            _ => None,
        }
    }

    fn collection_mut(&mut self, stage: Stage) -> Option<&mut Vec<Branch>> {
        match stage {
            Stage::Listen => Some(&mut self.listen),
            Stage::Understand => Some(&mut self.understand),
            Stage::Serve => Some(&mut self.serve),
            Stage::Act => Some(&mut self.act),
            _ => None,
        }
    }

    /// Insert a branch at a stage, returning its id. A branch with the same
    /// id replaces the earlier registration (in any stage, so a branch lives
    /// in exactly one stage collection). Stages without branch collections
    /// are rejected with a warning.
    pub fn add(&mut self, branch: Branch, stage: Stage) -> Option<String> {
        if self.collection(stage).is_none() {
            log::warn!(
                "[path] stage '{stage}' takes no branches; dropping branch {}",
                branch.id
            );
            return None;
        }
        let id = branch.id.clone();
        for other in [Stage::Listen, Stage::Understand, Stage::Serve, Stage::Act] {
            if let Some(collection) = self.collection_mut(other) {
                if other == stage {
                    continue;
                }
                collection.retain(|b| b.id != id);
            }
        }
        let collection = self.collection_mut(stage).expect("stage checked above");
        if let Some(existing) = collection.iter_mut().find(|b| b.id == id) {
            *existing = branch;
        } else {
            collection.push(branch);
        }
        Some(id)
    }

    /// Branches registered at a stage, in registration order.
    pub fn branches(&self, stage: Stage) -> &[Branch] {
        self.collection(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Empty the listen, understand, and act collections. Serve branches are
    /// preserved.
    pub fn reset(&mut self) {
        self.listen.clear();
        self.understand.clear();
        self.act.clear();
    }

    /// Remove every branch without the force flag from a stage, returning
    /// how many branches remain.
    pub fn forced(&mut self, stage: Stage) -> usize {
        match self.collection_mut(stage) {
            Some(collection) => {
                collection.retain(|b| b.force);
                collection.len()
            }
            None => 0,
        }
    }

    /// Total branch count across all stages.
    pub fn len(&self) -> usize {
        self.listen.len() + self.understand.len() + self.serve.len() + self.act.len()
    }

    /// Whether the path has no branches at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -----------------------------------------------------------------------
    // Factories
    // -----------------------------------------------------------------------

    /// Listen for text matching the conditions.
    pub fn text(&mut self, conditions: Conditions, callback: BranchCallback) -> String {
        self.add(
            Branch::new(Matcher::Text(conditions), Action::Callback(callback)),
            Stage::Listen,
        )
        .expect("listen accepts branches")
    }

    /// Listen for text addressed to the bot by name.
    pub fn direct(&mut self, conditions: Conditions, callback: BranchCallback) -> String {
        self.add(
            Branch::new(Matcher::TextDirect(conditions), Action::Callback(callback)),
            Stage::Listen,
        )
        .expect("listen accepts branches")
    }

    /// Listen with an arbitrary predicate.
    pub fn custom(&mut self, predicate: BranchPredicate, callback: BranchCallback) -> String {
        self.add(
            Branch::new(Matcher::Custom(predicate), Action::Callback(callback)),
            Stage::Listen,
        )
        .expect("listen accepts branches")
    }

    /// Understand NLU results matching the criteria.
    pub fn nlu(&mut self, criteria: NluCriteria, callback: BranchCallback) -> String {
        self.add(
            Branch::new(Matcher::NaturalLanguage(criteria), Action::Callback(callback)),
            Stage::Understand,
        )
        .expect("understand accepts branches")
    }

    /// Understand NLU results when the bot is addressed by name.
    pub fn nlu_direct(&mut self, criteria: NluCriteria, callback: BranchCallback) -> String {
        self.add(
            Branch::new(
                Matcher::NaturalLanguageDirect(criteria),
                Action::Callback(callback),
            ),
            Stage::Understand,
        )
        .expect("understand accepts branches")
    }

    /// Serve server messages whose payload contains the criteria.
    pub fn server(&mut self, criteria: Value, callback: BranchCallback) -> String {
        self.add(
            Branch::new(Matcher::Server(criteria), Action::Callback(callback)),
            Stage::Serve,
        )
        .expect("serve accepts branches")
    }

    /// Act on messages nothing else matched.
    pub fn catch_all(&mut self, callback: BranchCallback) -> String {
        self.add(
            Branch::new(Matcher::CatchAll, Action::Callback(callback)),
            Stage::Act,
        )
        .expect("act accepts branches")
    }

    /// Listen for text and run a bit on match.
    pub fn text_bit(&mut self, conditions: Conditions, bit_id: impl Into<String>) -> String {
        self.add(
            Branch::new(Matcher::Text(conditions), Action::Bit(bit_id.into())),
            Stage::Listen,
        )
        .expect("listen accepts branches")
    }

    /// Understand NLU criteria and run a bit on match.
    pub fn nlu_bit(&mut self, criteria: NluCriteria, bit_id: impl Into<String>) -> String {
        self.add(
            Branch::new(Matcher::NaturalLanguage(criteria), Action::Bit(bit_id.into())),
            Stage::Understand,
        )
        .expect("understand accepts branches")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branches::callback;
    use crate::state::State;

    fn noop() -> BranchCallback {
        callback(|_b: &mut State| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn test_add_and_order() {
        let mut path = Path::global();
        let first = path.text(Conditions::from_expression("/a/").unwrap(), noop());
        let second = path.text(Conditions::from_expression("/b/").unwrap(), noop());
        let ids: Vec<&str> = path
            .branches(Stage::Listen)
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);
    }

    #[test]
    fn test_duplicate_id_replaces() {
        let mut path = Path::global();
        let branch_a = Branch::new(
            Matcher::Text(Conditions::from_expression("/a/").unwrap()),
            Action::Callback(noop()),
        )
        .with_id("shared");
        let branch_b = Branch::new(
            Matcher::Text(Conditions::from_expression("/b/").unwrap()),
            Action::Callback(noop()),
        )
        .with_id("shared");
        path.add(branch_a, Stage::Listen);
        path.add(branch_b, Stage::Listen);
        assert_eq!(path.branches(Stage::Listen).len(), 1);
    }

    #[test]
    fn test_duplicate_id_moves_between_stages() {
        let mut path = Path::global();
        let branch_a = Branch::new(Matcher::CatchAll, Action::Callback(noop())).with_id("shared");
        let branch_b = Branch::new(Matcher::CatchAll, Action::Callback(noop())).with_id("shared");
        path.add(branch_a, Stage::Listen);
        path.add(branch_b, Stage::Act);
        assert!(path.branches(Stage::Listen).is_empty());
        assert_eq!(path.branches(Stage::Act).len(), 1);
    }

    #[test]
    fn test_reset_preserves_serve() {
        let mut path = Path::global();
        path.text(Conditions::from_expression("/a/").unwrap(), noop());
        path.nlu(NluCriteria::intent("greet"), noop());
        path.catch_all(noop());
        path.server(serde_json::json!({"k": 1}), noop());
        path.reset();
        assert!(path.branches(Stage::Listen).is_empty());
        assert!(path.branches(Stage::Understand).is_empty());
        assert!(path.branches(Stage::Act).is_empty());
        assert_eq!(path.branches(Stage::Serve).len(), 1);
    }

    #[test]
    fn test_forced_retains_only_forced() {
        let mut path = Path::global();
        path.text(Conditions::from_expression("/a/").unwrap(), noop());
        let forced = Branch::new(
            Matcher::Text(Conditions::from_expression("/b/").unwrap()),
            Action::Callback(noop()),
        )
        .with_force();
        path.add(forced, Stage::Listen);
        assert_eq!(path.forced(Stage::Listen), 1);
        assert!(path.branches(Stage::Listen).iter().all(|b| b.force));
        assert_eq!(path.branches(Stage::Listen).len(), 1);
    }

    #[test]
    fn test_non_branch_stage_rejected() {
        let mut path = Path::global();
        let branch = Branch::new(Matcher::CatchAll, Action::Callback(noop()));
        assert!(path.add(branch, Stage::Respond).is_none());
        assert!(path.is_empty());
    }
}
