//! The three-way reconciliation choice offered for every set of findings.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Delete,
    List,
    Skip,
}

impl Decision {
    /// Parses a terminal answer; `None` means the choice was not recognised.
    pub fn parse(input: &str) -> Option<Decision> {
        match input.trim() {
            "d" | "D" => Some(Decision::Delete),
            "l" | "L" => Some(Decision::List),
            "q" | "Q" => Some(Decision::Skip),
            _ => None,
        }
    }
}

/// Source of reconciliation decisions.
pub trait Decider {
    /// Asks what to do about `count` findings described by `what`.
    fn decide(&mut self, what: &str, count: usize) -> Decision;
}

/// Canned decisions, consumed in order. Answers [`Decision::Skip`] once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedDecider {
    answers: VecDeque<Decision>,
    pub asked: usize,
}

impl ScriptedDecider {
    pub fn new(answers: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: 0,
        }
    }
}

impl Decider for ScriptedDecider {
    fn decide(&mut self, _what: &str, _count: usize) -> Decision {
        self.asked += 1;
        self.answers.pop_front().unwrap_or(Decision::Skip)
    }
}

/// Asks until a terminal choice is made. `List` runs `on_list` and asks
/// again; `Delete` runs `on_delete` once. Returns the terminal decision.
pub fn resolve_findings<D, L, R>(
    decider: &mut D,
    what: &str,
    count: usize,
    mut on_list: L,
    on_delete: R,
) -> Decision
where
    D: Decider + ?Sized,
    L: FnMut(),
    R: FnOnce(),
{
    if count == 0 {
        return Decision::Skip;
    }
    loop {
        match decider.decide(what, count) {
            Decision::List => on_list(),
            Decision::Delete => {
                on_delete();
                return Decision::Delete;
            }
            Decision::Skip => return Decision::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Decision::parse("D\n"), Some(Decision::Delete));
        assert_eq!(Decision::parse(" l "), Some(Decision::List));
        assert_eq!(Decision::parse("q"), Some(Decision::Skip));
        assert_eq!(Decision::parse("yes"), None);
    }

    #[test]
    fn test_list_then_delete() {
        let mut decider = ScriptedDecider::new([Decision::List, Decision::List, Decision::Delete]);
        let mut listed = 0;
        let mut deleted = false;
        let decision =
            resolve_findings(&mut decider, "illegal", 3, || listed += 1, || deleted = true);
        assert_eq!(decision, Decision::Delete);
        assert_eq!(listed, 2);
        assert!(deleted);
        assert_eq!(decider.asked, 3);
    }

    #[test]
    fn test_skip_has_no_side_effects() {
        let mut decider = ScriptedDecider::new([Decision::Skip, Decision::Delete]);
        let mut deleted = false;
        let decision = resolve_findings(&mut decider, "dark data", 1, || {}, || deleted = true);
        assert_eq!(decision, Decision::Skip);
        assert!(!deleted);
    }

    #[test]
    fn test_nothing_to_decide() {
        let mut decider = ScriptedDecider::new([Decision::Delete]);
        let decision = resolve_findings(&mut decider, "duplicate", 0, || {}, || {});
        assert_eq!(decision, Decision::Skip);
        assert_eq!(decider.asked, 0);
    }
}
