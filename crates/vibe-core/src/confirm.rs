//! The interactive-confirmation seam (spec §1 Non-goals: "the
//! terminal-rendering layer... is an external collaborator").
//!
//! `CommandContext` needs to gate a handful of actions — PR creation,
//! the stash-or-cancel prompt, the merge trigger — on user confirmation,
//! but owns no opinion about how that confirmation is rendered. Callers
//! supply a [`Confirm`] implementation; `vibe-cli` is expected to back
//! it with an actual terminal prompt, tests with a scripted answer.

/// The answer to the uncommitted-change transition's stash prompt
/// (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashDecision {
    Stash,
    Cancel,
}

/// Asks yes/no and stash/cancel questions. `non_interactive` callers
/// (`--yes`, piped stdin) should supply [`NonInteractive`] instead of a
/// real prompt.
pub trait Confirm {
    /// Present `message` and return whether the user approved.
    fn confirm(&self, message: &str) -> bool;

    /// Present the uncommitted-change transition's choice.
    fn stash_or_cancel(&self, message: &str) -> StashDecision;
}

/// Always approves, never stashes are asked for — used when `--yes` is
/// given or stdin isn't a terminal. The stash question still needs an
/// answer (staying non-interactive must not silently destroy state), so
/// this implementation defaults to the safe choice, `Cancel`.
pub struct NonInteractive;

impl Confirm for NonInteractive {
    fn confirm(&self, _message: &str) -> bool {
        true
    }

    fn stash_or_cancel(&self, _message: &str) -> StashDecision {
        StashDecision::Cancel
    }
}

/// A scripted answer, for tests exercising the confirmation-gated paths
/// without a terminal.
#[cfg(any(test, feature = "test-util"))]
pub struct Scripted {
    pub confirm: bool,
    pub stash: StashDecision,
}

#[cfg(any(test, feature = "test-util"))]
impl Confirm for Scripted {
    fn confirm(&self, _message: &str) -> bool {
        self.confirm
    }

    fn stash_or_cancel(&self, _message: &str) -> StashDecision {
        self.stash
    }
}
