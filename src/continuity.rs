//! Continuity mode: deciding when a follow-up may skip the activation phrase.
//!
//! When the assistant ends its turn with a question ("Where should I put
//! it?"), the user's next utterance is almost certainly the answer, so the
//! transcription client may forward it without a fresh activation phrase.
//! Anything that closes the exchange — a plain answer, a navigation action,
//! an error, or silence past the inactivity window — drops back to requiring
//! the phrase.
//!
//! Two states: Idle and Active. Active iff the activity timestamp is set;
//! deactivation always clears it.

use std::time::{Duration, Instant};

/// Interrogative cues in an assistant reply, alongside the `?`/`¿` glyphs.
const INTERROGATIVE_TOKENS: &[&str] = &[
    "where",
    "how many",
    "how much",
    "which",
    "what kind",
    "what location",
];

/// Result of feeding an assistant reply to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityChange {
    /// Continuity was (re)activated: the reply asks the user something.
    Activated,
    /// Continuity was active and has now ended.
    Deactivated,
    /// Already idle, still idle.
    Unchanged,
}

/// Continuity mode state machine.
#[derive(Debug)]
pub struct ContinuityController {
    /// Last activity time. `Some` iff continuity is active.
    active_since: Option<Instant>,
    window: Duration,
}

impl ContinuityController {
    /// Create an idle controller with the given inactivity window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            active_since: None,
            window,
        }
    }

    /// Whether continuity mode is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    /// Does this reply ask the user a question?
    #[must_use]
    pub fn asks_question(text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        lower.contains('?')
            || lower.contains('¿')
            || INTERROGATIVE_TOKENS.iter().any(|t| lower.contains(t))
    }

    /// Feed the assistant's final reply text: a questioning reply activates
    /// (or refreshes) continuity, anything else deactivates it.
    pub fn on_assistant_reply(&mut self, text: &str, now: Instant) -> ContinuityChange {
        if Self::asks_question(text) {
            tracing::debug!("continuity active: assistant asked a question");
            self.active_since = Some(now);
            ContinuityChange::Activated
        } else {
            self.deactivate()
        }
    }

    /// A navigation action was dispatched; continuity ends regardless of
    /// activity recency.
    pub fn on_navigation_dispatched(&mut self) -> ContinuityChange {
        self.deactivate()
    }

    /// A terminal error was dispatched for this turn; continuity ends.
    pub fn on_error_dispatched(&mut self) -> ContinuityChange {
        self.deactivate()
    }

    /// Refresh the activity timestamp, if active. Called when a user
    /// utterance arrives during continuity mode.
    pub fn note_activity(&mut self, now: Instant) {
        if self.active_since.is_some() {
            self.active_since = Some(now);
        }
    }

    /// Expire continuity after the inactivity window. Returns `true` when
    /// this call deactivated it.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        let Some(since) = self.active_since else {
            return false;
        };
        if now.duration_since(since) > self.window {
            tracing::debug!("continuity expired after {:?} of inactivity", self.window);
            self.active_since = None;
            true
        } else {
            false
        }
    }

    fn deactivate(&mut self) -> ContinuityChange {
        if self.active_since.take().is_some() {
            tracing::debug!("continuity inactive");
            ContinuityChange::Deactivated
        } else {
            ContinuityChange::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ContinuityController {
        ContinuityController::new(Duration::from_secs(15))
    }

    #[test]
    fn question_glyph_activates() {
        let mut c = controller();
        let change = c.on_assistant_reply("Where should I put it?", Instant::now());
        assert_eq!(change, ContinuityChange::Activated);
        assert!(c.is_active());
    }

    #[test]
    fn interrogative_token_activates_without_glyph() {
        let mut c = controller();
        c.on_assistant_reply("Tell me which shelf you mean", Instant::now());
        assert!(c.is_active());
    }

    #[test]
    fn plain_answer_deactivates() {
        let mut c = controller();
        c.on_assistant_reply("Where?", Instant::now());
        assert!(c.is_active());

        let change = c.on_assistant_reply("You have 3 tomatoes in the pantry.", Instant::now());
        assert_eq!(change, ContinuityChange::Deactivated);
        assert!(!c.is_active());
    }

    #[test]
    fn plain_answer_while_idle_is_unchanged() {
        let mut c = controller();
        let change = c.on_assistant_reply("Done.", Instant::now());
        assert_eq!(change, ContinuityChange::Unchanged);
    }

    #[test]
    fn navigation_deactivates_regardless_of_recency() {
        let mut c = controller();
        c.on_assistant_reply("Where?", Instant::now());
        assert_eq!(
            c.on_navigation_dispatched(),
            ContinuityChange::Deactivated
        );
        assert!(!c.is_active());
    }

    #[test]
    fn error_deactivates() {
        let mut c = controller();
        c.on_assistant_reply("Where?", Instant::now());
        c.on_error_dispatched();
        assert!(!c.is_active());
    }

    #[test]
    fn timeout_expires_after_window() {
        let mut c = ContinuityController::new(Duration::from_secs(15));
        let start = Instant::now();
        c.on_assistant_reply("Where?", start);

        assert!(!c.check_timeout(start + Duration::from_secs(10)));
        assert!(c.is_active());

        assert!(c.check_timeout(start + Duration::from_secs(16)));
        assert!(!c.is_active());

        // Already idle: further checks report nothing.
        assert!(!c.check_timeout(start + Duration::from_secs(60)));
    }

    #[test]
    fn activity_refreshes_window() {
        let mut c = ContinuityController::new(Duration::from_secs(15));
        let start = Instant::now();
        c.on_assistant_reply("Where?", start);
        c.note_activity(start + Duration::from_secs(10));

        assert!(!c.check_timeout(start + Duration::from_secs(20)));
        assert!(c.check_timeout(start + Duration::from_secs(26)));
    }

    #[test]
    fn empty_reply_is_not_a_question() {
        assert!(!ContinuityController::asks_question(""));
        assert!(ContinuityController::asks_question("¿Dónde?"));
    }
}
