//! Keyword triage of transcribed utterances.
//!
//! Classifies raw text into one of three intents before any model call:
//! short imperative cooking commands ("next step"), navigation requests
//! ("go to recipes"), and everything else, which is treated as a question
//! for the model. Matching is substring-based over lowercased text with
//! word-count gates, so transcription noise around a known phrase still
//! classifies.
//!
//! | Utterance | Intent |
//! |-----------|--------|
//! | "next step" | `CookingCommand(Next)` |
//! | "what is the next step" | `Question` |
//! | "go to recipes" | `Navigation("/recipes")` |
//! | "add three tomatoes" | `Question` (model + functions) |

/// A classified utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Navigate the client UI to a route.
    Navigation {
        /// Route path, e.g. `/recipes`.
        route: &'static str,
    },
    /// An imperative command while cooking. Handled entirely client-side;
    /// never reaches the model or the broker.
    CookingCommand(CookingCommand),
    /// Anything else: answered by the model, possibly via remote functions.
    Question,
}

/// Recognized cooking commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookingCommand {
    /// Advance to the next recipe step.
    Next,
    /// Return to the previous step.
    Previous,
    /// Read the current step again.
    Repeat,
    /// Pause guided cooking.
    Pause,
    /// Resume guided cooking.
    Resume,
    /// Start a timer.
    Timer,
}

impl CookingCommand {
    /// Stable wire identifier for this command.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Repeat => "repeat",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Timer => "timer",
        }
    }
}

/// Cooking-command phrases grouped by command. First match wins, so
/// "continue" (listed under both) always resolves to [`CookingCommand::Next`].
const COOKING_COMMANDS: &[(CookingCommand, &[&str])] = &[
    (
        CookingCommand::Next,
        &["next step", "next", "continue", "move on", "advance"],
    ),
    (
        CookingCommand::Previous,
        &["previous step", "previous", "go back", "step back", "last step"],
    ),
    (
        CookingCommand::Repeat,
        &["repeat", "say that again", "once more", "read that again"],
    ),
    (CookingCommand::Pause, &["pause", "hold on", "wait"]),
    (CookingCommand::Resume, &["resume", "continue", "keep going"]),
    (
        CookingCommand::Timer,
        &["timer", "remind me in", "alert me in", "countdown"],
    ),
];

/// Question tokens that demote a long command-like utterance to a question
/// ("what comes after the next step" is not a command).
const COMMAND_QUESTION_TOKENS: &[&str] = &["what", "which", "how"];

/// Action verbs that keep a long utterance containing a command phrase
/// classified as a command ("please go on and read the next step").
const COMMAND_ACTION_VERBS: &[&str] = &["go", "advance", "read", "tell"];

/// Section names mapped to client routes.
const NAVIGATION_SECTIONS: &[(&str, &str)] = &[
    ("home", "/"),
    ("cooking", "/cook"),
    ("cook", "/cook"),
    ("inventory", "/inventory"),
    ("ingredients", "/inventory"),
    ("recipes", "/recipes"),
    ("planner", "/plan"),
    ("plan", "/plan"),
    ("learning", "/learn"),
    ("learn", "/learn"),
    ("settings", "/settings"),
    ("preferences", "/settings"),
];

/// Verbs and phrasings that signal an explicit navigation request.
const NAVIGATION_VERBS: &[&str] = &[
    "go to",
    "open",
    "show me",
    "show",
    "take me",
    "navigate",
    "bring up",
    "switch to",
    "return to",
    "go back to",
    "i want to see",
    "page",
    "screen",
    "section",
];

/// Tokens that indicate the utterance is a question or request for the model.
const QUESTION_INDICATORS: &[&str] = &[
    "what",
    "how much",
    "how many",
    "how",
    "where",
    "why",
    "do i have",
    "is there",
    "are there",
    "can i",
    "i need",
    "missing",
    "search",
    "find",
    "give me",
    "tell me",
    "which",
    "would",
];

/// Classify an utterance. Pure and deterministic; unmatched input always
/// falls through to [`Intent::Question`].
#[must_use]
pub fn classify(text: &str) -> Intent {
    let lower = text.to_lowercase();
    let lower = lower.trim();
    let word_count = lower.split_whitespace().count();

    // Cooking commands take priority. A short utterance containing a command
    // phrase is a command; a longer one is only a command when it carries an
    // action verb and no question token.
    for (command, patterns) in COOKING_COMMANDS {
        for pattern in *patterns {
            if !lower.contains(pattern) {
                continue;
            }
            if word_count <= 3 {
                return Intent::CookingCommand(*command);
            }
            if COMMAND_QUESTION_TOKENS.iter().any(|q| lower.contains(q)) {
                return Intent::Question;
            }
            if COMMAND_ACTION_VERBS.iter().any(|v| lower.contains(v)) {
                return Intent::CookingCommand(*command);
            }
        }
    }

    let has_nav_verb = NAVIGATION_VERBS.iter().any(|v| lower.contains(v));

    // A clear question is never navigation, unless an explicit navigation
    // verb overrides it ("show me the inventory").
    if QUESTION_INDICATORS.iter().any(|q| lower.contains(q)) && !has_nav_verb {
        return Intent::Question;
    }

    for (section, route) in NAVIGATION_SECTIONS {
        if lower.contains(section) {
            if has_nav_verb {
                return Intent::Navigation { route };
            }
            // Short utterances naming a section are assumed to be navigation
            // even without a verb ("recipes", "the inventory").
            if word_count <= 4 {
                return Intent::Navigation { route };
            }
        }
    }

    Intent::Question
}
