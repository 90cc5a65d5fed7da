//! Per-conversation state and slot filling for composite actions.
//!
//! Adding an item to the inventory needs four slots: the item (resolved by a
//! catalog search on the remote executor), a quantity, a unit, and a storage
//! location. Users rarely say all of it in one breath — "add three tomatoes"
//! / "where?" / "in the pantry" — so the session accumulates cues across
//! turns and reports when the composite action is ready.

use crate::continuity::ContinuityController;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Unit recorded when the user does not name one.
pub const DEFAULT_UNIT: &str = "pieces";

/// Canonical storage locations known to the inventory database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLocation {
    Refrigerator,
    Freezer,
    Pantry,
}

impl StorageLocation {
    /// Display name, exactly as stored in the inventory database.
    #[must_use]
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::Refrigerator => "Refrigerator",
            Self::Freezer => "Freezer",
            Self::Pantry => "Pantry",
        }
    }
}

/// Spoken synonyms mapped to canonical locations. First match wins. Each
/// canonical name is its own synonym, so feeding a canonical name back
/// through [`extract_location`] is idempotent.
const LOCATION_SYNONYMS: &[(&str, StorageLocation)] = &[
    ("refrigerator", StorageLocation::Refrigerator),
    ("fridge", StorageLocation::Refrigerator),
    ("icebox", StorageLocation::Refrigerator),
    ("freezer", StorageLocation::Freezer),
    ("deep freeze", StorageLocation::Freezer),
    ("pantry", StorageLocation::Pantry),
    ("cupboard", StorageLocation::Pantry),
    ("larder", StorageLocation::Pantry),
];

/// Spelled-out quantities recognized in utterances.
const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Extract a storage location cue from an utterance, if present.
#[must_use]
pub fn extract_location(text: &str) -> Option<StorageLocation> {
    let lower = text.to_lowercase();
    LOCATION_SYNONYMS
        .iter()
        .find(|(synonym, _)| lower.contains(synonym))
        .map(|(_, location)| *location)
}

/// Extract a quantity from an utterance: spelled-out small numbers first
/// (matched on word boundaries, so "one" does not fire inside "onions"),
/// then the first digit run. Defaults to 1.
#[must_use]
pub fn extract_quantity(text: &str) -> u32 {
    let lower = text.to_lowercase();
    for token in lower.split(|c: char| !c.is_ascii_alphanumeric()) {
        if let Some((_, n)) = NUMBER_WORDS.iter().find(|(word, _)| *word == token) {
            return *n;
        }
    }

    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().unwrap_or(1)
}

/// An item resolved by a catalog search, awaiting the rest of its slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    /// Database identifier (never invented; always from a search result).
    pub id: String,
    /// Display name, used in the spoken confirmation.
    pub name: String,
}

/// Fully resolved argument set for a composite inventory add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeAdd {
    pub ingredient_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit: String,
    pub location: StorageLocation,
}

/// Mutable state for one active conversation.
#[derive(Debug)]
pub struct SessionState {
    /// Item awaiting completion of a composite add.
    pub pending_item: Option<PendingItem>,
    /// Quantity for the pending add. A default of 1 is never written back,
    /// so a later ambiguous utterance cannot clobber an earlier "three".
    pub pending_quantity: u32,
    /// Unit for the pending add.
    pub pending_unit: String,
    /// Location for the pending add.
    pub pending_location: Option<StorageLocation>,
    /// Client-supplied UI context (current page, recipe step, ...),
    /// shallow-merged by context updates.
    pub context: HashMap<String, Value>,
    /// Continuity mode state machine.
    pub continuity: ContinuityController,
}

impl SessionState {
    /// Create a fresh session with the given continuity inactivity window.
    #[must_use]
    pub fn new(inactivity_window: Duration) -> Self {
        Self {
            pending_item: None,
            pending_quantity: 1,
            pending_unit: DEFAULT_UNIT.to_owned(),
            pending_location: None,
            context: HashMap::new(),
            continuity: ContinuityController::new(inactivity_window),
        }
    }

    /// Fold location and quantity cues from an utterance into the pending
    /// slots. A detected location always overwrites; a quantity only
    /// overwrites when it is above the default.
    pub fn absorb(&mut self, text: &str) {
        if let Some(location) = extract_location(text) {
            tracing::debug!("location cue: {}", location.canonical_name());
            self.pending_location = Some(location);
        }
        let quantity = extract_quantity(text);
        if quantity > 1 {
            tracing::debug!("quantity cue: {quantity}");
            self.pending_quantity = quantity;
        }
    }

    /// Record the item resolved by a catalog search.
    pub fn set_pending_item(&mut self, item: PendingItem) {
        self.pending_item = Some(item);
    }

    /// When both the item and the location are known, build the composite
    /// add arguments and clear the pending slots — atomically, and before
    /// any asynchronous call is issued, so a concurrent duplicate utterance
    /// cannot re-trigger the same add. Returns `None` (state untouched)
    /// while slots are missing.
    pub fn take_completed(&mut self) -> Option<CompositeAdd> {
        let (item, location) = match (&self.pending_item, self.pending_location) {
            (Some(item), Some(location)) => (item.clone(), location),
            _ => return None,
        };

        let composite = CompositeAdd {
            ingredient_id: item.id,
            name: item.name,
            quantity: self.pending_quantity,
            unit: std::mem::replace(&mut self.pending_unit, DEFAULT_UNIT.to_owned()),
            location,
        };
        self.pending_item = None;
        self.pending_location = None;
        self.pending_quantity = 1;
        Some(composite)
    }

    /// Shallow-merge a client context update.
    pub fn update_context(&mut self, update: HashMap<String, Value>) {
        self.context.extend(update);
    }
}
