//! Command orchestration.
//!
//! Single entry point for an utterance: triage it, and either broadcast a
//! navigation directive, hand back a cooking command, or run the
//! model-and-functions path — slot extraction, model call, directive
//! dispatch through the broker, and a second model call to phrase function
//! results. Every failure is captured here and turned into a structured
//! outcome; nothing terminates the session.

use crate::actions::KitchenAction;
use crate::broker::FunctionBroker;
use crate::continuity::ContinuityChange;
use crate::directive::{ActionDirective, parse_directive};
use crate::error::{AssistError, Result};
use crate::history::ConversationHistory;
use crate::intent::{CookingCommand, Intent, classify};
use crate::model::{ChatMessage, ModelClient};
use crate::protocol::{FunctionReply, ServerEvent};
use crate::prompt;
use crate::session::{PendingItem, SessionState};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Final outcome of one utterance.
#[derive(Debug)]
pub enum Outcome {
    /// Navigate the client UI.
    Navigation { route: String },
    /// Execute a cooking command client-side.
    CookingCommand(CookingCommand),
    /// Speak this answer.
    Answer { text: String },
    /// The turn failed with a classified error.
    Error(AssistError),
}

/// Orchestrates one conversation session.
pub struct Orchestrator {
    session: SessionState,
    history: ConversationHistory,
    model: Arc<dyn ModelClient>,
    broker: Arc<FunctionBroker>,
}

impl Orchestrator {
    /// Create an orchestrator for a fresh session.
    #[must_use]
    pub fn new(
        session: SessionState,
        history_window: usize,
        model: Arc<dyn ModelClient>,
        broker: Arc<FunctionBroker>,
    ) -> Self {
        Self {
            session,
            history: ConversationHistory::new(history_window),
            model,
            broker,
        }
    }

    /// Process one utterance to completion.
    pub async fn handle(&mut self, text: &str) -> Outcome {
        info!("utterance: '{text}'");
        self.session.continuity.note_activity(Instant::now());

        match classify(text) {
            Intent::Navigation { route } => {
                info!("navigation -> {route}");
                self.broker.broadcast(&ServerEvent::Navigation {
                    route: route.to_owned(),
                });
                self.session.continuity.on_navigation_dispatched();
                Outcome::Navigation {
                    route: route.to_owned(),
                }
            }
            Intent::CookingCommand(command) => {
                // Handled entirely client-side; neither the model nor the
                // broker is consulted.
                info!("cooking command -> {}", command.as_str());
                Outcome::CookingCommand(command)
            }
            Intent::Question => self.answer_question(text).await,
        }
    }

    /// Expire continuity mode on inactivity. Returns `true` when this call
    /// deactivated it (a `conversation_inactive` event is broadcast).
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if self.session.continuity.check_timeout(now) {
            self.broker.broadcast(&ServerEvent::ConversationInactive);
            true
        } else {
            false
        }
    }

    /// Whether continuity mode is currently active.
    #[must_use]
    pub fn conversation_active(&self) -> bool {
        self.session.continuity.is_active()
    }

    /// Shallow-merge a client context update into the session.
    pub fn update_context(&mut self, context: HashMap<String, Value>) {
        self.session.update_context(context);
    }

    /// The question path: slots, model, directive, broker.
    async fn answer_question(&mut self, text: &str) -> Outcome {
        self.session.absorb(text);
        self.history.push_user(text);
        self.broker.broadcast(&ServerEvent::Thinking {
            message: "Thinking...".to_owned(),
        });

        let reply = match self.call_model_with_history().await {
            Ok(reply) => reply,
            Err(e) => return self.fail(e),
        };

        match parse_directive(&reply) {
            None => self.finish_answer(reply),
            Some(directive) => {
                info!("directive: {}", directive.action);
                self.run_directive(directive).await
            }
        }
    }

    async fn call_model_with_history(&self) -> Result<String> {
        let mut messages = vec![ChatMessage::system(prompt::build_system_prompt(
            &self.session,
        ))];
        messages.extend(self.history.entries().cloned());
        self.model.complete(&messages).await
    }

    /// Dispatch a decoded directive.
    async fn run_directive(&mut self, directive: ActionDirective) -> Outcome {
        // Ingredient searches seed the pending item and may complete a
        // composite add on the spot.
        if directive.action == "searchIngredients" {
            return self.search_and_maybe_add(&directive).await;
        }

        // The user just supplied the missing location for a pending item:
        // complete the add before considering whatever the model asked for.
        if self.session.pending_item.is_some() && self.session.pending_location.is_some() {
            return self.complete_pending_add().await;
        }

        let action = match KitchenAction::from_directive(&directive) {
            Ok(action) => action,
            Err(e) => return self.fail(e),
        };
        self.dispatch_and_phrase(action).await
    }

    /// Run `searchIngredients`, remember the first hit, and either finish
    /// the composite add (location already known) or ask for the location.
    async fn search_and_maybe_add(&mut self, directive: &ActionDirective) -> Outcome {
        let action = match KitchenAction::from_directive(directive) {
            Ok(action) => action,
            Err(e) => return self.fail(e),
        };
        let query = match &action {
            KitchenAction::SearchIngredients { query, .. } => query.clone(),
            _ => String::new(),
        };

        let reply = match self.invoke(&action).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(e),
        };
        if !reply.success {
            let message = reply
                .error
                .unwrap_or_else(|| "ingredient search failed".to_owned());
            return self.fail(AssistError::Function(message));
        }

        let first = reply
            .data
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|items| items.first());
        let Some(first) = first else {
            return self.fail(AssistError::Function(format!(
                "couldn't find '{query}' in the catalog"
            )));
        };

        let (Some(id), Some(name)) = (
            first.get("id").and_then(Value::as_str),
            first.get("name").and_then(Value::as_str),
        ) else {
            return self.fail(AssistError::Function(
                "search result is missing id or name".to_owned(),
            ));
        };

        info!("pending item: {name} (id {id})");
        self.session.set_pending_item(PendingItem {
            id: id.to_owned(),
            name: name.to_owned(),
        });

        if self.session.pending_location.is_some() {
            self.complete_pending_add().await
        } else {
            // Ends with a question, so continuity re-activates and the next
            // utterance can answer without the activation phrase.
            self.finish_answer("Where?".to_owned())
        }
    }

    /// Execute the composite add from the completed slot set. The slots are
    /// cleared when the argument set is built — before the call goes out —
    /// so a concurrent duplicate utterance cannot re-trigger the same add.
    async fn complete_pending_add(&mut self) -> Outcome {
        let Some(composite) = self.session.take_completed() else {
            return self.fail(AssistError::Function(
                "no pending item to add".to_owned(),
            ));
        };
        let quantity = composite.quantity;
        let name = composite.name.clone();
        let location = composite.location;

        let action = KitchenAction::from(composite);
        let reply = match self.invoke(&action).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(e),
        };
        if !reply.success {
            let message = reply.error.unwrap_or_else(|| "unknown error".to_owned());
            return self.fail(AssistError::Function(format!("failed to add: {message}")));
        }

        let confirmation = format!(
            "Done, {} {} in the {}",
            quantity,
            name,
            location.canonical_name().to_lowercase()
        );
        self.finish_answer(confirmation)
    }

    /// Dispatch a validated action, then have the model phrase the result.
    async fn dispatch_and_phrase(&mut self, action: KitchenAction) -> Outcome {
        let function_name = action.function_name();
        let reply = match self.invoke(&action).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(e),
        };
        if !reply.success {
            let message = reply.error.unwrap_or_else(|| "unknown error".to_owned());
            return self.fail(AssistError::Function(message));
        }

        let summary =
            prompt::summarize_result(function_name, &reply.data.unwrap_or(Value::Null));
        let messages = vec![
            ChatMessage::system(prompt::build_result_prompt(&summary)),
            ChatMessage::user(self.history.last_user().unwrap_or_default()),
        ];
        match self.model.complete(&messages).await {
            Ok(text) => self.finish_answer(text),
            Err(e) => self.fail(e),
        }
    }

    async fn invoke(&self, action: &KitchenAction) -> Result<FunctionReply> {
        let value = self
            .broker
            .invoke(action.function_name(), action.args())
            .await?;
        Ok(FunctionReply::from_value(value))
    }

    /// Record and broadcast the final answer, then update continuity from
    /// its text.
    fn finish_answer(&mut self, text: String) -> Outcome {
        self.history.push_assistant(&text);
        self.broker.broadcast(&ServerEvent::LlmResponse {
            response: text.clone(),
        });
        match self
            .session
            .continuity
            .on_assistant_reply(&text, Instant::now())
        {
            ContinuityChange::Activated => {
                self.broker.broadcast(&ServerEvent::ConversationActive);
            }
            ContinuityChange::Deactivated => {
                self.broker.broadcast(&ServerEvent::ConversationInactive);
            }
            ContinuityChange::Unchanged => {}
        }
        Outcome::Answer { text }
    }

    /// Broadcast a terminal error for the turn and end continuity. Pending
    /// slots are left alone so the user can retry without repeating earlier
    /// turns.
    fn fail(&mut self, error: AssistError) -> Outcome {
        warn!("turn failed: {error}");
        self.broker.broadcast(&ServerEvent::Error {
            error_type: error.error_type().to_owned(),
            error_message: error.to_string(),
        });
        self.session.continuity.on_error_dispatched();
        Outcome::Error(error)
    }
}

impl Outcome {
    /// Wire intent string for this outcome.
    #[must_use]
    pub fn intent(&self) -> &'static str {
        match self {
            Self::Navigation { .. } => "navigation",
            Self::CookingCommand(_) => "cooking_command",
            Self::Answer { .. } | Self::Error(_) => "question",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::AssistConfig;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Model stub replaying scripted replies.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted model call")
        }
    }

    /// Executor stub answering function requests from a fixed table.
    fn spawn_executor(
        broker: &Arc<FunctionBroker>,
        responses: Vec<(&'static str, Value)>,
    ) -> Arc<Mutex<Vec<(String, Value)>>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        broker.attach(tx);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_task = Arc::clone(&seen);
        let broker = Arc::clone(broker);
        tokio::spawn(async move {
            let mut responses: VecDeque<(&str, Value)> = responses.into();
            while let Some(event) = rx.recv().await {
                if let ServerEvent::FunctionRequest {
                    request_id,
                    function_name,
                    args,
                } = event
                {
                    seen_in_task
                        .lock()
                        .unwrap()
                        .push((function_name.clone(), args));
                    let (expected, result) =
                        responses.pop_front().expect("unscripted function call");
                    assert_eq!(function_name, expected);
                    broker.resolve(&request_id, result);
                }
            }
        });
        seen
    }

    fn orchestrator(model: Arc<dyn ModelClient>, broker: Arc<FunctionBroker>) -> Orchestrator {
        let config = AssistConfig::default();
        Orchestrator::new(
            SessionState::new(config.conversation.inactivity_window()),
            config.model.history_window,
            model,
            broker,
        )
    }

    fn answer_text(outcome: Outcome) -> String {
        match outcome {
            Outcome::Answer { text } => text,
            other => panic!("expected answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn navigation_skips_model_and_broker() {
        let model = ScriptedModel::new(vec![]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_millis(100)));
        let mut orch = orchestrator(model.clone(), broker);

        let outcome = orch.handle("go to recipes").await;
        match outcome {
            Outcome::Navigation { route } => assert_eq!(route, "/recipes"),
            other => panic!("expected navigation, got {other:?}"),
        }
        assert!(model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn navigation_ends_continuity() {
        let model = ScriptedModel::new(vec![Ok("Which recipe do you mean?".to_owned())]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_millis(100)));
        let mut orch = orchestrator(model, broker);

        orch.handle("something about dinner plans maybe").await;
        assert!(orch.conversation_active());

        orch.handle("go to recipes").await;
        assert!(!orch.conversation_active());
    }

    #[tokio::test]
    async fn cooking_command_is_returned_directly() {
        let model = ScriptedModel::new(vec![]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_millis(100)));
        let mut orch = orchestrator(model.clone(), broker);

        let outcome = orch.handle("next step").await;
        assert!(matches!(
            outcome,
            Outcome::CookingCommand(CookingCommand::Next)
        ));
        assert!(model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn plain_reply_is_the_answer() {
        let model = ScriptedModel::new(vec![Ok("You could make a soup.".to_owned())]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_millis(100)));
        let mut orch = orchestrator(model, broker);

        let outcome = orch.handle("suggest something for dinner tonight please").await;
        assert_eq!(answer_text(outcome), "You could make a soup.");
        assert!(!orch.conversation_active());
    }

    #[tokio::test]
    async fn questioning_reply_activates_continuity() {
        let model = ScriptedModel::new(vec![Ok("How many servings do you need?".to_owned())]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_millis(100)));
        let mut orch = orchestrator(model, broker);

        orch.handle("plan a dinner for my family tomorrow").await;
        assert!(orch.conversation_active());
    }

    #[tokio::test]
    async fn search_without_location_asks_where() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"action":"searchIngredients","params":{"query":"tomato"},"needs_info":null,"user_message":"Searching..."}"#
                .to_owned(),
        )]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        spawn_executor(
            &broker,
            vec![(
                "searchIngredients",
                json!({"success": true, "data": [{"id": "ing_1", "name": "tomato"}]}),
            )],
        );
        let mut orch = orchestrator(model, broker);

        let outcome = orch.handle("add three tomatoes").await;
        assert_eq!(answer_text(outcome), "Where?");
        assert!(orch.conversation_active());
        assert_eq!(
            orch.session.pending_item,
            Some(PendingItem {
                id: "ing_1".to_owned(),
                name: "tomato".to_owned(),
            })
        );
        assert_eq!(orch.session.pending_quantity, 3);
    }

    #[tokio::test]
    async fn search_with_known_location_adds_immediately() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"action":"searchIngredients","params":{"query":"tomato"},"needs_info":null,"user_message":"Searching..."}"#
                .to_owned(),
        )]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        let seen = spawn_executor(
            &broker,
            vec![
                (
                    "searchIngredients",
                    json!({"success": true, "data": [{"id": "ing_1", "name": "tomato"}]}),
                ),
                ("addToInventory", json!({"success": true})),
            ],
        );
        let mut orch = orchestrator(model, broker);

        let outcome = orch.handle("add two tomatoes to the fridge").await;
        assert_eq!(answer_text(outcome), "Done, 2 tomato in the refrigerator");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].0, "addToInventory");
        assert_eq!(
            seen[1].1,
            json!({
                "ingredientId": "ing_1",
                "quantity": 2,
                "unit": "pieces",
                "location": "Refrigerator",
            })
        );
        assert!(orch.session.pending_item.is_none());
        assert!(orch.session.pending_location.is_none());
    }

    #[tokio::test]
    async fn location_answer_completes_pending_add() {
        let model = ScriptedModel::new(vec![
            Ok(
                r#"{"action":"searchIngredients","params":{"query":"tomato"},"needs_info":null,"user_message":"Searching..."}"#
                    .to_owned(),
            ),
            // Whatever the model asks for on the follow-up turn, the pending
            // pair wins and the add executes instead.
            Ok(r#"{"action":"getInventory","params":{}}"#.to_owned()),
        ]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        let seen = spawn_executor(
            &broker,
            vec![
                (
                    "searchIngredients",
                    json!({"success": true, "data": [{"id": "ing_1", "name": "tomato"}]}),
                ),
                ("addToInventory", json!({"success": true})),
            ],
        );
        let mut orch = orchestrator(model, broker);

        let outcome = orch.handle("add three tomatoes").await;
        assert_eq!(answer_text(outcome), "Where?");

        let outcome = orch.handle("in the pantry").await;
        assert_eq!(answer_text(outcome), "Done, 3 tomato in the pantry");
        assert!(!orch.conversation_active());

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[1].1,
            json!({
                "ingredientId": "ing_1",
                "quantity": 3,
                "unit": "pieces",
                "location": "Pantry",
            })
        );
        assert!(orch.session.pending_item.is_none());
        assert!(orch.session.pending_location.is_none());
        assert_eq!(orch.session.pending_quantity, 1);
    }

    #[tokio::test]
    async fn empty_search_results_report_function_error() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"action":"searchIngredients","params":{"query":"unobtanium"}}"#.to_owned(),
        )]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        spawn_executor(
            &broker,
            vec![("searchIngredients", json!({"success": true, "data": []}))],
        );
        let mut orch = orchestrator(model, broker);

        let outcome = orch.handle("add some unobtanium").await;
        match outcome {
            Outcome::Error(e) => {
                assert_eq!(e.error_type(), "function_error");
                assert!(e.to_string().contains("unobtanium"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generic_action_gets_phrased_by_second_model_call() {
        let model = ScriptedModel::new(vec![
            Ok(r#"{"action":"getInventory","params":{}}"#.to_owned()),
            Ok("You have 3 tomatoes in the pantry.".to_owned()),
        ]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        spawn_executor(
            &broker,
            vec![(
                "getInventory",
                json!({
                    "success": true,
                    "data": {"items": [
                        {"name": "tomato", "quantity": 3, "unit": "pieces", "location": "Pantry"}
                    ]},
                }),
            )],
        );
        let mut orch = orchestrator(model.clone(), broker);

        let outcome = orch.handle("do i have any tomatoes left").await;
        assert_eq!(answer_text(outcome), "You have 3 tomatoes in the pantry.");

        // Second call carries the formatted result and the original question.
        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let second = &calls[1];
        assert!(second[0].content.contains("- 3 pieces of tomato in Pantry"));
        assert_eq!(second[1].content, "do i have any tomatoes left");
    }

    #[tokio::test]
    async fn no_executor_fails_with_kind_and_keeps_slots() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"action":"searchIngredients","params":{"query":"tomato"}}"#.to_owned(),
        )]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        let mut orch = orchestrator(model, broker);

        let outcome = orch.handle("add three tomatoes to the pantry").await;
        match outcome {
            Outcome::Error(e) => assert_eq!(e.error_type(), "no_executor"),
            other => panic!("expected error, got {other:?}"),
        }
        // Slots extracted from the utterance survive the failure.
        assert_eq!(orch.session.pending_quantity, 3);
        assert!(orch.session.pending_location.is_some());
    }

    #[tokio::test]
    async fn model_failure_deactivates_continuity() {
        let model = ScriptedModel::new(vec![
            Ok("Where should I put it?".to_owned()),
            Err(AssistError::ModelTimeout),
        ]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        let mut orch = orchestrator(model, broker);

        orch.handle("help me store my groceries somewhere good").await;
        assert!(orch.conversation_active());

        let outcome = orch.handle("the big bag on the counter").await;
        match outcome {
            Outcome::Error(e) => assert_eq!(e.error_type(), "model_timeout"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(!orch.conversation_active());
    }

    #[tokio::test]
    async fn unknown_directive_action_is_a_decode_error() {
        let model = ScriptedModel::new(vec![Ok(
            r#"{"action":"launchRocket","params":{}}"#.to_owned(),
        )]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        spawn_executor(&broker, vec![]);
        let mut orch = orchestrator(model, broker);

        let outcome = orch.handle("can you launch the rocket for me").await;
        match outcome {
            Outcome::Error(e) => assert_eq!(e.error_type(), "decode_error"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_check_broadcasts_expiry() {
        let model = ScriptedModel::new(vec![Ok("Where?".to_owned())]);
        let broker = Arc::new(FunctionBroker::new(Duration::from_secs(1)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        broker.attach(tx);
        let mut orch = orchestrator(model, Arc::clone(&broker));

        orch.handle("help me put this somewhere sensible please").await;
        assert!(orch.conversation_active());

        assert!(orch.check_timeout(Instant::now() + Duration::from_secs(20)));
        assert!(!orch.conversation_active());

        // Drain events; the last one must be conversation_inactive.
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(ServerEvent::ConversationInactive)));
    }
}
