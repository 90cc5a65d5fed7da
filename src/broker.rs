//! Remote function broker.
//!
//! The authoritative kitchen data (inventory, recipes) lives with the remote
//! executors — browser clients holding the database — not with this server.
//! The broker is the server's only path to that data: it turns an action
//! name plus arguments into a `function_request` broadcast, then correlates
//! the matching `function_response` back to the waiting caller by a
//! generated request id, under a fixed deadline.
//!
//! Resolution is made exclusive at the pending-call registry: whoever
//! removes the registry entry — a matching reply or the timeout path — owns
//! the outcome. Late and duplicate replies find no entry and are discarded.

use crate::error::{AssistError, Result};
use crate::protocol::ServerEvent;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Broker owning the executor set and the pending-call registry.
pub struct FunctionBroker {
    executors: Mutex<HashMap<u64, mpsc::UnboundedSender<ServerEvent>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    next_executor_id: AtomicU64,
    call_timeout: Duration,
}

impl FunctionBroker {
    /// Create a broker with the given per-call deadline.
    #[must_use]
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            executors: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_executor_id: AtomicU64::new(1),
            call_timeout,
        }
    }

    /// Attach an executor's outbound channel. Returns its id for [`detach`].
    ///
    /// [`detach`]: FunctionBroker::detach
    pub fn attach(&self, sender: mpsc::UnboundedSender<ServerEvent>) -> u64 {
        let id = self.next_executor_id.fetch_add(1, Ordering::Relaxed);
        let mut executors = self.lock_executors();
        executors.insert(id, sender);
        info!("executor {id} attached ({} total)", executors.len());
        id
    }

    /// Detach an executor. Calls already in flight simply lose one of their
    /// potential responders.
    pub fn detach(&self, id: u64) {
        let mut executors = self.lock_executors();
        executors.remove(&id);
        info!("executor {id} detached ({} left)", executors.len());
    }

    /// Number of currently attached executors.
    #[must_use]
    pub fn executor_count(&self) -> usize {
        self.lock_executors().len()
    }

    /// Send an event to every attached executor, dropping any whose channel
    /// has closed.
    pub fn broadcast(&self, event: &ServerEvent) {
        let mut executors = self.lock_executors();
        executors.retain(|id, sender| {
            if sender.send(event.clone()).is_ok() {
                true
            } else {
                warn!("dropping executor {id}: channel closed");
                false
            }
        });
    }

    /// Resolve a pending call with the executor's reply. Returns `false`
    /// when no call with this id is waiting — a duplicate or late reply —
    /// in which case the reply is discarded.
    pub fn resolve(&self, request_id: &str, result: Value) -> bool {
        let sender = {
            let mut pending = self.lock_pending();
            pending.remove(request_id)
        };
        match sender {
            Some(sender) => {
                debug!("resolving function call {request_id}");
                sender.send(result).is_ok()
            }
            None => {
                debug!("discarding reply for unknown call {request_id}");
                false
            }
        }
    }

    /// Invoke a remote function and wait for the correlated reply.
    ///
    /// Fails fast with [`AssistError::NoExecutor`] when nothing is attached;
    /// otherwise broadcasts the request to all executors — first matching
    /// reply wins — and suspends until the reply or the deadline, whichever
    /// comes first. Callers cannot bypass the deadline.
    ///
    /// # Errors
    ///
    /// [`AssistError::NoExecutor`] with no executor attached,
    /// [`AssistError::FunctionTimeout`] when the deadline elapses first.
    pub async fn invoke(&self, function_name: &str, args: Value) -> Result<Value> {
        if self.executor_count() == 0 {
            return Err(AssistError::NoExecutor);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.lock_pending().insert(request_id.clone(), reply_tx);

        debug!("invoking {function_name} (request {request_id})");
        self.broadcast(&ServerEvent::FunctionRequest {
            request_id: request_id.clone(),
            function_name: function_name.to_owned(),
            args,
        });

        match tokio::time::timeout(self.call_timeout, &mut reply_rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(AssistError::Channel(format!(
                "reply channel for {function_name} closed"
            ))),
            Err(_) => {
                // Deadline elapsed. Removing the registry entry claims the
                // timeout; if a reply claimed it first, its value is already
                // in the channel and the reply wins.
                let raced = self.lock_pending().remove(&request_id).is_none();
                if raced && let Ok(result) = reply_rx.try_recv() {
                    return Ok(result);
                }
                warn!("function call {function_name} timed out after {:?}", self.call_timeout);
                Err(AssistError::FunctionTimeout {
                    action: function_name.to_owned(),
                })
            }
        }
    }

    fn lock_executors(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<ServerEvent>>> {
        self.executors.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Value>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
