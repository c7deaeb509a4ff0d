/*
[INPUT]:  Decoded PushMessage values from the receive loop, callback registrations
[OUTPUT]: Invocation of the one consumer registered for each topic key
[POS]:    WebSocket layer - thread-safe routing table
[UPDATE]: When changing callback signature or routing rules
*/

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::types::TopicKey;
use crate::ws::topics::PushMessage;

/// Consumer callback; runs on the receive loop task.
pub type Callback = Arc<dyn Fn(&PushMessage) + Send + Sync>;

/// Routing table from topic key to a single consumer.
#[derive(Default)]
pub struct Dispatcher {
    callbacks: RwLock<HashMap<TopicKey, Callback>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `topic`, replacing any previous consumer.
    /// Returns true when a consumer was replaced.
    pub fn register<F>(&self, topic: impl Into<TopicKey>, callback: F) -> bool
    where
        F: Fn(&PushMessage) + Send + Sync + 'static,
    {
        let topic = topic.into().canonical();
        let previous = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.clone(), Arc::new(callback));
        debug!(%topic, replaced = previous.is_some(), "callback registered");
        previous.is_some()
    }

    /// Remove the consumer for `topic`. Returns true if one was registered.
    pub fn unregister(&self, topic: impl Into<TopicKey>) -> bool {
        let topic = topic.into().canonical();
        let removed = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&topic);
        debug!(%topic, removed = removed.is_some(), "callback unregistered");
        removed.is_some()
    }

    /// Invoke the consumer for `message.topic` on the calling task.
    ///
    /// The lock is released before the callback runs, so callbacks may
    /// register or unregister. A panicking callback is logged and swallowed.
    /// Returns true when a consumer ran to completion.
    pub fn dispatch(&self, message: &PushMessage) -> bool {
        let callback = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.topic)
            .cloned();

        let Some(callback) = callback else {
            debug!(topic = %message.topic, "no callback registered; message dropped");
            return false;
        };

        match catch_unwind(AssertUnwindSafe(|| callback(message))) {
            Ok(()) => true,
            Err(panic) => {
                warn!(
                    topic = %message.topic,
                    panic = %panic_message(panic.as_ref()),
                    "callback panicked; message dropped"
                );
                false
            }
        }
    }

    pub fn clear(&self) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn registered_topics(&self) -> Vec<TopicKey> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("topics", &self.registered_topics())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
