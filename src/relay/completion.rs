/*!
 * Completion Relay
 *
 * Delivers the outcome of an asynchronous operation onto the store's
 * callback context exactly once.
 *
 * `Completion::complete` consumes the completion, so a second delivery does
 * not type-check. If a completion is dropped without being completed (the
 * job panicked, or was dropped by a shut-down pool) it delivers
 * `StoreError::Aborted` from its destructor, so no operation goes silent.
 */

use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::context::{CallbackContext, Task};
use crate::core::errors::{StoreError, StoreResult};

type Callback<T> = Box<dyn FnOnce(StoreResult<T>) + Send + 'static>;

/// Routes completions and plain closures onto one callback context
#[derive(Clone)]
pub struct CompletionRelay {
    context: Arc<dyn CallbackContext>,
}

impl CompletionRelay {
    pub fn new(context: Arc<dyn CallbackContext>) -> Self {
        Self { context }
    }

    /// Run `task` on the callback context
    pub fn schedule(&self, task: Task) {
        self.context.schedule(task);
    }

    /// Wrap `callback` so it is delivered on the callback context exactly once
    pub fn completion<T, F>(&self, operation: impl Into<String>, callback: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(StoreResult<T>) + Send + 'static,
    {
        Completion {
            operation: operation.into(),
            callback: Some(Box::new(callback)),
            context: self.context.clone(),
        }
    }

    pub fn context_name(&self) -> &str {
        self.context.name()
    }
}

impl fmt::Debug for CompletionRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRelay")
            .field("context", &self.context.name())
            .finish()
    }
}

/// Pending delivery of one asynchronous result
#[must_use = "a dropped completion reports the operation as aborted"]
pub struct Completion<T: Send + 'static> {
    operation: String,
    callback: Option<Callback<T>>,
    context: Arc<dyn CallbackContext>,
}

impl<T: Send + 'static> Completion<T> {
    /// Schedule the callback with `result`
    pub fn complete(mut self, result: StoreResult<T>) {
        self.deliver(result);
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn deliver(&mut self, result: StoreResult<T>) {
        if let Some(callback) = self.callback.take() {
            self.context.schedule(Box::new(move || callback(result)));
        }
    }
}

impl<T: Send + 'static> Drop for Completion<T> {
    fn drop(&mut self) {
        if self.callback.is_some() {
            warn!(operation = %self.operation, "operation ended without a result; reporting abort");
            let aborted = StoreError::Aborted(self.operation.clone());
            self.deliver(Err(aborted));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::InlineContext;
    use std::sync::mpsc;

    fn inline_relay() -> CompletionRelay {
        CompletionRelay::new(Arc::new(InlineContext))
    }

    #[test]
    fn test_complete_delivers_once() {
        let relay = inline_relay();
        let (tx, rx) = mpsc::channel();
        let completion = relay.completion("write k", move |r: StoreResult<u32>| {
            tx.send(r.unwrap()).unwrap();
        });
        assert_eq!(completion.operation(), "write k");

        completion.complete(Ok(7));
        assert_eq!(rx.try_recv().unwrap(), 7);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_error_is_delivered() {
        let relay = inline_relay();
        let (tx, rx) = mpsc::channel();
        let completion = relay.completion("read k", move |r: StoreResult<()>| {
            tx.send(r.is_err()).unwrap();
        });

        completion.complete(Err(StoreError::StaleHandle("k".into())));
        assert!(rx.try_recv().unwrap());
    }

    #[test]
    fn test_drop_reports_abort() {
        let relay = inline_relay();
        let (tx, rx) = mpsc::channel();
        let completion = relay.completion("write k", move |r: StoreResult<()>| {
            tx.send(r).unwrap();
        });

        drop(completion);
        match rx.try_recv().unwrap() {
            Err(StoreError::Aborted(op)) => assert_eq!(op, "write k"),
            other => panic!("expected abort, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_during_panic_reports_abort() {
        let relay = inline_relay();
        let (tx, rx) = mpsc::channel();
        let completion = relay.completion("read k", move |r: StoreResult<String>| {
            tx.send(r.is_err()).unwrap();
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _completion = completion;
            panic!("adapter blew up");
        }));
        assert!(result.is_err());
        assert!(rx.try_recv().unwrap());
    }
}
