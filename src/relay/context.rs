/*!
 * Callback Contexts
 *
 * Where completion callbacks run:
 * - `InlineContext`: on the worker thread that finished the operation
 * - `EventLoop`: one dedicated, named thread consuming a FIFO queue
 * - `tokio::runtime::Handle`: spawned as a task on a tokio runtime
 */

use flume::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, warn};

use crate::core::errors::{StoreError, StoreResult};

/// Closure scheduled onto a callback context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that runs closures later
pub trait CallbackContext: Send + Sync + 'static {
    /// Arrange for `task` to run exactly once on this context
    fn schedule(&self, task: Task);

    /// Short label for logs
    fn name(&self) -> &str {
        "custom"
    }
}

/// Runs each task immediately on the scheduling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl CallbackContext for InlineContext {
    fn schedule(&self, task: Task) {
        task();
    }

    fn name(&self) -> &str {
        "inline"
    }
}

/// Callbacks run as tasks on the runtime; they should not block
impl CallbackContext for tokio::runtime::Handle {
    fn schedule(&self, task: Task) {
        self.spawn(async move { task() });
    }

    fn name(&self) -> &str {
        "tokio"
    }
}

enum Message {
    Run(Task),
    Stop,
}

/// Cloneable handle for scheduling onto an [`EventLoop`]
#[derive(Clone)]
pub struct LoopHandle {
    name: String,
    sender: Sender<Message>,
    thread_id: ThreadId,
}

impl LoopHandle {
    /// True when called from the loop's own thread
    pub fn is_loop_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl CallbackContext for LoopHandle {
    fn schedule(&self, task: Task) {
        if self.sender.send(Message::Run(task)).is_err() {
            warn!(event_loop = %self.name, "event loop stopped; callback dropped");
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Dedicated callback thread, the equivalent of an application's main loop
///
/// Tasks run one at a time in the order they were scheduled. A panicking
/// task is logged and the loop keeps going.
pub struct EventLoop {
    handle: LoopHandle,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Start a loop on a new thread called `name`
    pub fn spawn(name: impl Into<String>) -> StoreResult<Self> {
        let name = name.into();
        let (sender, receiver) = flume::unbounded();

        let loop_name = name.clone();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(&loop_name, receiver))
            .map_err(|source| StoreError::WorkerSpawn {
                pool: name.clone(),
                source,
            })?;

        debug!(event_loop = %name, "event loop started");
        Ok(Self {
            handle: LoopHandle {
                name,
                sender,
                thread_id: thread.thread().id(),
            },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Run everything already scheduled, then stop the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.sender.send(Message::Stop);
        if let Some(thread) = self.thread.take() {
            if self.handle.is_loop_thread() {
                return;
            }
            if thread.join().is_err() {
                error!(event_loop = %self.handle.name, "event loop thread panicked");
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(name: &str, receiver: Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(task) => {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!(event_loop = name, "callback panicked");
                }
            }
            Message::Stop => break,
        }
    }
    debug!(event_loop = name, "event loop stopped");
}
