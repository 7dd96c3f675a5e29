/*!
 * Completion Relay Module
 * Exactly-once result delivery onto a designated callback context
 */

pub mod completion;
pub mod context;

pub use completion::{Completion, CompletionRelay};
pub use context::{CallbackContext, EventLoop, InlineContext, LoopHandle, Task};
