//! Callback-style local inference capability.
//!
//! A bridge accepts a prompt and invokes its callback any number of times
//! with `(error, chunk, done)`. Chunks arrive in generation order; the final
//! invocation has `done == true` (or carries an error).

/// Callback handed to a bridge: `(error, chunk, done)`.
pub type BridgeCallback = Box<dyn FnMut(Option<String>, Option<String>, bool) + Send + 'static>;

/// An on-device inference surface driven by repeated callbacks.
///
/// Implementations may invoke the callback synchronously from `inference`
/// or later from another task/thread.
pub trait InferenceBridge: Send + Sync {
    fn inference(&self, prompt: String, callback: BridgeCallback);
}
