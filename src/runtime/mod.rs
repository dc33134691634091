//! Single-writer async runtime over the book store, with a broadcast event
//! stream and background remote sync.

/// Event payloads broadcast by the runtime.
pub mod events;
/// Handle, config, and the actor loop.
pub mod handle;
