//! API key pool with rotation-on-exhaustion
//!
//! Owns the ordered set of Stability API keys and the shared cursor pointing
//! at the last key known to have worked. `dispatch` runs one generation
//! attempt per key starting at the cursor, absorbing billing failures by
//! rotating and surfacing everything else immediately.
//!
//! Key lifecycle:
//! 1. Keys load once at startup from configuration; the list never changes.
//! 2. A dispatch snapshots the cursor and tries keys in cyclic order.
//! 3. Billing failure → next key. Any other failure → stop, report.
//! 4. Success → cursor commits to the winning key's index.
//!
//! The cursor is a heuristic, not a correctness-critical value: concurrent
//! dispatches may overwrite each other's commits, and the loser merely starts
//! its next rotation one key off.

pub mod dispatch;
pub mod error;
pub mod key;
pub mod pool;

pub use dispatch::{DispatchResult, RejectReason, dispatch};
pub use error::{Error, Result};
pub use key::ApiKey;
pub use pool::KeyPool;
