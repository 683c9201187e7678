//! Generation dispatch with key rotation
//!
//! One dispatch = at most one full sweep of the pool. The cursor snapshot
//! taken at entry fixes the rotation order; the pool lock is never held
//! across the upstream call, so parallel dispatches only contend on the
//! cursor's single atomic word.

use std::fmt;

use stability::{
    ErrorClassification, ExhaustionMatcher, FinishReason, GenerationRequest, ImageArtifact,
    ImageBackend,
};
use tracing::{debug, error, info, warn};

use crate::pool::KeyPool;

/// Why a dispatch was rejected without delivering an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Upstream generated the image but flagged it. The key worked (the
    /// cursor was committed) yet nothing is returned to the caller.
    ContentFiltered,
    /// A non-billing upstream failure, surfaced verbatim.
    Upstream(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ContentFiltered => write!(f, "content filter"),
            RejectReason::Upstream(message) => write!(f, "{message}"),
        }
    }
}

/// Terminal outcome of one dispatch.
#[derive(Debug)]
pub enum DispatchResult {
    Delivered(ImageArtifact),
    Rejected(RejectReason),
    AllExhausted,
}

/// Run one generation request through the pool.
///
/// Keys are tried in cyclic order starting at the cursor snapshot, each at
/// most once. Billing failures (per `matcher`) rotate to the next key; any
/// other failure stops the sweep immediately so a genuine problem such as a
/// bad prompt is not masked behind N pointless retries.
/// The cursor commits only on upstream success, including the
/// content-filtered case where the key itself is not at fault.
pub async fn dispatch(
    request: &GenerationRequest,
    pool: &KeyPool,
    backend: &dyn ImageBackend,
    matcher: &ExhaustionMatcher,
) -> DispatchResult {
    let start = pool.snapshot();
    let n = pool.len();

    for i in 0..n {
        let idx = (start + i) % n;
        debug!(attempt = i + 1, total = n, key_index = idx, "trying key");

        match backend.generate(request, pool.key_at(idx).expose()).await {
            Ok(artifact) => {
                pool.commit(idx);
                if artifact.finish_reason == FinishReason::ContentFiltered {
                    info!(key_index = idx, "upstream filtered the generated image");
                    metrics::counter!("keypool_content_filtered_total").increment(1);
                    return DispatchResult::Rejected(RejectReason::ContentFiltered);
                }
                info!(key_index = idx, seed = artifact.seed, "generation succeeded");
                return DispatchResult::Delivered(artifact);
            }
            Err(err) => match matcher.classify(&err.message) {
                ErrorClassification::Exhausted => {
                    warn!(key_index = idx, error = %err, "key exhausted, rotating to next");
                    metrics::counter!("keypool_exhausted_keys_total").increment(1);
                }
                ErrorClassification::Fatal => {
                    error!(key_index = idx, error = %err, "fatal upstream error, abandoning rotation");
                    metrics::counter!("keypool_fatal_errors_total").increment(1);
                    return DispatchResult::Rejected(RejectReason::Upstream(err.message));
                }
            },
        }
    }

    warn!(keys = n, "every key failed the billing check");
    metrics::counter!("keypool_all_exhausted_total").increment(1);
    DispatchResult::AllExhausted
}
