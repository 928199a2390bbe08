//! Distributed-rank reporting.
//!
//! Multi-process jobs want to know which rank crashed. The launcher or MPI
//! shim provides a query function; registration consults it read-only and,
//! once it yields a rank, the value is cached for the lifetime of the
//! process and appended to diagnostics as ` on rank <R>`.
//!
//! Compiled in only with the `rank` cargo feature.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Query for the calling process's rank.
///
/// Returns `None` while the distributed runtime is not yet initialized; the
/// query is retried on later registrations until it yields a value.
pub type RankQuery = fn() -> Option<i32>;

static RANK_QUERY: AtomicUsize = AtomicUsize::new(0);

/// Installs the rank query consulted by registration calls.
///
/// Call before registering handlers, from ordinary application code.
pub fn set_rank_query(query: RankQuery) {
    RANK_QUERY.store(query as usize, Ordering::SeqCst);
}

/// Runs the installed query, if any.
pub(crate) fn query_rank() -> Option<i32> {
    let raw = RANK_QUERY.load(Ordering::SeqCst);
    if raw == 0 {
        return None;
    }
    // SAFETY: the slot only ever holds a RankQuery stored by set_rank_query.
    let query: RankQuery = unsafe { std::mem::transmute::<usize, RankQuery>(raw) };
    query()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_roundtrip() {
        assert_eq!(query_rank(), None);
        set_rank_query(|| Some(3));
        assert_eq!(query_rank(), Some(3));
    }
}
