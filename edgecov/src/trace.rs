//! Turns a per-thread sequence of basic-block visits into directed-edge
//! identities and feeds them to an [`EdgeTable`].
//!
//! Every instrumented site carries a location id (`cur_loc`) assigned at
//! instrumentation time. At run time the edge identity is
//! `cur_loc ^ prev_loc`, after which the thread's previous-location register
//! advances to `cur_loc >> 1`. The shift keeps the edge A→B distinct from
//! B→A, which plain XOR would conflate. This is the classic AFL scheme and
//! downstream consumers rely on it bit for bit.

use core::cell::Cell;

use crate::table::{EdgeTable, SharedEdgeTable};

thread_local!(static PREV_LOC: Cell<u32> = const { Cell::new(0) });

/// Computes the edge identity for a visit of the site `cur_loc` on the calling
/// thread and advances its previous-location register.
///
/// The register is exclusively owned by the calling thread; sequences of
/// visits on different threads never interleave in the identity computation.
#[inline]
#[must_use]
pub fn next_edge_id(cur_loc: u32) -> u32 {
    PREV_LOC.with(|prev_loc| {
        let id = prev_loc.get() ^ cur_loc;
        prev_loc.set(cur_loc >> 1);
        id
    })
}

/// Resets the calling thread's previous-location register to 0, as if the
/// thread had not visited any site yet. Call between fuzzed executions to make
/// edge sequences reproducible.
pub fn reset_prev_loc() {
    PREV_LOC.with(|prev_loc| prev_loc.set(0));
}

/// Records a visit of the instrumented site `cur_loc` into `table`.
///
/// This is the single-thread hot path: one identity computation, one
/// create-or-increment, no locking.
#[inline]
pub fn trace_edge(table: &mut EdgeTable, cur_loc: u32) {
    table.check_then_update(next_edge_id(cur_loc));
}

/// Records a visit of the instrumented site `cur_loc` into a shared `table`.
///
/// Identity computation still uses the calling thread's own register; only the
/// table access is synchronized.
#[inline]
pub fn trace_edge_shared(table: &SharedEdgeTable, cur_loc: u32) {
    table.check_then_update(next_edge_id(cur_loc));
}

/// Trace callback spliced in by the instrumentation pass, called once per
/// covered edge with the site's assigned location id.
///
/// # Safety
/// Dereferences `table`, which must point to a live [`EdgeTable`] not accessed
/// concurrently from another thread. Should usually not be called directly.
#[no_mangle]
pub unsafe extern "C" fn __edgecov_trace(table: *mut EdgeTable, cur_loc: u32) {
    trace_edge(&mut *table, cur_loc);
}

#[cfg(test)]
mod tests {
    use crate::{
        table::EdgeTable,
        trace::{next_edge_id, reset_prev_loc, trace_edge, __edgecov_trace},
    };

    #[test]
    fn test_first_edge_is_cur_loc() {
        reset_prev_loc();
        // prev = 0, cur = 5: identity 5, register becomes 5 >> 1 == 2
        assert_eq!(next_edge_id(5), 5);
        assert_eq!(next_edge_id(0), 2);
    }

    #[test]
    fn test_site_sequence() {
        reset_prev_loc();
        let mut table = EdgeTable::new();
        for cur_loc in [5, 3, 9] {
            trace_edge(&mut table, cur_loc);
        }
        // 5^0, 3^2, 9^1
        assert_eq!(table.len(), 3);
        for edge in [5, 1, 8] {
            assert_eq!(table.lookup(edge).unwrap().count(), 1);
        }
    }

    #[test]
    fn test_direction_matters() {
        reset_prev_loc();
        let a_then_b = {
            next_edge_id(12);
            next_edge_id(7)
        };
        reset_prev_loc();
        let b_then_a = {
            next_edge_id(7);
            next_edge_id(12)
        };
        assert_ne!(a_then_b, b_then_a);
    }

    #[test]
    fn test_reset_prev_loc() {
        reset_prev_loc();
        let first = next_edge_id(41);
        let _ = next_edge_id(1000);
        reset_prev_loc();
        assert_eq!(next_edge_id(41), first);
    }

    #[test]
    fn test_extern_hook() {
        reset_prev_loc();
        let mut table = EdgeTable::new();
        let table_ptr: *mut EdgeTable = &mut table;
        unsafe {
            __edgecov_trace(table_ptr, 5);
            __edgecov_trace(table_ptr, 3);
        }
        assert_eq!(table.lookup(5).unwrap().count(), 1);
        assert_eq!(table.lookup(1).unwrap().count(), 1);
    }
}
