//! Fractional sibling ordering.
//!
//! Siblings under one parent are positioned by an `f64` key. Inserting
//! between two neighbours takes their midpoint so nothing else has to be
//! renumbered. Repeated midpoint inserts between the same two fixed
//! neighbours halve the gap every time; once it drops below `f64`
//! resolution two inserted keys can become equal and display order falls
//! back to the id tie-break. That degradation is accepted, not corrected.

use std::cmp::Ordering;

/// Order key for a new sibling placed after `prev` and before `next`.
pub fn allocate(prev: Option<f64>, next: Option<f64>) -> f64 {
    match (prev, next) {
        // Halve before adding so neighbours near `f64::MAX` cannot overflow.
        (Some(prev), Some(next)) => prev / 2.0 + next / 2.0,
        (Some(prev), None) => prev + 1.0,
        (None, Some(next)) => next - 1.0,
        (None, None) => 0.0,
    }
}

/// Display order of two siblings: ascending key, ties by ascending id.
pub fn cmp_siblings(a_order: f64, a_id: i64, b_order: f64, b_id: i64) -> Ordering {
    a_order
        .partial_cmp(&b_order)
        .unwrap_or(Ordering::Equal)
        .then(a_id.cmp(&b_id))
}

#[cfg(test)]
#[path = "tests/ordering_tests.rs"]
mod tests;
