use std::ops::Range;

/// Indices newly revealed by the latest listing query.
///
/// `previous` is the item count after the last batch, `current` the fresh
/// count. Pagination ends as soon as a query reveals nothing new.
pub fn next_batch(previous: usize, current: usize) -> Option<Range<usize>> {
    if current > previous {
        Some(previous..current)
    } else {
        None
    }
}
