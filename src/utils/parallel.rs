//! Parallel execution utilities.

use rayon::prelude::*;

/// Minimum number of queries in a batch before the batch is spread over the
/// rayon pool.
pub const MIN_PARALLEL_QUERIES: usize = 16;

/// Execute a map operation with a custom threshold.
#[inline]
pub fn maybe_parallel_map_threshold<T, U, F>(items: &[T], threshold: usize, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if items.len() >= threshold {
        items.par_iter().map(&f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

/// Run `f(row, chunk_a, chunk_b)` over matching `width`-sized chunks of two
/// output buffers, in parallel when `parallel` is set. Stops at the first
/// error.
pub fn for_each_row_chunk<A, B, E, F>(
    a: &mut [A],
    b: &mut [B],
    width: usize,
    parallel: bool,
    f: F,
) -> Result<(), E>
where
    A: Send,
    B: Send,
    E: Send,
    F: Fn(usize, &mut [A], &mut [B]) -> Result<(), E> + Sync + Send,
{
    if width == 0 {
        return Ok(());
    }
    if parallel {
        a.par_chunks_mut(width)
            .zip(b.par_chunks_mut(width))
            .enumerate()
            .try_for_each(|(row, (ca, cb))| f(row, ca, cb))
    } else {
        a.chunks_mut(width)
            .zip(b.chunks_mut(width))
            .enumerate()
            .try_for_each(|(row, (ca, cb))| f(row, ca, cb))
    }
}
