//! Row-parallel map used by the pixel-local stages.
//!
//! With the `parallel` feature the closure runs on the rayon pool;
//! without it the same closure runs serially. Results are always returned
//! in row order, so output never depends on scheduling.

use std::ops::Range;

/// Apply `f` to every row index in `rows` and collect the results in order.
#[cfg(feature = "parallel")]
pub fn map_rows<T, F>(rows: Range<u32>, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(u32) -> T + Sync + Send,
{
    use rayon::prelude::*;

    rows.into_par_iter().map(f).collect()
}

/// Apply `f` to every row index in `rows` and collect the results in order.
#[cfg(not(feature = "parallel"))]
pub fn map_rows<T, F>(rows: Range<u32>, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(u32) -> T + Sync + Send,
{
    rows.map(f).collect()
}

/// Apply `f` to every item of `items` and collect the results in order.
#[cfg(feature = "parallel")]
pub fn map_items<I, T, F>(items: &[I], f: F) -> Vec<T>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> T + Sync + Send,
{
    use rayon::prelude::*;

    items.par_iter().map(f).collect()
}

/// Apply `f` to every item of `items` and collect the results in order.
#[cfg(not(feature = "parallel"))]
pub fn map_items<I, T, F>(items: &[I], f: F) -> Vec<T>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> T + Sync + Send,
{
    items.iter().map(f).collect()
}
