use futures_util::stream::{self, StreamExt};
use std::future::Future;

/// Applies `f` to every item with at most `limit` calls in flight.
///
/// Completions may arrive in any order; the returned vector is in input order.
/// A `limit` of zero is treated as one.
pub async fn parallel_map<I, T, R, F, Fut>(items: I, limit: usize, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let f = &f;
    let mut slots: Vec<Option<R>> = Vec::new();

    let mut completions = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move { (index, f(item).await) })
        .buffer_unordered(limit.max(1));

    while let Some((index, result)) = completions.next().await {
        if slots.len() <= index {
            slots.resize_with(index + 1, || None);
        }
        slots[index] = Some(result);
    }

    slots.into_iter().flatten().collect()
}
