//! Store access from async code.
//!
//! Every redb write commits with an fsync, so store calls made from the turn
//! engine and its background tasks go through the blocking pool, the same
//! way route handlers use [`crate::routes::blocking`].

use ante_core::store::Store;

/// Run `f` against a clone of `store` on the blocking pool.
pub(crate) async fn with_store<T, F>(store: &Store, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Store) -> ante_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    let result = tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| anyhow::anyhow!("task join error: {e}"))?;
    Ok(result?)
}
