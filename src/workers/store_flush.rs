use crate::store::SessionStore;

pub async fn run(store: &SessionStore) {
    match store.flush() {
        Ok(()) => tracing::debug!(backend = store.backend_name(), "store_flush: done"),
        Err(e) => tracing::error!(error = %e, "store_flush failed"),
    }
}
