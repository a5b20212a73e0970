use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::StoreError;

/// Process-wide store handle, connected on first use and reused afterwards.
///
/// The outcome of the first connection attempt is memoized, failure included:
/// a store that could not be initialized stays unavailable instead of being
/// retried on every request.
pub struct StoreHandle<S: ?Sized> {
    label: &'static str,
    cell: OnceCell<Option<Arc<S>>>,
}

impl<S: ?Sized> StoreHandle<S> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            cell: OnceCell::new(),
        }
    }

    pub fn ready(label: &'static str, store: Arc<S>) -> Self {
        Self {
            label,
            cell: OnceCell::with_value(Some(store)),
        }
    }

    pub fn unavailable(label: &'static str) -> Self {
        Self {
            label,
            cell: OnceCell::with_value(None),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn get_or_connect<F>(&self, connect: F) -> Option<Arc<S>>
    where
        F: FnOnce() -> Result<Arc<S>, StoreError>,
    {
        self.cell
            .get_or_init(|| match connect() {
                Ok(store) => {
                    info!(store = self.label, "store handle initialized");
                    Some(store)
                }
                Err(err) => {
                    warn!(store = self.label, error = %err, "store initialization failed");
                    None
                }
            })
            .clone()
    }
}
