//! Route correlation ids and task-local propagation.
//!
//! A route id is a UUID v4 string prefixed with `"rt-"`, minted once per
//! [`crate::router::ProviderRouter::route`] call. It is returned to the
//! caller in the result metadata, and every provider call made while the
//! route runs forwards it as the `x-trace-id` header.
//!
//! # Example
//!
//! ```rust,ignore
//! use provider_router::trace;
//!
//! let id = trace::generate();
//! trace::with_trace_id(id.clone(), async {
//!     assert_eq!(trace::current(), Some(id));
//! }).await;
//! ```

use uuid::Uuid;

tokio::task_local! {
    /// Task-local storage for the current route id.
    pub static TRACE_ID: String;
}

/// Generate a new route id: `"rt-<uuid-v4>"`.
#[must_use]
pub fn generate() -> String {
    format!("rt-{}", Uuid::new_v4())
}

/// Return the route id set for the current task, or `None` if none is set.
#[must_use]
pub fn current() -> Option<String> {
    TRACE_ID.try_with(Clone::clone).ok()
}

/// Run `future` with `trace_id` installed as the task-local route id.
pub async fn with_trace_id<F, T>(trace_id: String, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    TRACE_ID.scope(trace_id, future).await
}
