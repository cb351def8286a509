//! Helper macros for the API crate.

/// Implement `FromRef<AppState>` for one field, so handlers can extract the
/// piece of state they need directly.
///
/// # Example
/// ```ignore
/// impl_from_ref!(RequestOrchestrator, orchestrator);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for RequestOrchestrator {
///     fn from_ref(state: &AppState) -> Self {
///         state.orchestrator.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
