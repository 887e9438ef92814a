//! Utility macros for reducing boilerplate

/// Macro to implement `FromRef<AppState>` for state extractors.
///
/// # Example
/// ```ignore
/// impl_from_ref!(Arc<ApiConfig>, api_config);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for Arc<ApiConfig> {
///     fn from_ref(state: &AppState) -> Self {
///         state.api_config.clone()
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

/// Macro to implement `ListFilter` for a struct of optional equality filters.
///
/// Every listed field must be an `Option<T: Serialize>` named after the
/// column it filters.
///
/// # Example
/// ```ignore
/// impl_list_filter!(LeadFilter { status, source, assigned_to });
/// ```
#[macro_export]
macro_rules! impl_list_filter {
    ($type:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::resource::ListFilter for $type {
            fn filters(&self) -> Vec<kazi_core::FilterExpr> {
                let mut filters = Vec::new();
                $(
                    $crate::resource::push_eq(&mut filters, stringify!($field), &self.$field);
                )+
                filters
            }
        }
    };
}
