//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use kazi_storage::Datastore;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::gateway::ResourceGateway;
use crate::resource::Resource;
use crate::resources::SocialGraph;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Datastore every gateway runs against.
    pub store: Arc<dyn Datastore>,
    pub api_config: Arc<ApiConfig>,
    pub auth_config: Arc<AuthConfig>,
    pub social: SocialGraph,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Datastore>,
        api_config: Arc<ApiConfig>,
        auth_config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            social: SocialGraph::new(store.clone()),
            store,
            api_config,
            auth_config,
            start_time: Instant::now(),
        }
    }

    /// Typed gateway for one resource over the shared store.
    pub fn gateway<R: Resource>(&self) -> ResourceGateway<R> {
        ResourceGateway::new(self.store.clone())
    }
}

crate::impl_from_ref!(Arc<dyn Datastore>, store);
crate::impl_from_ref!(Arc<ApiConfig>, api_config);
crate::impl_from_ref!(Arc<AuthConfig>, auth_config);
crate::impl_from_ref!(SocialGraph, social);
crate::impl_from_ref!(Instant, start_time);
