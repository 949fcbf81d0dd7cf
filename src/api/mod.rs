//! HTTP surface: admin authoring routes and the public playback route.

pub mod context;
pub mod error;
pub mod routes;

pub use context::{Admin, AdminAllowList, AdminPolicy, Identity, RequestContext};
pub use error::{ApiError, ApiResult};
pub use routes::{AppState, tour_routes};

use std::sync::Arc;

use axum::http::HeaderName;

use crate::config::TourlyConfig;
use crate::error::ConfigError;
use crate::store::TourStore;
use crate::translation::TranslationService;

impl AppState {
    /// Wire the state from configuration, using the email allow-list as the admin policy.
    pub fn from_config(
        config: &TourlyConfig,
        store: Arc<dyn TourStore>,
        translator: Option<Arc<TranslationService>>,
    ) -> Result<Self, ConfigError> {
        let identity_header = HeaderName::from_bytes(config.identity_header.as_bytes())
            .map_err(|e| ConfigError::InvalidValue {
                key: "TOURLY_IDENTITY_HEADER".into(),
                message: e.to_string(),
            })?;

        Ok(Self {
            store,
            translator,
            admin_policy: Arc::new(AdminAllowList::new(&config.admin_emails)),
            identity_header,
        })
    }
}
