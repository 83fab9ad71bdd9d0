use std::sync::Arc;

use hl_domain::config::Config;

use crate::credentials::CredentialVerifier;
use crate::runtime::Runtime;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Sessions, stored data and outbound commands.
    pub runtime: Arc<Runtime>,
    /// Resolves bearer tokens and cookies to users.
    pub credentials: Arc<dyn CredentialVerifier>,
}
