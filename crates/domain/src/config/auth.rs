use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth (credential subsystem adapter)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Location of the account file maintained by the credential subsystem.
/// Hookline only reads it to resolve bearer tokens to user ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JSON file of the form `{"users":[{"id","email","token"}]}`.
    /// Relative paths resolve against the working directory.
    #[serde(default = "d_users_file")]
    pub users_file: PathBuf,

    /// Cookie consulted when no `Authorization` header is present.
    #[serde(default = "d_cookie_name")]
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users_file: d_users_file(),
            cookie_name: d_cookie_name(),
        }
    }
}

fn d_users_file() -> PathBuf {
    PathBuf::from("data/auth.json")
}
fn d_cookie_name() -> String {
    "hl_token".into()
}
