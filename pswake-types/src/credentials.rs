//! Wake credentials

use serde::{Deserialize, Serialize};

/// Credentials presented to a device when waking it
///
/// Serialized with the same kebab-case keys the device uses on the wire,
/// so a stored credentials file can be fed straight into a WAKEUP
/// datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Credentials {
    pub client_type: String,
    pub auth_type: String,
    pub user_credential: String,
}

impl Credentials {
    pub const CLIENT_TYPE_KEY: &'static str = "client-type";
    pub const AUTH_TYPE_KEY: &'static str = "auth-type";
    pub const USER_CREDENTIAL_KEY: &'static str = "user-credential";

    pub fn new(
        client_type: impl Into<String>,
        auth_type: impl Into<String>,
        user_credential: impl Into<String>,
    ) -> Self {
        Self {
            client_type: client_type.into(),
            auth_type: auth_type.into(),
            user_credential: user_credential.into(),
        }
    }

    /// Key/value rows in wire order
    pub fn fields(&self) -> [(&'static str, &str); 3] {
        [
            (Self::CLIENT_TYPE_KEY, self.client_type.as_str()),
            (Self::AUTH_TYPE_KEY, self.auth_type.as_str()),
            (Self::USER_CREDENTIAL_KEY, self.user_credential.as_str()),
        ]
    }
}
