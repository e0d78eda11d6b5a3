//! Warehouse connection coordinates.

use std::collections::HashMap;
use std::fmt;

use snowdrift_core::config::ConfigProvider;
use snowdrift_core::storage::BackendConfig;

use crate::error::ConnectionError;

pub const ACCOUNT_KEY: &str = "WAREHOUSE_ACCOUNT";
pub const USER_KEY: &str = "WAREHOUSE_USER";
pub const PASSWORD_KEY: &str = "WAREHOUSE_PASSWORD";
pub const ROLE_KEY: &str = "WAREHOUSE_ROLE";
pub const COMPUTE_KEY: &str = "WAREHOUSE_COMPUTE";
pub const DATABASE_KEY: &str = "WAREHOUSE_DATABASE";

/// Where the warehouse lives and who connects to it.
///
/// `account` is the storage root of the lakehouse (`s3://…` or a local path).
/// Object-store accounts need `user` and `password`, which become the access
/// key pair; a local account needs neither.
#[derive(Clone, PartialEq, Eq)]
pub struct WarehouseCoordinates {
    pub account: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub compute: Option<String>,
    pub database: String,
}

impl WarehouseCoordinates {
    /// Collect coordinates from `provider`.
    ///
    /// Every missing required key is reported in one error. Empty values
    /// count as missing.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self, ConnectionError> {
        let get = |key: &str| provider.lookup(key).filter(|v| !v.trim().is_empty());

        let account = get(ACCOUNT_KEY);
        let user = get(USER_KEY);
        let password = get(PASSWORD_KEY);
        let database = get(DATABASE_KEY);

        let backend = match &account {
            Some(account) => Some(BackendConfig::parse_url(account).map_err(|source| {
                ConnectionError::InvalidAccount {
                    account: account.clone(),
                    source,
                }
            })?),
            None => None,
        };
        let needs_credentials = backend.as_ref().is_some_and(|b| !b.is_local());

        let mut missing = Vec::new();
        if account.is_none() {
            missing.push(ACCOUNT_KEY);
        }
        if needs_credentials && user.is_none() {
            missing.push(USER_KEY);
        }
        if needs_credentials && password.is_none() {
            missing.push(PASSWORD_KEY);
        }
        if database.is_none() {
            missing.push(DATABASE_KEY);
        }

        match (account, database) {
            (Some(account), Some(database)) if missing.is_empty() => Ok(Self {
                account,
                user,
                password,
                role: get(ROLE_KEY),
                compute: get(COMPUTE_KEY),
                database,
            }),
            _ => Err(ConnectionError::MissingCoordinates {
                keys: missing.into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Storage options for the warehouse root: `extra` plus credentials.
    pub fn storage_options(&self, extra: &HashMap<String, String>) -> HashMap<String, String> {
        let mut options = extra.clone();
        if let Ok(BackendConfig::S3(_)) = BackendConfig::parse_url(&self.account) {
            if let Some(user) = &self.user {
                options.insert("aws_access_key_id".to_string(), user.clone());
            }
            if let Some(password) = &self.password {
                options.insert("aws_secret_access_key".to_string(), password.clone());
            }
        }
        options
    }

    /// Name reported in credential errors.
    pub fn principal(&self) -> &str {
        self.user.as_deref().unwrap_or("<anonymous>")
    }
}

impl fmt::Debug for WarehouseCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseCoordinates")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .field("compute", &self.compute)
            .field("database", &self.database)
            .finish()
    }
}
