//! Per-request session context applied to the acquired connection.
//!
//! Row-level security policies typically read the caller's identity from custom settings:
//!
//! ```sql
//! CREATE POLICY org_isolation ON incidents
//!     USING (organization_id = current_setting('app.organization_id')::uuid);
//! ```
//!
//! A [`SessionContext`] carries those settings; a [`SessionApplier`] installs them on the
//! connection before the request's first statement runs.

use crate::client::GenericClient;
use crate::error::{GatewayError, GatewayResult};
use crate::ident::quote_identifier;
use crate::value::Scalar;
use std::collections::BTreeMap;

/// Custom settings for one request, e.g. `app.user_id` and `app.organization_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    settings: BTreeMap<String, String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a setting.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check every setting name: a dotted custom name (`prefix.name`) of identifier characters.
    pub fn validate(&self) -> GatewayResult<()> {
        for name in self.settings.keys() {
            let valid = quote_identifier(name)
                .map(|q| q.segments().len() >= 2 && q.segments().iter().all(|s| !s.is_empty()))
                .unwrap_or(false);
            if !valid {
                return Err(GatewayError::session(format!(
                    "invalid setting name '{name}', expected a dotted custom name like 'app.user_id'"
                )));
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            settings: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Installs a [`SessionContext`] on a connection.
///
/// An error aborts the request before any of its statements run.
pub trait SessionApplier: Send + Sync {
    fn apply<C: GenericClient>(
        &self,
        client: &C,
        session: &SessionContext,
    ) -> impl std::future::Future<Output = GatewayResult<()>> + Send;
}

/// Applies each setting with `SELECT set_config($1, $2, false)`.
///
/// Settings are session-scoped, so the pool must reset connections on recycle
/// (see [`default_manager_config`](crate::pool::default_manager_config)).
#[derive(Debug, Clone, Copy, Default)]
pub struct SetConfigApplier;

pub const SET_CONFIG_SQL: &str = "SELECT set_config($1, $2, false)";

impl SessionApplier for SetConfigApplier {
    async fn apply<C: GenericClient>(
        &self,
        client: &C,
        session: &SessionContext,
    ) -> GatewayResult<()> {
        session.validate()?;
        for (name, value) in session.iter() {
            client
                .query(SET_CONFIG_SQL, &[Scalar::from(name), Scalar::from(value)])
                .await
                .map_err(|e| GatewayError::session(format!("setting '{name}': {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_names_are_accepted() {
        let session = SessionContext::new()
            .with("app.user_id", "42")
            .with("app.organization_id", "7");
        assert!(session.validate().is_ok());
        assert_eq!(session.get("app.user_id"), Some("42"));
    }

    #[test]
    fn bare_or_malformed_names_are_rejected() {
        for name in ["role", "app.", ".x", "app.user id", "app.x'; reset all; --"] {
            let session = SessionContext::new().with(name, "1");
            assert!(
                matches!(session.validate(), Err(GatewayError::Session(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn settings_iterate_in_name_order() {
        let session: SessionContext = [("b.y", "2"), ("a.x", "1")].into_iter().collect();
        assert_eq!(
            session.iter().collect::<Vec<_>>(),
            [("a.x", "1"), ("b.y", "2")]
        );
    }
}
