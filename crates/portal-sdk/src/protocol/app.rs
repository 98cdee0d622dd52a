//! Registered description of one embeddable application.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{PortalError, PortalResult};

/// Configuration of a micro-app as registered with the host.
///
/// Sent verbatim to the child as the `portal:init_app` payload, so the child
/// learns exactly the permission lists the host enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Unique identifier, stable for the lifetime of the process.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional app version (X.Y.Z).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Origin the app is served from.
    pub base_url: String,
    /// Entry path, resolved against `base_url`.
    pub entry_point: String,
    /// Patterns the app may navigate to inside its own frame.
    pub permitted_internal_routes: Vec<String>,
    /// Patterns the app may ask the host to navigate to.
    pub permitted_parent_routes: Vec<String>,
    /// Opaque context handed to the child once, during the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_context: Option<Map<String, Value>>,
}

impl AppConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        base_url: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: None,
            base_url: base_url.into(),
            entry_point: entry_point.into(),
            permitted_internal_routes: Vec::new(),
            permitted_parent_routes: Vec::new(),
            bootstrap_context: None,
        }
    }

    pub fn with_internal_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_internal_routes = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parent_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_parent_routes = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bootstrap_context(mut self, context: Map<String, Value>) -> Self {
        self.bootstrap_context = Some(context);
        self
    }

    /// Absolute URL of the entry point, the target of an entry-point reset.
    pub fn entry_url(&self) -> PortalResult<Url> {
        let base = Url::parse(&self.base_url).map_err(|error| PortalError::InvalidEntryPoint {
            app_id: self.id.clone(),
            reason: format!("invalid base url '{}': {error}", self.base_url),
        })?;
        base.join(&self.entry_point)
            .map_err(|error| PortalError::InvalidEntryPoint {
                app_id: self.id.clone(),
                reason: format!("invalid entry point '{}': {error}", self.entry_point),
            })
    }
}
