use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::protocol::AppConfig;
use crate::routes::{RouteMatchOptions, RouteSet};
use crate::transport::FrameHandle;

/// One registered micro-app and what the host knows about its frame.
pub(crate) struct RegisteredApp {
    pub config: AppConfig,
    pub internal_routes: RouteSet,
    pub parent_routes: RouteSet,
    frame: Option<Weak<dyn FrameHandle>>,
    /// Set once the init payload has been delivered.
    pub initialized: bool,
}

impl RegisteredApp {
    fn new(config: AppConfig, options: RouteMatchOptions) -> Self {
        Self {
            internal_routes: RouteSet::compile(config.permitted_internal_routes.as_slice(), options),
            parent_routes: RouteSet::compile(config.permitted_parent_routes.as_slice(), options),
            config,
            frame: None,
            initialized: false,
        }
    }

    /// The frame, if one is attached and still alive.
    pub fn frame(&self) -> Option<Arc<dyn FrameHandle>> {
        self.frame.as_ref().and_then(Weak::upgrade)
    }
}

/// Registered apps keyed by id.
#[derive(Default)]
pub(crate) struct AppRegistry {
    apps: HashMap<String, RegisteredApp>,
}

impl AppRegistry {
    /// Insert or fully replace `config`. An attached frame survives the
    /// replacement; the init handshake does not.
    pub fn register(&mut self, config: AppConfig, options: RouteMatchOptions) -> Option<AppConfig> {
        let mut entry = RegisteredApp::new(config, options);
        let previous = self.apps.remove(&entry.config.id);
        if let Some(previous) = &previous {
            entry.frame = previous.frame.clone();
        }
        self.apps.insert(entry.config.id.clone(), entry);
        previous.map(|previous| previous.config)
    }

    pub fn unregister(&mut self, app_id: &str) -> Option<AppConfig> {
        self.apps.remove(app_id).map(|entry| entry.config)
    }

    pub fn get(&self, app_id: &str) -> Option<&RegisteredApp> {
        self.apps.get(app_id)
    }

    pub fn get_mut(&mut self, app_id: &str) -> Option<&mut RegisteredApp> {
        self.apps.get_mut(app_id)
    }

    pub fn contains(&self, app_id: &str) -> bool {
        self.apps.contains_key(app_id)
    }

    pub fn attach(&mut self, app_id: &str, frame: &Arc<dyn FrameHandle>) -> bool {
        match self.apps.get_mut(app_id) {
            Some(entry) => {
                entry.frame = Some(Arc::downgrade(frame));
                true
            }
            None => false,
        }
    }

    pub fn detach(&mut self, app_id: &str) -> bool {
        match self.apps.get_mut(app_id) {
            Some(entry) => {
                entry.initialized = false;
                entry.frame.take().is_some()
            }
            None => false,
        }
    }

    /// Ids in lexical order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.apps.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every live frame, paired with its app id, in id order.
    pub fn frames(&self) -> Vec<(String, Arc<dyn FrameHandle>)> {
        self.ids()
            .into_iter()
            .filter_map(|id| {
                let frame = self.apps.get(&id)?.frame()?;
                Some((id, frame))
            })
            .collect()
    }
}
