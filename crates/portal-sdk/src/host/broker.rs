use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::config::PortalConfig;
use crate::error::PortalResult;
use crate::event::{
    AppErrorReportedPayload, AppPayload, AppResetPayload, BrokerEvent, MessageForwardedPayload,
    ModalClosedPayload, NavigationDeniedPayload, NavigationScope, RouteChangedEventPayload,
};
use crate::listener::{ListenerId, ListenerSet, MessageDirection};
use crate::protocol::{
    parse_message, AppConfig, CloseModalPayload, EventType, NavigationErrorKind,
    NavigationErrorPayload, PortalEvent, PortalMessage, RouteChangedPayload, ValidationError,
    PORTAL_ID,
};
use crate::routes::RouteMatchOptions;
use crate::transport::FrameHandle;

use super::modal::{ModalList, ModalRequest};
use super::registry::AppRegistry;

/// Callback into the surrounding router, invoked for permitted parent
/// navigations.
pub type NavigateFn = Arc<dyn Fn(&str) + Send + Sync>;

const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOptions {
    pub route_options: RouteMatchOptions,
    pub bus_capacity: usize,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            route_options: RouteMatchOptions::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

/// The portal side of the channel.
///
/// Cheap to clone; clones share one registry. Inbound messages are handled
/// one at a time through [`HostBroker::receive`].
#[derive(Clone)]
pub struct HostBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    listeners: ListenerSet,
    bus: Bus,
    cancel: CancellationToken,
    navigate: NavigateFn,
    options: HostOptions,
}

#[derive(Default)]
struct BrokerState {
    registry: AppRegistry,
    modals: ModalList,
}

/// Work decided under the state lock and carried out after releasing it.
enum Effect {
    Send {
        app_id: String,
        frame: Arc<dyn FrameHandle>,
        message: PortalMessage,
    },
    Reload {
        app_id: String,
        frame: Arc<dyn FrameHandle>,
        url: String,
    },
    Navigate(String),
    Publish(BrokerEvent),
}

impl HostBroker {
    pub fn new(navigate: NavigateFn) -> Self {
        Self::with_options(navigate, HostOptions::default())
    }

    pub fn with_options(navigate: NavigateFn, options: HostOptions) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::default()),
                listeners: ListenerSet::new(),
                bus: Bus::new(options.bus_capacity.max(1)),
                cancel: CancellationToken::new(),
                navigate,
                options,
            }),
        }
    }

    /// Build a broker with every app of a validated config registered.
    pub fn from_config(config: &PortalConfig, navigate: NavigateFn) -> PortalResult<Self> {
        config.validate()?;
        let broker = Self::with_options(
            navigate,
            HostOptions {
                route_options: config.routing,
                ..HostOptions::default()
            },
        );
        for app in &config.apps {
            broker.register(app.clone());
        }
        Ok(broker)
    }

    pub fn register(&self, config: AppConfig) -> Option<AppConfig> {
        let app_id = config.id.clone();
        let previous = self
            .inner
            .state
            .lock()
            .registry
            .register(config, self.inner.options.route_options);
        if previous.is_some() {
            tracing::info!("micro-app '{app_id}' re-registered");
        } else {
            tracing::info!("micro-app '{app_id}' registered");
        }
        previous
    }

    /// Remove an app, forget its frame and close its modals.
    pub fn unregister(&self, app_id: &str) -> Option<AppConfig> {
        let (removed, effects) = {
            let mut state = self.inner.state.lock();
            let removed = state.registry.unregister(app_id);
            let effects: Vec<Effect> = state
                .modals
                .close_owned(app_id, None)
                .into_iter()
                .map(|modal| Effect::Publish(modal_closed(&modal)))
                .collect();
            (removed, effects)
        };
        if removed.is_some() {
            tracing::info!("micro-app '{app_id}' unregistered");
        }
        self.run(effects);
        removed
    }

    pub fn attach_transport(&self, app_id: &str, frame: &Arc<dyn FrameHandle>) -> bool {
        let attached = self.inner.state.lock().registry.attach(app_id, frame);
        if !attached {
            tracing::warn!("cannot attach transport: micro-app '{app_id}' is not registered");
        }
        attached
    }

    pub fn detach_transport(&self, app_id: &str) -> bool {
        self.inner.state.lock().registry.detach(app_id)
    }

    /// Transport callback for everything arriving from child frames.
    pub fn receive(&self, raw: &Value) {
        if self.inner.cancel.is_cancelled() {
            tracing::debug!("broker destroyed; ignoring inbound message");
            return;
        }

        let message = match parse_message(raw) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!("dropping inbound message [{}]: {error}", error.code());
                return;
            }
        };

        let effects = {
            let mut state = self.inner.state.lock();
            if let Err(error) = admit(&state.registry, &message) {
                tracing::debug!(
                    "dropping {} from '{}' [{}]: {error}",
                    message.event_type(),
                    message.source_id,
                    error.code()
                );
                return;
            }
            dispatch(&mut state, &message)
        };

        self.inner
            .listeners
            .emit(&message, MessageDirection::Inbound, &self.inner.cancel);
        self.run(effects);
    }

    /// Send `event` to every registered app with a live frame.
    pub fn broadcast(&self, event: PortalEvent) {
        let effects = {
            let state = self.inner.state.lock();
            broadcast_effects(&state.registry, &event)
        };
        self.run(effects);
    }

    /// Send `event` to one app. Returns whether it reached the transport.
    pub fn send_to(&self, app_id: &str, event: PortalEvent) -> bool {
        if self.inner.cancel.is_cancelled() {
            tracing::warn!("broker destroyed; not sending {} to '{app_id}'", event.event_type());
            return false;
        }
        let frame = self
            .inner
            .state
            .lock()
            .registry
            .get(app_id)
            .and_then(|entry| entry.frame());
        let Some(frame) = frame else {
            tracing::warn!("cannot send {} to '{app_id}': no live transport", event.event_type());
            return false;
        };
        let message = PortalMessage::new(event, PORTAL_ID, Some(app_id.to_string()));
        self.deliver(app_id, frame.as_ref(), &message)
    }

    /// Close a modal from the host side and tell the owning app.
    pub fn close_modal(&self, modal_id: &str) -> bool {
        let effects = {
            let mut state = self.inner.state.lock();
            let Some(modal) = state.modals.close_by_id(modal_id) else {
                tracing::debug!("no open modal '{modal_id}'");
                return false;
            };
            let mut effects = Vec::new();
            if let Some(frame) = state.registry.get(&modal.app_id).and_then(|e| e.frame()) {
                effects.push(Effect::Send {
                    app_id: modal.app_id.clone(),
                    frame,
                    message: PortalMessage::new(
                        PortalEvent::CloseModal(CloseModalPayload {
                            modal_id: Some(modal.id.clone()),
                            message: None,
                        }),
                        PORTAL_ID,
                        Some(modal.app_id.clone()),
                    ),
                });
            }
            effects.push(Effect::Publish(modal_closed(&modal)));
            effects
        };
        self.run(effects);
        true
    }

    pub fn get_app(&self, app_id: &str) -> Option<AppConfig> {
        self.inner
            .state
            .lock()
            .registry
            .get(app_id)
            .map(|entry| entry.config.clone())
    }

    pub fn app_ids(&self) -> Vec<String> {
        self.inner.state.lock().registry.ids()
    }

    pub fn active_modals(&self) -> Vec<ModalRequest> {
        self.inner.state.lock().modals.list()
    }

    pub fn is_attached(&self, app_id: &str) -> bool {
        self.inner
            .state
            .lock()
            .registry
            .get(app_id)
            .is_some_and(|entry| entry.frame().is_some())
    }

    /// Whether the init payload has been delivered to `app_id`.
    pub fn is_app_initialized(&self, app_id: &str) -> bool {
        self.inner
            .state
            .lock()
            .registry
            .get(app_id)
            .is_some_and(|entry| entry.initialized)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Token cancelled by [`HostBroker::destroy`]; transports can scope
    /// their pumps to it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn add_event_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PortalMessage, MessageDirection) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.inner.bus.subscribe()
    }

    pub fn destroy(&self) {
        if self.inner.cancel.is_cancelled() {
            tracing::debug!("broker already destroyed");
            return;
        }
        self.inner.cancel.cancel();
        self.inner.listeners.clear();
        tracing::info!("portal broker destroyed");
    }

    fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            if self.inner.cancel.is_cancelled() {
                break;
            }
            match effect {
                Effect::Send {
                    app_id,
                    frame,
                    message,
                } => {
                    self.deliver(&app_id, frame.as_ref(), &message);
                }
                Effect::Reload { app_id, frame, url } => match frame.reload(&url) {
                    Ok(()) => {
                        tracing::info!("micro-app '{app_id}' reset to {url}");
                        self.publish(BrokerEvent::AppReset(AppResetPayload {
                            app_id,
                            entry_url: url,
                        }));
                    }
                    Err(error) => {
                        tracing::warn!("failed to reset micro-app '{app_id}': {error}");
                    }
                },
                Effect::Navigate(path) => {
                    tracing::debug!("portal navigating to {path}");
                    (self.inner.navigate)(&path);
                }
                Effect::Publish(event) => self.publish(event),
            }
        }
    }

    fn deliver(&self, app_id: &str, frame: &dyn FrameHandle, message: &PortalMessage) -> bool {
        let value = match message.to_value() {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!("failed to encode {} for '{app_id}': {error}", message.event_type());
                return false;
            }
        };
        match frame.post(value) {
            Ok(()) => {
                self.inner
                    .listeners
                    .emit(message, MessageDirection::Outbound, &self.inner.cancel);
                true
            }
            Err(error) => {
                tracing::warn!("failed to send {} to '{app_id}': {error}", message.event_type());
                false
            }
        }
    }

    fn publish(&self, event: BrokerEvent) {
        // No subscribers is fine.
        let _ = self.inner.bus.publish(event);
    }
}

impl std::fmt::Debug for HostBroker {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HostBroker")
            .field("apps", &self.app_ids())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Source, direction and addressing checks applied before dispatch.
fn admit(registry: &AppRegistry, message: &PortalMessage) -> Result<(), ValidationError> {
    if !registry.contains(&message.source_id) {
        return Err(ValidationError::UnknownSource {
            source_id: message.source_id.clone(),
        });
    }
    let kind = message.event_type();
    if !kind.is_host_bound() {
        return Err(ValidationError::Unaddressed {
            target_id: message
                .target_id
                .clone()
                .unwrap_or_else(|| PORTAL_ID.to_string()),
        });
    }
    message.check_addressed(|target| {
        target == PORTAL_ID || (kind == EventType::SendMessage && registry.contains(target))
    })
}

fn dispatch(state: &mut BrokerState, message: &PortalMessage) -> Vec<Effect> {
    let source = message.source_id.as_str();
    let mut effects = Vec::new();

    match &message.event {
        PortalEvent::AppReady(_) => {
            let Some(entry) = state.registry.get_mut(source) else {
                return effects;
            };
            let Some(frame) = entry.frame() else {
                tracing::warn!("micro-app '{source}' is ready but has no live transport");
                return effects;
            };
            effects.push(Effect::Send {
                app_id: source.to_string(),
                frame,
                message: PortalMessage::new(
                    PortalEvent::InitApp(entry.config.clone()),
                    PORTAL_ID,
                    Some(source.to_string()),
                ),
            });
            if entry.initialized {
                tracing::debug!("micro-app '{source}' sent app:ready again; re-sending init");
            } else {
                entry.initialized = true;
                tracing::info!("micro-app '{source}' initialized");
                effects.push(Effect::Publish(BrokerEvent::AppInitialized(AppPayload {
                    app_id: source.to_string(),
                })));
            }
        }
        PortalEvent::AppError(payload) => {
            tracing::warn!(
                "micro-app '{source}' reported {}: {}",
                payload.error,
                payload.message
            );
            effects.push(Effect::Publish(BrokerEvent::AppErrorReported(
                AppErrorReportedPayload {
                    app_id: source.to_string(),
                    error: payload.error.clone(),
                    message: payload.message.clone(),
                },
            )));
        }
        PortalEvent::NavigateInternal(payload) => {
            let Some(entry) = state.registry.get(source) else {
                return effects;
            };
            let path = payload.route_path.as_str();
            if entry.internal_routes.matches(path).matched {
                effects.extend(route_changed(&state.registry, source, path, true));
                return effects;
            }

            tracing::warn!("micro-app '{source}' denied internal navigation to {path}");
            let frame = entry.frame();
            if let Some(frame) = &frame {
                effects.push(Effect::Send {
                    app_id: source.to_string(),
                    frame: frame.clone(),
                    message: PortalMessage::new(
                        PortalEvent::InternalNavigationError(NavigationErrorPayload::denied(
                            NavigationErrorKind::InternalNavigationBoundaryViolation,
                            path,
                        )),
                        PORTAL_ID,
                        Some(source.to_string()),
                    ),
                });
            }
            effects.push(Effect::Publish(BrokerEvent::NavigationDenied(
                NavigationDeniedPayload {
                    app_id: source.to_string(),
                    route_path: path.to_string(),
                    scope: NavigationScope::Internal,
                },
            )));
            match (frame, entry.config.entry_url()) {
                (Some(frame), Ok(url)) => effects.push(Effect::Reload {
                    app_id: source.to_string(),
                    frame,
                    url: url.to_string(),
                }),
                (None, _) => {
                    tracing::warn!("cannot reset micro-app '{source}': no live transport");
                }
                (_, Err(error)) => {
                    tracing::warn!("cannot reset micro-app '{source}': {error}");
                }
            }
        }
        PortalEvent::NavigateParent(payload) => {
            let Some(entry) = state.registry.get(source) else {
                return effects;
            };
            let path = payload.route_path.as_str();
            if entry.parent_routes.matches(path).matched {
                effects.push(Effect::Navigate(path.to_string()));
                effects.extend(route_changed(&state.registry, source, path, false));
                return effects;
            }

            tracing::warn!("micro-app '{source}' denied parent navigation to {path}");
            if let Some(frame) = entry.frame() {
                effects.push(Effect::Send {
                    app_id: source.to_string(),
                    frame,
                    message: PortalMessage::new(
                        PortalEvent::ParentNavigationError(NavigationErrorPayload::denied(
                            NavigationErrorKind::ParentNavigationBoundaryViolation,
                            path,
                        )),
                        PORTAL_ID,
                        Some(source.to_string()),
                    ),
                });
            }
            effects.push(Effect::Publish(BrokerEvent::NavigationDenied(
                NavigationDeniedPayload {
                    app_id: source.to_string(),
                    route_path: path.to_string(),
                    scope: NavigationScope::Parent,
                },
            )));
        }
        PortalEvent::ShowModal(payload) => match state.modals.open(source, payload.clone()) {
            Some(modal) => {
                tracing::debug!("micro-app '{source}' opened modal '{}'", modal.id);
                effects.push(Effect::Publish(BrokerEvent::ModalOpened(modal)));
            }
            None => {
                tracing::warn!(
                    "micro-app '{source}' asked for modal id {:?} already held by another app",
                    payload.modal_id
                );
            }
        },
        PortalEvent::CloseModal(payload) => {
            let closed = state
                .modals
                .close_owned(source, payload.modal_id.as_deref());
            if closed.is_empty() {
                tracing::debug!("micro-app '{source}' has no matching modal to close");
            }
            effects.extend(
                closed
                    .iter()
                    .map(|modal| Effect::Publish(modal_closed(modal))),
            );
        }
        PortalEvent::SendMessage(_) => {
            let target = match message.target_id.as_deref() {
                Some(target) if target != PORTAL_ID && target != source => target,
                _ => {
                    tracing::debug!("app:sendMessage from '{source}' has no app target");
                    return effects;
                }
            };
            let Some(frame) = state.registry.get(target).and_then(|entry| entry.frame()) else {
                tracing::debug!("app:sendMessage target '{target}' has no live transport");
                return effects;
            };
            effects.push(Effect::Send {
                app_id: target.to_string(),
                frame,
                message: message.clone(),
            });
            effects.push(Effect::Publish(BrokerEvent::MessageForwarded(
                MessageForwardedPayload {
                    source_id: source.to_string(),
                    target_id: target.to_string(),
                },
            )));
        }
        PortalEvent::InitApp(_)
        | PortalEvent::InternalNavigationError(_)
        | PortalEvent::ParentNavigationError(_)
        | PortalEvent::RouteChanged(_) => {
            // Filtered by `admit`.
        }
    }

    effects
}

fn route_changed(registry: &AppRegistry, app_id: &str, path: &str, internal: bool) -> Vec<Effect> {
    let mut effects = broadcast_effects(
        registry,
        &PortalEvent::RouteChanged(RouteChangedPayload {
            app_id: Some(app_id.to_string()),
            route_path: path.to_string(),
            internal,
        }),
    );
    effects.push(Effect::Publish(BrokerEvent::RouteChanged(
        RouteChangedEventPayload {
            app_id: app_id.to_string(),
            route_path: path.to_string(),
            internal,
        },
    )));
    effects
}

fn broadcast_effects(registry: &AppRegistry, event: &PortalEvent) -> Vec<Effect> {
    registry
        .frames()
        .into_iter()
        .map(|(app_id, frame)| Effect::Send {
            app_id,
            frame,
            message: PortalMessage::new(event.clone(), PORTAL_ID, None),
        })
        .collect()
}

fn modal_closed(modal: &ModalRequest) -> BrokerEvent {
    BrokerEvent::ModalClosed(ModalClosedPayload {
        modal_id: modal.id.clone(),
        app_id: modal.app_id.clone(),
    })
}
