use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};
use crate::listener::{ListenerId, ListenerSet, MessageDirection};
use crate::protocol::{
    parse_message, AppConfig, AppErrorPayload, AppReadyPayload, CloseModalPayload, EventType,
    ModalContent, ModalDisplayOptions, NavigatePayload, PortalEvent, PortalMessage,
    ShowModalPayload, PORTAL_ID,
};
use crate::routes::{RouteMatchOptions, RouteSet};
use crate::transport::Transport;

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

const INITIALIZATION_ERROR: &str = "initialization_error";

/// What the init deadline found once it held the state lock.
#[derive(Debug)]
enum Deadline {
    Expired,
    Settled(AppConfig),
    /// A newer `initialize` or a `destroy` owns the state now.
    Superseded,
}

/// Lifecycle of a [`ChildAgent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Uninitialized,
    /// `app:ready` sent, waiting for `portal:init_app`.
    AwaitingAck,
    Ready,
    /// The host did not answer before the deadline.
    Failed,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOptions {
    pub init_timeout: Duration,
    pub route_options: RouteMatchOptions,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            route_options: RouteMatchOptions::default(),
        }
    }
}

impl AgentOptions {
    pub fn from_config(config: &PortalConfig) -> Self {
        Self {
            init_timeout: config.init_timeout(),
            route_options: config.routing,
        }
    }
}

/// The micro-app side of the channel.
///
/// Cheap to clone. The embedding layer routes everything arriving from the
/// host into [`ChildAgent::handle_message`].
#[derive(Clone)]
pub struct ChildAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    transport: Arc<dyn Transport>,
    state: Mutex<AgentState>,
    listeners: ListenerSet,
    options: AgentOptions,
}

struct AgentState {
    app_id: Option<String>,
    phase: AgentPhase,
    config: Option<AppConfig>,
    internal_routes: RouteSet,
    parent_routes: RouteSet,
    open_modals: Vec<String>,
    init_tx: Option<watch::Sender<Option<AppConfig>>>,
    /// Bumped by every `initialize`, so a stale deadline cannot fail a
    /// newer attempt.
    generation: u64,
    cancel: CancellationToken,
}

impl AgentState {
    fn new() -> Self {
        Self {
            app_id: None,
            phase: AgentPhase::Uninitialized,
            config: None,
            internal_routes: RouteSet::default(),
            parent_routes: RouteSet::default(),
            open_modals: Vec::new(),
            init_tx: None,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }
}

impl ChildAgent {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, AgentOptions::default())
    }

    pub fn with_options(transport: Arc<dyn Transport>, options: AgentOptions) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                transport,
                state: Mutex::new(AgentState::new()),
                listeners: ListenerSet::new(),
                options,
            }),
        }
    }

    /// Announce `app_id` to the host and wait for its configuration.
    ///
    /// Fails with [`PortalError::InitTimeout`] when the host stays silent
    /// past the configured deadline, after reporting `initialization_error`
    /// to it, and with [`PortalError::Terminated`] when the agent is
    /// destroyed during the wait. Calling it again restarts the handshake.
    pub async fn initialize(&self, app_id: impl Into<String>) -> PortalResult<AppConfig> {
        let app_id = app_id.into();
        let (init_tx, mut init_rx) = watch::channel(None);

        let (generation, cancel) = {
            let mut state = self.inner.state.lock();
            if state.cancel.is_cancelled() {
                state.cancel = CancellationToken::new();
            }
            state.generation += 1;
            state.app_id = Some(app_id.clone());
            state.phase = AgentPhase::AwaitingAck;
            state.config = None;
            state.internal_routes = RouteSet::default();
            state.parent_routes = RouteSet::default();
            state.open_modals.clear();
            state.init_tx = Some(init_tx);
            (state.generation, state.cancel.clone())
        };

        tracing::info!("micro-app '{app_id}' announcing readiness");
        let ready = PortalMessage::new(
            PortalEvent::AppReady(AppReadyPayload {
                message: "ready".to_string(),
            }),
            app_id.clone(),
            Some(PORTAL_ID.to_string()),
        );
        self.transmit(&ready, &cancel);

        let wait = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PortalError::Terminated),
                changed = init_rx.wait_for(Option::is_some) => match changed {
                    Ok(config) => (*config).clone().ok_or(PortalError::Terminated),
                    Err(_) => Err(PortalError::Terminated),
                },
            }
        };

        let timeout = self.inner.options.init_timeout;
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => match self.expire_initialization(&app_id, generation, &cancel) {
                Deadline::Settled(config) => Ok(config),
                Deadline::Superseded if cancel.is_cancelled() => Err(PortalError::Terminated),
                Deadline::Expired | Deadline::Superseded => Err(PortalError::InitTimeout {
                    app_id,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }

    /// Transport callback for everything arriving from the host.
    pub fn handle_message(&self, raw: &Value) {
        let message = match parse_message(raw) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!("dropping inbound message [{}]: {error}", error.code());
                return;
            }
        };

        let (cancel, init) = {
            let mut state = self.inner.state.lock();
            if state.cancel.is_cancelled() {
                tracing::debug!("agent destroyed; ignoring {}", message.event_type());
                return;
            }
            let Some(app_id) = state.app_id.clone() else {
                tracing::debug!("agent not initialized; ignoring {}", message.event_type());
                return;
            };
            if let Err(error) = message.check_addressed(|target| target == app_id) {
                tracing::debug!("dropping {} [{}]: {error}", message.event_type(), error.code());
                return;
            }
            if !message.event_type().is_child_bound() {
                tracing::debug!("dropping host-bound {}", message.event_type());
                return;
            }

            let mut init = None;
            match &message.event {
                PortalEvent::InitApp(config) => {
                    if !accepts_init(&state, &app_id, &message, config) {
                        return;
                    }
                    state.internal_routes = RouteSet::compile(
                        config.permitted_internal_routes.as_slice(),
                        self.inner.options.route_options,
                    );
                    state.parent_routes = RouteSet::compile(
                        config.permitted_parent_routes.as_slice(),
                        self.inner.options.route_options,
                    );
                    state.config = Some(config.clone());
                    state.phase = AgentPhase::Ready;
                    init = state.init_tx.take().map(|tx| (tx, config.clone()));
                    tracing::info!("micro-app '{app_id}' initialized");
                }
                _ if state.phase != AgentPhase::Ready => {
                    tracing::debug!("agent not ready; ignoring {}", message.event_type());
                    return;
                }
                PortalEvent::CloseModal(payload) => match &payload.modal_id {
                    Some(modal_id) => state.open_modals.retain(|open| open != modal_id),
                    None => state.open_modals.clear(),
                },
                PortalEvent::InternalNavigationError(payload)
                | PortalEvent::ParentNavigationError(payload) => {
                    tracing::warn!(
                        "micro-app '{app_id}' navigation to {} refused: {}",
                        payload.route_path,
                        payload.message
                    );
                }
                _ => {}
            }
            (state.cancel.clone(), init)
        };

        if let Some((init_tx, config)) = init {
            // The waiter may already have given up.
            let _ = init_tx.send(Some(config));
        }
        self.inner
            .listeners
            .emit(&message, MessageDirection::Inbound, &cancel);
    }

    /// Send `event` to the host. A no-op before initialization and after
    /// destroy.
    pub fn post_message(&self, event: PortalEvent) -> bool {
        self.post_to(event, PORTAL_ID.to_string())
    }

    pub fn navigate_within_app(&self, route_path: impl Into<String>) -> bool {
        self.post_message(PortalEvent::NavigateInternal(NavigatePayload {
            route_path: route_path.into(),
        }))
    }

    pub fn navigate_parent_app(&self, route_path: impl Into<String>) -> bool {
        self.post_message(PortalEvent::NavigateParent(NavigatePayload {
            route_path: route_path.into(),
        }))
    }

    /// Ask the host to display a modal. Returns the generated modal id.
    pub fn show_modal(
        &self,
        content: ModalContent,
        display_options: Option<ModalDisplayOptions>,
    ) -> Option<String> {
        if !self.is_initialized() {
            tracing::warn!("agent not ready; not showing modal");
            return None;
        }
        let modal_id = Uuid::now_v7().to_string();
        self.inner.state.lock().open_modals.push(modal_id.clone());

        let sent = self.post_message(PortalEvent::ShowModal(ShowModalPayload {
            modal_id: Some(modal_id.clone()),
            content,
            display_options,
        }));
        if !sent {
            self.inner
                .state
                .lock()
                .open_modals
                .retain(|open| open != &modal_id);
            return None;
        }
        Some(modal_id)
    }

    /// Close one of this app's modals, or all of them when `modal_id` is
    /// `None`.
    pub fn close_modal(&self, modal_id: Option<&str>) -> bool {
        let sent = self.post_message(PortalEvent::CloseModal(CloseModalPayload {
            modal_id: modal_id.map(str::to_string),
            message: None,
        }));
        if sent {
            let mut state = self.inner.state.lock();
            match modal_id {
                Some(modal_id) => state.open_modals.retain(|open| open != modal_id),
                None => state.open_modals.clear(),
            }
        }
        sent
    }

    pub fn send_error(&self, error: impl Into<String>, message: impl Into<String>) -> bool {
        self.post_message(PortalEvent::AppError(AppErrorPayload {
            error: error.into(),
            message: message.into(),
        }))
    }

    /// Message another micro-app through the host.
    pub fn send_message(&self, target_app_id: impl Into<String>, data: Map<String, Value>) -> bool {
        self.post_to(PortalEvent::SendMessage(data), target_app_id.into())
    }

    pub fn app_id(&self) -> Option<String> {
        self.inner.state.lock().app_id.clone()
    }

    pub fn phase(&self) -> AgentPhase {
        self.inner.state.lock().phase
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == AgentPhase::Ready
    }

    pub fn app_config(&self) -> Option<AppConfig> {
        self.inner.state.lock().config.clone()
    }

    pub fn permitted_internal_routes(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .config
            .as_ref()
            .map(|config| config.permitted_internal_routes.clone())
            .unwrap_or_default()
    }

    pub fn permitted_parent_routes(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .config
            .as_ref()
            .map(|config| config.permitted_parent_routes.clone())
            .unwrap_or_default()
    }

    /// Local pre-check; the host enforces the same lists.
    pub fn can_navigate_within_app(&self, route_path: &str) -> bool {
        let state = self.inner.state.lock();
        state.phase == AgentPhase::Ready && state.internal_routes.matches(route_path).matched
    }

    pub fn can_navigate_parent_app(&self, route_path: &str) -> bool {
        let state = self.inner.state.lock();
        state.phase == AgentPhase::Ready && state.parent_routes.matches(route_path).matched
    }

    pub fn open_modals(&self) -> Vec<String> {
        self.inner.state.lock().open_modals.clone()
    }

    /// Token of the current lifecycle; replaced when `initialize` follows a
    /// `destroy`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.state.lock().cancel.clone()
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

    pub fn destroy(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.cancel.is_cancelled() {
                tracing::debug!("agent already destroyed");
                return;
            }
            state.cancel.cancel();
            state.phase = AgentPhase::Terminated;
            state.init_tx = None;
            state.open_modals.clear();
        }
        self.inner.listeners.clear();
        tracing::info!("micro-app agent destroyed");
    }

    fn post_to(&self, event: PortalEvent, target_id: String) -> bool {
        let (message, cancel) = {
            let state = self.inner.state.lock();
            if state.cancel.is_cancelled() {
                tracing::warn!("agent destroyed; not sending {}", event.event_type());
                return false;
            }
            let (AgentPhase::Ready, Some(app_id)) = (state.phase, state.app_id.as_ref()) else {
                tracing::warn!("agent not ready; not sending {}", event.event_type());
                return false;
            };
            (
                PortalMessage::new(event, app_id.clone(), Some(target_id)),
                state.cancel.clone(),
            )
        };
        self.transmit(&message, &cancel)
    }

    fn transmit(&self, message: &PortalMessage, cancel: &CancellationToken) -> bool {
        let value = match message.to_value() {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!("failed to encode {}: {error}", message.event_type());
                return false;
            }
        };
        match self.inner.transport.post(value) {
            Ok(()) => {
                self.inner
                    .listeners
                    .emit(message, MessageDirection::Outbound, cancel);
                true
            }
            Err(error) => {
                tracing::warn!("failed to send {}: {error}", message.event_type());
                false
            }
        }
    }

    /// Fail the pending handshake of `generation`, unless an init was
    /// accepted between the deadline firing and this call.
    fn expire_initialization(
        &self,
        app_id: &str,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Deadline {
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return Deadline::Superseded;
            }
            match state.phase {
                AgentPhase::AwaitingAck => {
                    state.phase = AgentPhase::Failed;
                    state.init_tx = None;
                }
                AgentPhase::Ready => {
                    return match state.config.clone() {
                        Some(config) => Deadline::Settled(config),
                        None => Deadline::Superseded,
                    };
                }
                _ => return Deadline::Superseded,
            }
        }
        tracing::warn!("micro-app '{app_id}' was not initialized by the portal in time");
        let report = PortalMessage::new(
            PortalEvent::AppError(AppErrorPayload {
                error: INITIALIZATION_ERROR.to_string(),
                message: format!("Micro-app {app_id} was not initialized by the portal"),
            }),
            app_id,
            Some(PORTAL_ID.to_string()),
        );
        self.transmit(&report, cancel);
        Deadline::Expired
    }
}

impl std::fmt::Debug for ChildAgent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        formatter
            .debug_struct("ChildAgent")
            .field("app_id", &state.app_id)
            .field("phase", &state.phase)
            .finish()
    }
}

/// An init is only taken from the host, addressed explicitly to this app,
/// describing this app, while the handshake is pending.
fn accepts_init(state: &AgentState, app_id: &str, message: &PortalMessage, config: &AppConfig) -> bool {
    if message.source_id != PORTAL_ID || message.target_id.as_deref() != Some(app_id) {
        tracing::debug!("ignoring {} not sent by the portal to '{app_id}'", EventType::InitApp);
        return false;
    }
    if config.id != app_id {
        tracing::debug!("ignoring init for '{}' delivered to '{app_id}'", config.id);
        return false;
    }
    if state.phase != AgentPhase::AwaitingAck {
        tracing::debug!("ignoring init for '{app_id}' in phase {:?}", state.phase);
        return false;
    }
    true
}
