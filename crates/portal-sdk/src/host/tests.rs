use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, mpsc};

use super::*;
use crate::config::PortalConfig;
use crate::event::{BrokerEvent, NavigationScope};
use crate::listener::MessageDirection;
use crate::protocol::{
    parse_message, AppConfig, AppReadyPayload, CloseModalPayload, EventType, ModalContent,
    NavigatePayload, NavigationErrorKind, PortalEvent, PortalMessage, RouteChangedPayload,
    ShowModalPayload, PORTAL_ID,
};
use crate::transport::memory::{self, MemoryPort};
use crate::transport::FrameHandle;

fn app_a() -> AppConfig {
    AppConfig::new("micro-app-a", "Accounts", "http://localhost:3001", "/")
        .with_internal_routes(["/", "/accounts", "/accounts/:id"])
        .with_parent_routes(["/home", "/settings/*"])
}

fn app_b() -> AppConfig {
    AppConfig::new("micro-app-b", "Payments", "http://localhost:3002", "/app/start")
        .with_internal_routes(["/*"])
}

fn broker() -> (HostBroker, Arc<Mutex<Vec<String>>>) {
    let navigations = Arc::new(Mutex::new(Vec::new()));
    let recorded = navigations.clone();
    let broker = HostBroker::new(Arc::new(move |path: &str| {
        recorded.lock().push(path.to_string());
    }));
    (broker, navigations)
}

fn attach(broker: &HostBroker, app_id: &str) -> (Arc<MemoryPort>, mpsc::UnboundedReceiver<Value>) {
    let (port, rx) = memory::port(app_id);
    let frame: Arc<dyn FrameHandle> = port.clone();
    assert!(broker.attach_transport(app_id, &frame));
    (port, rx)
}

fn wire(source: &str, event: PortalEvent) -> Value {
    wire_to(source, event, Some(PORTAL_ID))
}

fn wire_to(source: &str, event: PortalEvent, target: Option<&str>) -> Value {
    PortalMessage::new(event, source, target.map(str::to_string))
        .to_value()
        .unwrap()
}

fn ready() -> PortalEvent {
    PortalEvent::AppReady(AppReadyPayload {
        message: "ready".to_string(),
    })
}

fn navigate_internal(path: &str) -> PortalEvent {
    PortalEvent::NavigateInternal(NavigatePayload {
        route_path: path.to_string(),
    })
}

fn navigate_parent(path: &str) -> PortalEvent {
    PortalEvent::NavigateParent(NavigatePayload {
        route_path: path.to_string(),
    })
}

fn show_modal(modal_id: &str) -> PortalEvent {
    PortalEvent::ShowModal(ShowModalPayload {
        modal_id: Some(modal_id.to_string()),
        content: ModalContent {
            title: "Confirm".to_string(),
            body: "Are you sure?".to_string(),
        },
        display_options: None,
    })
}

fn close_modal(modal_id: Option<&str>) -> PortalEvent {
    PortalEvent::CloseModal(CloseModalPayload {
        modal_id: modal_id.map(str::to_string),
        message: None,
    })
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Value>) -> Vec<PortalMessage> {
    let mut messages = Vec::new();
    while let Ok(value) = rx.try_recv() {
        messages.push(parse_message(&value).expect("host sends valid messages"));
    }
    messages
}

fn drain_events(rx: &mut broadcast::Receiver<BrokerEvent>) -> Vec<BrokerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn register_unregister_round_trip() {
    let (broker, _) = broker();
    assert!(broker.register(app_a()).is_none());
    assert_eq!(broker.get_app("micro-app-a"), Some(app_a()));
    assert_eq!(broker.app_ids(), vec!["micro-app-a"]);

    assert_eq!(broker.unregister("micro-app-a"), Some(app_a()));
    assert!(broker.get_app("micro-app-a").is_none());
    assert!(broker.app_ids().is_empty());

    assert!(broker.unregister("micro-app-a").is_none());
}

#[test]
fn register_replaces_whole_config() {
    let (broker, _) = broker();
    broker.register(app_a());
    let narrowed = app_a().with_internal_routes(["/"]);
    assert_eq!(broker.register(narrowed.clone()), Some(app_a()));
    assert_eq!(broker.get_app("micro-app-a"), Some(narrowed));
}

#[test]
fn handshake_sends_registered_config() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");
    let mut events = broker.subscribe();

    broker.receive(&wire("micro-app-a", ready()));

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].source_id, PORTAL_ID);
    assert_eq!(sent[0].target_id.as_deref(), Some("micro-app-a"));
    assert_eq!(sent[0].event, PortalEvent::InitApp(app_a()));
    assert!(broker.is_app_initialized("micro-app-a"));

    let events = drain_events(&mut events);
    assert!(matches!(
        events.as_slice(),
        [BrokerEvent::AppInitialized(payload)] if payload.app_id == "micro-app-a"
    ));
}

#[test]
fn duplicate_ready_resends_init_once_published() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");
    let mut events = broker.subscribe();

    broker.receive(&wire("micro-app-a", ready()));
    broker.receive(&wire("micro-app-a", ready()));

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].event, sent[1].event);
    assert_eq!(drain_events(&mut events).len(), 1);
}

#[test]
fn ready_without_transport_sends_nothing() {
    let (broker, _) = broker();
    broker.register(app_a());
    broker.receive(&wire("micro-app-a", ready()));
    assert!(!broker.is_app_initialized("micro-app-a"));
}

#[test]
fn unknown_source_is_dropped() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    broker.add_event_listener(move |_, _| *counter.lock() += 1);

    broker.receive(&wire("intruder", ready()));

    assert!(drain(&mut rx).is_empty());
    assert_eq!(*calls.lock(), 0);
}

#[test]
fn unknown_type_produces_no_effects() {
    let (broker, navigations) = broker();
    broker.register(app_a());
    let (port, mut rx) = attach(&broker, "micro-app-a");
    let mut events = broker.subscribe();
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    broker.add_event_listener(move |_, _| *counter.lock() += 1);

    broker.receive(&json!({
        "type": "app:unknown",
        "data": { "routePath": "/home" },
        "sourceId": "micro-app-a",
        "targetId": "portal",
        "timestamp": 1
    }));
    broker.receive(&json!("app:ready"));

    assert!(drain(&mut rx).is_empty());
    assert!(port.reloads().is_empty());
    assert!(navigations.lock().is_empty());
    assert!(drain_events(&mut events).is_empty());
    assert_eq!(*calls.lock(), 0);
    assert_eq!(broker.get_app("micro-app-a"), Some(app_a()));
}

#[test]
fn misaddressed_and_child_bound_messages_are_dropped() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");

    broker.receive(&wire_to("micro-app-a", ready(), Some("someone-else")));
    broker.receive(&wire("micro-app-a", PortalEvent::InitApp(app_a())));
    broker.receive(&wire(
        "micro-app-a",
        PortalEvent::RouteChanged(RouteChangedPayload {
            app_id: None,
            route_path: "/".to_string(),
            internal: true,
        }),
    ));

    assert!(drain(&mut rx).is_empty());
    assert!(!broker.is_app_initialized("micro-app-a"));
}

#[test]
fn broadcast_ready_without_target_is_accepted() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");

    broker.receive(&wire_to("micro-app-a", ready(), None));
    assert_eq!(drain(&mut rx).len(), 1);
}

#[test]
fn permitted_internal_navigation_broadcasts_route_change() {
    let (broker, _) = broker();
    broker.register(app_a());
    broker.register(app_b());
    let (port_a, mut rx_a) = attach(&broker, "micro-app-a");
    let (_port_b, mut rx_b) = attach(&broker, "micro-app-b");
    let mut events = broker.subscribe();

    broker.receive(&wire("micro-app-a", navigate_internal("/accounts/42")));

    let expected = PortalEvent::RouteChanged(RouteChangedPayload {
        app_id: Some("micro-app-a".to_string()),
        route_path: "/accounts/42".to_string(),
        internal: true,
    });
    for rx in [&mut rx_a, &mut rx_b] {
        let sent = drain(rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, expected);
        assert!(sent[0].target_id.is_none());
    }
    assert!(port_a.reloads().is_empty());
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [BrokerEvent::RouteChanged(payload)] if payload.internal && payload.route_path == "/accounts/42"
    ));
}

#[test]
fn forbidden_internal_navigation_replies_and_resets() {
    let (broker, navigations) = broker();
    broker.register(app_a());
    broker.register(app_b());
    let (port_a, mut rx_a) = attach(&broker, "micro-app-a");
    let (port_b, mut rx_b) = attach(&broker, "micro-app-b");
    let mut events = broker.subscribe();

    broker.receive(&wire("micro-app-a", navigate_internal("/admin")));

    let sent = drain(&mut rx_a);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target_id.as_deref(), Some("micro-app-a"));
    match &sent[0].event {
        PortalEvent::InternalNavigationError(payload) => {
            assert_eq!(
                payload.error,
                NavigationErrorKind::InternalNavigationBoundaryViolation
            );
            assert_eq!(payload.route_path, "/admin");
            assert_eq!(payload.message, "Insufficient permissions to navigate there.");
        }
        other => panic!("expected navigation error, got {other:?}"),
    }
    assert_eq!(port_a.reloads(), vec!["http://localhost:3001/"]);

    assert!(drain(&mut rx_b).is_empty());
    assert!(port_b.reloads().is_empty());
    assert!(navigations.lock().is_empty());
    assert_eq!(broker.get_app("micro-app-a"), Some(app_a()));

    let events = drain_events(&mut events);
    assert!(matches!(
        events.as_slice(),
        [BrokerEvent::NavigationDenied(denied), BrokerEvent::AppReset(reset)]
            if denied.scope == NavigationScope::Internal
                && reset.entry_url == "http://localhost:3001/"
    ));

    broker.receive(&wire("micro-app-a", navigate_internal("/accounts")));
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(port_a.reloads().len(), 1);
}

#[test]
fn reset_resolves_entry_point_against_base_url() {
    let (broker, _) = broker();
    broker.register(app_b().with_internal_routes(["/"]));
    let (port, _rx) = attach(&broker, "micro-app-b");

    broker.receive(&wire("micro-app-b", navigate_internal("/elsewhere")));
    assert_eq!(port.reloads(), vec!["http://localhost:3002/app/start"]);
}

#[test]
fn permitted_parent_navigation_invokes_router() {
    let (broker, navigations) = broker();
    broker.register(app_a());
    let (port, mut rx) = attach(&broker, "micro-app-a");

    broker.receive(&wire("micro-app-a", navigate_parent("/settings/profile")));

    assert_eq!(*navigations.lock(), vec!["/settings/profile"]);
    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0].event,
        PortalEvent::RouteChanged(payload) if !payload.internal
    ));
    assert!(port.reloads().is_empty());
}

#[test]
fn forbidden_parent_navigation_replies_without_reset() {
    let (broker, navigations) = broker();
    broker.register(app_a());
    let (port, mut rx) = attach(&broker, "micro-app-a");
    let mut events = broker.subscribe();

    broker.receive(&wire("micro-app-a", navigate_parent("/admin")));

    assert!(navigations.lock().is_empty());
    assert!(port.reloads().is_empty());
    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0].event,
        PortalEvent::ParentNavigationError(payload)
            if payload.error == NavigationErrorKind::ParentNavigationBoundaryViolation
    ));
    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [BrokerEvent::NavigationDenied(denied)] if denied.scope == NavigationScope::Parent
    ));
}

#[test]
fn modal_lifecycle_respects_ownership() {
    let (broker, _) = broker();
    broker.register(app_a());
    broker.register(app_b());
    let (_port_a, _rx_a) = attach(&broker, "micro-app-a");

    broker.receive(&wire("micro-app-a", show_modal("m1")));
    broker.receive(&wire("micro-app-a", show_modal("m2")));
    let modals = broker.active_modals();
    assert_eq!(modals.len(), 2);
    assert_eq!(modals[0].id, "m1");
    assert_eq!(modals[0].app_id, "micro-app-a");

    broker.receive(&wire("micro-app-b", close_modal(Some("m1"))));
    assert_eq!(broker.active_modals().len(), 2);

    broker.receive(&wire("micro-app-a", close_modal(Some("m1"))));
    assert_eq!(broker.active_modals().len(), 1);

    broker.receive(&wire("micro-app-a", close_modal(None)));
    assert!(broker.active_modals().is_empty());
}

#[test]
fn modal_ids_are_unique_across_apps() {
    let (broker, _) = broker();
    broker.register(app_a());
    broker.register(app_b());
    let (_port_a, mut rx_a) = attach(&broker, "micro-app-a");
    let (_port_b, mut rx_b) = attach(&broker, "micro-app-b");
    let mut events = broker.subscribe();

    broker.receive(&wire("micro-app-a", show_modal("m1")));
    broker.receive(&wire("micro-app-b", show_modal("m1")));

    let modals = broker.active_modals();
    assert_eq!(modals.len(), 1);
    assert_eq!(modals[0].app_id, "micro-app-a");
    assert_eq!(drain_events(&mut events).len(), 1);

    assert!(broker.close_modal("m1"));
    assert_eq!(drain(&mut rx_a).len(), 1);
    assert!(drain(&mut rx_b).is_empty());
    assert!(broker.active_modals().is_empty());
}

#[test]
fn host_close_modal_echoes_to_owner() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");
    let mut events = broker.subscribe();

    broker.receive(&wire("micro-app-a", show_modal("m1")));
    assert!(broker.close_modal("m1"));
    assert!(!broker.close_modal("m1"));

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, close_modal(Some("m1")));
    assert_eq!(sent[0].target_id.as_deref(), Some("micro-app-a"));

    let events = drain_events(&mut events);
    assert!(matches!(events[0], BrokerEvent::ModalOpened(ref modal) if modal.id == "m1"));
    assert!(matches!(events[1], BrokerEvent::ModalClosed(ref closed) if closed.modal_id == "m1"));
}

#[test]
fn send_message_is_forwarded_verbatim() {
    let (broker, _) = broker();
    broker.register(app_a());
    broker.register(app_b());
    let (_port_a, mut rx_a) = attach(&broker, "micro-app-a");
    let (_port_b, mut rx_b) = attach(&broker, "micro-app-b");

    let mut data = Map::new();
    data.insert("greeting".to_string(), json!("hello"));
    let raw = wire_to(
        "micro-app-a",
        PortalEvent::SendMessage(data.clone()),
        Some("micro-app-b"),
    );
    broker.receive(&raw);

    let forwarded = drain(&mut rx_b);
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0], parse_message(&raw).unwrap());
    assert_eq!(forwarded[0].event, PortalEvent::SendMessage(data.clone()));
    assert!(drain(&mut rx_a).is_empty());

    broker.receive(&wire_to(
        "micro-app-a",
        PortalEvent::SendMessage(data.clone()),
        Some("micro-app-z"),
    ));
    broker.receive(&wire("micro-app-a", PortalEvent::SendMessage(data)));
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());
}

#[test]
fn app_error_is_published() {
    let (broker, _) = broker();
    broker.register(app_a());
    let mut events = broker.subscribe();

    broker.receive(&wire(
        "micro-app-a",
        PortalEvent::AppError(crate::protocol::AppErrorPayload {
            error: "initialization_error".to_string(),
            message: "boom".to_string(),
        }),
    ));

    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [BrokerEvent::AppErrorReported(report)] if report.error == "initialization_error"
    ));
}

#[test]
fn listeners_see_inbound_and_outbound_traffic() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, _rx) = attach(&broker, "micro-app-a");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let id = broker.add_event_listener(move |message, direction| {
        recorded.lock().push((message.event_type(), direction));
    });

    broker.receive(&wire("micro-app-a", ready()));
    assert_eq!(
        *seen.lock(),
        vec![
            (EventType::AppReady, MessageDirection::Inbound),
            (EventType::InitApp, MessageDirection::Outbound),
        ]
    );

    assert!(broker.remove_event_listener(id));
    broker.receive(&wire("micro-app-a", ready()));
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn registry_is_mutable_from_callbacks() {
    let slot: Arc<OnceLock<HostBroker>> = Arc::new(OnceLock::new());
    let in_navigate = slot.clone();
    let broker = HostBroker::new(Arc::new(move |_path: &str| {
        if let Some(broker) = in_navigate.get() {
            broker.unregister("micro-app-b");
        }
    }));
    let _ = slot.set(broker.clone());

    broker.register(app_a());
    broker.register(app_b());
    let (_port, _rx) = attach(&broker, "micro-app-a");

    let in_listener = broker.clone();
    broker.add_event_listener(move |message, direction| {
        if direction == MessageDirection::Inbound && message.event_type() == EventType::AppReady {
            in_listener.register(
                AppConfig::new("micro-app-c", "C", "http://localhost:3003", "/")
                    .with_internal_routes(["/"]),
            );
        }
    });

    broker.receive(&wire("micro-app-a", ready()));
    assert!(broker.get_app("micro-app-c").is_some());

    broker.receive(&wire("micro-app-a", navigate_parent("/home")));
    assert!(broker.get_app("micro-app-b").is_none());
}

#[test]
fn destroy_silences_broker() {
    let (broker, navigations) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    broker.add_event_listener(move |_, _| *counter.lock() += 1);

    broker.destroy();
    broker.destroy();
    assert!(broker.is_destroyed());

    broker.receive(&wire("micro-app-a", ready()));
    broker.receive(&wire("micro-app-a", navigate_parent("/home")));

    assert!(drain(&mut rx).is_empty());
    assert!(navigations.lock().is_empty());
    assert_eq!(*calls.lock(), 0);
    assert!(!broker.send_to("micro-app-a", ready()));
}

#[test]
fn destroy_from_listener_cancels_pending_effects() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, mut rx) = attach(&broker, "micro-app-a");
    let in_listener = broker.clone();
    broker.add_event_listener(move |_, _| in_listener.destroy());
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    broker.add_event_listener(move |_, _| *counter.lock() += 1);

    broker.receive(&wire("micro-app-a", ready()));

    assert!(drain(&mut rx).is_empty());
    assert_eq!(*calls.lock(), 0);
}

#[test]
fn send_to_and_broadcast_need_live_transport() {
    let (broker, _) = broker();
    broker.register(app_a());
    broker.register(app_b());
    assert!(!broker.send_to("micro-app-a", ready()));
    assert!(!broker.send_to("ghost", ready()));

    let (_port_a, mut rx_a) = attach(&broker, "micro-app-a");
    assert!(broker.send_to("micro-app-a", close_modal(None)));
    assert_eq!(drain(&mut rx_a).len(), 1);

    broker.broadcast(close_modal(None));
    let sent = drain(&mut rx_a);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].target_id.is_none());
    assert_eq!(sent[0].source_id, PORTAL_ID);
}

#[test]
fn frame_lifetime_controls_attachment() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (port, rx) = attach(&broker, "micro-app-a");
    assert!(broker.is_attached("micro-app-a"));

    drop(port);
    drop(rx);
    assert!(!broker.is_attached("micro-app-a"));

    let (_port, _rx) = attach(&broker, "micro-app-a");
    assert!(broker.detach_transport("micro-app-a"));
    assert!(!broker.is_attached("micro-app-a"));

    let (port, rx) = memory::port("ghost");
    let frame: Arc<dyn FrameHandle> = port;
    assert!(!broker.attach_transport("ghost", &frame));
    drop(rx);
}

#[test]
fn unregister_closes_modals_and_forgets_frame() {
    let (broker, _) = broker();
    broker.register(app_a());
    let (_port, _rx) = attach(&broker, "micro-app-a");
    broker.receive(&wire("micro-app-a", show_modal("m1")));
    assert_eq!(broker.active_modals().len(), 1);

    broker.unregister("micro-app-a");
    assert!(broker.active_modals().is_empty());

    broker.register(app_a());
    assert!(!broker.is_attached("micro-app-a"));
}

#[test]
fn from_config_registers_every_app() {
    let config = PortalConfig {
        apps: vec![app_a(), app_b()],
        ..PortalConfig::default()
    };
    let broker = HostBroker::from_config(&config, Arc::new(|_: &str| {})).expect("broker");
    assert_eq!(broker.app_ids(), vec!["micro-app-a", "micro-app-b"]);

    let invalid = PortalConfig {
        apps: vec![app_a(), app_a()],
        ..PortalConfig::default()
    };
    assert!(HostBroker::from_config(&invalid, Arc::new(|_: &str| {})).is_err());
}
