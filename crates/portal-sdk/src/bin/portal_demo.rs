//! Runs a portal and its micro-apps in one process over in-memory channels.
//!
//! Usage: `cargo run --bin portal_demo` (reads `PORTAL_CONFIG`, falling back
//! to `./portal.json`, then to a built-in two-app setup).

use std::sync::Arc;
use std::time::Duration;

use portal_sdk::config::{load_portal_config, resolve_config_path};
use portal_sdk::transport::memory;
use portal_sdk::{
    AgentOptions, AppConfig, BrokerEvent, ChildAgent, FrameHandle, HostBroker, PortalConfig,
    PortalResult,
};

fn demo_config() -> PortalConfig {
    PortalConfig {
        apps: vec![
            AppConfig::new("accounts", "Accounts", "http://localhost:3001", "/")
                .with_internal_routes(["/", "/accounts", "/accounts/:id"])
                .with_parent_routes(["/", "/settings/*"]),
            AppConfig::new("payments", "Payments", "http://localhost:3002", "/pay")
                .with_internal_routes(["/pay/*"])
                .with_parent_routes(["/"]),
        ],
        ..PortalConfig::default()
    }
}

#[tokio::main]
async fn main() -> PortalResult<()> {
    let _ = dotenvy::from_path(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env"));
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = resolve_config_path(&std::env::current_dir()?);
    let mut config = if path.exists() {
        load_portal_config(&path)?
    } else {
        tracing::info!("no config at {}; using the built-in demo apps", path.display());
        demo_config()
    };
    config.apply_env_overrides();

    let broker = HostBroker::from_config(
        &config,
        Arc::new(|route: &str| tracing::info!("portal router -> {route}")),
    )?;

    let mut events = broker.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::info!("broker event {json}"),
                Err(error) => tracing::warn!("unprintable broker event: {error}"),
            }
            if let BrokerEvent::AppReset(reset) = &event {
                tracing::info!("'{}' was sent back to {}", reset.app_id, reset.entry_url);
            }
        }
    });

    let mut frames = Vec::new();
    let mut agents = Vec::new();
    for app in &config.apps {
        let (to_portal, portal_rx) = memory::port("portal");
        let (to_child, child_rx) = memory::port(app.id.clone());
        let frame: Arc<dyn FrameHandle> = to_child;
        broker.attach_transport(&app.id, &frame);
        frames.push(frame);

        let agent = ChildAgent::with_options(to_portal, AgentOptions::from_config(&config));
        let host = broker.clone();
        memory::spawn_pump(portal_rx, broker.cancellation_token(), move |value| {
            host.receive(&value)
        });
        let child = agent.clone();
        memory::spawn_pump(child_rx, agent.cancellation_token(), move |value| {
            child.handle_message(&value)
        });
        agents.push((app.id.clone(), agent));
    }

    for (app_id, agent) in &agents {
        let config = agent.initialize(app_id.as_str()).await?;
        tracing::info!(
            "'{app_id}' initialized with internal routes {:?}",
            config.permitted_internal_routes
        );
    }

    if let Some((app_id, agent)) = agents.first() {
        let allowed = agent
            .permitted_internal_routes()
            .into_iter()
            .find(|route| !route.contains([':', '*']))
            .unwrap_or_else(|| "/".to_string());
        tracing::info!("'{app_id}' navigating to permitted {allowed}");
        agent.navigate_within_app(allowed);

        tracing::info!("'{app_id}' navigating to forbidden /admin");
        agent.navigate_within_app("/admin");
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    for (_, agent) in &agents {
        agent.destroy();
    }
    broker.destroy();
    Ok(())
}
