//! Workshop watcher.
//!
//! Connects to a workshop server, keeps the local view in sync through the
//! push channel and polling, and logs every workshop's displayed status as
//! it changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workshop_sync_client::bridge::PollingBridge;
use workshop_sync_client::channel::PushChannel;
use workshop_sync_client::config::SyncConfig;
use workshop_sync_client::http::HttpWorkshopApi;
use workshop_sync_client::state::WorkshopSummary;
use workshop_sync_client::ws::WsPushTransport;
use workshop_sync_client::{SyncAction, SyncEnvironment, SyncReducer, SyncState, SyncStore};
use workshop_sync_core::environment::SystemClock;
use workshop_sync_core::model::WorkshopId;
use workshop_sync_runtime::metrics::MetricsServer;
use workshop_sync_runtime::{Store, ThreadRngJitter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = SyncConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.observability.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        api = %config.api.base_url,
        push = %config.push.url,
        poll_interval_secs = config.polling.interval_secs,
        "Configuration loaded"
    );

    let mut metrics_server = None;
    if let Some(addr) = &config.observability.metrics_addr {
        match addr.parse() {
            Ok(addr) => {
                let mut server = MetricsServer::new(addr);
                server.start()?;
                metrics_server = Some(server);
            }
            Err(error) => warn!(%addr, %error, "Invalid METRICS_ADDR, metrics disabled"),
        }
    }

    let api = HttpWorkshopApi::new(
        config.api.base_url.clone(),
        config.api.token.clone(),
        config.api_timeout(),
    )?;
    let transport = WsPushTransport::new(config.push.url.clone(), config.api.token.clone());
    let (bridge, worker) = PollingBridge::new(config.poll_interval());

    let environment = SyncEnvironment::new(
        Arc::new(api),
        Arc::new(transport),
        Arc::new(bridge),
        Arc::new(SystemClock),
        Arc::new(ThreadRngJitter),
    )
    .with_reconnect_policy(config.reconnect_policy())
    .with_ping_interval(config.ping_interval());

    let store: SyncStore = Store::new(SyncState::new(), SyncReducer, environment);
    let poller = worker.spawn(store.clone());

    let channel = PushChannel::new(store.clone());
    let lease = channel.acquire().await?;
    store.send(SyncAction::FetchWorkshops).await?;
    info!("Watching workshops, press Ctrl+C to stop");

    let mut revisions = store.subscribe_revisions();
    let mut shown: HashMap<WorkshopId, WorkshopSummary> = HashMap::new();

    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                report_changes(&store, &mut shown).await;
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(error) = lease.release().await {
        warn!(%error, "Failed to release the push channel");
    }
    store.shutdown(Duration::from_secs(5)).await?;
    poller.abort();

    if let Some(rendered) = metrics_server.as_ref().and_then(MetricsServer::render) {
        tracing::debug!(metrics = %rendered, "Final metrics");
    }
    info!("Stopped");
    Ok(())
}

/// Log every workshop whose displayed summary differs from the last one shown
async fn report_changes(store: &SyncStore, shown: &mut HashMap<WorkshopId, WorkshopSummary>) {
    let (current, channel) = store
        .state(|state| {
            let summaries: Vec<(WorkshopId, String, WorkshopSummary)> = state
                .entities
                .workshops()
                .filter_map(|w| {
                    state
                        .workshop_summary(&w.id)
                        .map(|summary| (w.id.clone(), w.name.clone(), summary))
                })
                .collect();
            (summaries, state.channel.phase)
        })
        .await;

    for (id, name, summary) in &current {
        if shown.get(id) != Some(summary) {
            info!(
                workshop = %id,
                %name,
                status = %summary.status,
                attendees = summary.attendee_count,
                active = summary.active_attendees,
                ?channel,
                "Workshop updated"
            );
            shown.insert(id.clone(), *summary);
        }
    }

    shown.retain(|id, _| {
        let present = current.iter().any(|(known, _, _)| known == id);
        if !present {
            info!(workshop = %id, "Workshop removed");
        }
        present
    });
}
