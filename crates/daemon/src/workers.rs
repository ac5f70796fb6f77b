// SPDX-License-Identifier: Apache-2.0

//! Parallel worker loops, one per outbox/queue kind, each running
//! independently on its own tick.
//!
//! Every loop here is a bounded consumer: claim a batch, drive it to
//! completion one item at a time (isolating one item's failure from the
//! rest), ack or fail each item, sleep, repeat. None of them share state
//! beyond the `Engine`'s own locking, which is the sole coordination
//! boundary between them.

use crate::lifecycle::AppEngine;
use std::sync::Arc;
use std::time::Duration;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::session::AdapterKey;
use tracing::warn;

const BATCH_LIMIT: usize = 16;

pub fn spawn_all(engine: Arc<AppEngine>, shutdown: Arc<tokio::sync::Notify>) {
    spawn_loop(Arc::clone(&engine), Arc::clone(&shutdown), Duration::from_millis(500), drain_inbound);
    spawn_loop(Arc::clone(&engine), Arc::clone(&shutdown), Duration::from_millis(500), drain_hooks);
    spawn_loop(Arc::clone(&engine), Arc::clone(&shutdown), Duration::from_secs(2), drain_notifications);
    spawn_loop(Arc::clone(&engine), Arc::clone(&shutdown), Duration::from_secs(2), drain_webhooks);
    spawn_loop(engine, shutdown, Duration::from_secs(1), poll_all_outputs);
}

fn spawn_loop<F, Fut>(engine: Arc<AppEngine>, shutdown: Arc<tokio::sync::Notify>, interval: Duration, mut tick: F)
where
    F: FnMut(Arc<AppEngine>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => tick(Arc::clone(&engine)).await,
                _ = shutdown.notified() => break,
            }
        }
    });
}

async fn drain_inbound(engine: Arc<AppEngine>) {
    let claimed = match engine.claim_inbound_batch(BATCH_LIMIT) {
        Ok(batch) => batch,
        Err(e) => return warn!(error = %e, "inbound claim failed"),
    };
    for entry in claimed {
        let Some(session) = engine.get_session(&entry.session_id) else {
            let _ = engine.complete_inbound_failure(&entry.id, "session not found");
            continue;
        };
        let Some(tmux_session_name) = session.tmux_session_name else {
            let _ = engine.complete_inbound_failure(&entry.id, "session has no tmux pane");
            continue;
        };
        match engine.sessions.send(&tmux_session_name, &entry.content).await {
            Ok(()) => {
                let _ = engine.complete_inbound_success(&entry.id);
            }
            Err(e) => {
                let _ = engine.complete_inbound_failure(&entry.id, e.to_string());
            }
        }
    }
}

async fn drain_hooks(engine: Arc<AppEngine>) {
    let claimed = match engine.claim_hook_batch(BATCH_LIMIT) {
        Ok(batch) => batch,
        Err(e) => return warn!(error = %e, "hook claim failed"),
    };
    for entry in claimed {
        match engine.handle_agent_event(&entry.envelope).await {
            Ok(()) => {
                let _ = engine.complete_hook_success(entry.envelope.session_id, entry.envelope.event_type);
            }
            Err(e) => {
                let _ = engine.complete_hook_failure(&entry.id, e.to_string());
            }
        }
    }
}

/// Deliveries target a chat adapter when `channel` names one
/// (`"telegram"`, `"discord"`, `"whatsapp"`); any other channel name is a
/// logical routing label (e.g. `"escalations"`) with no transport of its
/// own yet, so it is acked once logged rather than retried forever.
async fn drain_notifications(engine: Arc<AppEngine>) {
    let claimed = match engine.claim_notification_batch(BATCH_LIMIT) {
        Ok(batch) => batch,
        Err(e) => return warn!(error = %e, "notification claim failed"),
    };
    for entry in claimed {
        let adapter_key = match entry.channel.as_str() {
            "telegram" => Some(AdapterKey::Telegram),
            "discord" => Some(AdapterKey::Discord),
            "whatsapp" => Some(AdapterKey::WhatsApp),
            _ => None,
        };
        let Some(adapter_key) = adapter_key else {
            tracing::info!(channel = %entry.channel, subscriber = %entry.subscriber, body = %entry.body, "notification logged (no transport registered for channel)");
            let _ = engine.complete_notification_success(&entry.id);
            continue;
        };
        let Some(adapter) = engine.chat_adapters.get(&adapter_key).cloned() else {
            let _ = engine.complete_notification_failure(&entry.id, "adapter not configured", None);
            continue;
        };
        match adapter.send_message(&entry.subscriber, &entry.body).await {
            Ok(_) => {
                let _ = engine.complete_notification_success(&entry.id);
            }
            Err(e) => {
                let _ = engine.complete_notification_failure(&entry.id, e.to_string(), None);
            }
        }
    }
}

async fn drain_webhooks(engine: Arc<AppEngine>) {
    let claimed = match engine.claim_webhook_batch(BATCH_LIMIT) {
        Ok(batch) => batch,
        Err(e) => return warn!(error = %e, "webhook claim failed"),
    };
    let client = reqwest::Client::new();
    for entry in claimed {
        let result = client.post(&entry.target_url).json(&entry.payload_json).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                let _ = engine.complete_webhook_success(&entry.id);
            }
            Ok(resp) => {
                let _ = engine.complete_webhook_failure(&entry.id, format!("http {}", resp.status()), None);
            }
            Err(e) => {
                let _ = engine.complete_webhook_failure(&entry.id, e.to_string(), None);
            }
        }
    }
}

/// Output poller driver: one delta check per active session per tick,
/// fanned out to every bound adapter using whichever delivery mode the
/// threaded-output gate selects for that adapter.
async fn poll_all_outputs(engine: Arc<AppEngine>) {
    let sessions = engine.list_sessions(teleclaude_engine::SessionFilter { active_only: true, ..Default::default() });
    for session in sessions {
        let delta = match engine.poll_output_delta(&session.id).await {
            Ok(Some(delta)) => delta,
            Ok(None) => continue,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "output poll failed");
                continue;
            }
        };
        let threaded = engine.threaded_output_enabled(&session.id, &[]);
        for adapter_key in session.adapters.keys().cloned().collect::<Vec<_>>() {
            let result = if threaded {
                engine.deliver_output_threaded(&session.id, &adapter_key, &delta).await
            } else {
                engine.deliver_output_standard(&session.id, &adapter_key, &delta).await
            };
            if let Err(e) = result {
                warn!(session_id = %session.id, adapter = %adapter_key, error = %e, "output delivery failed");
            }
        }
    }
}
