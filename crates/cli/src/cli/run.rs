use anyhow::Context;
use ol_client::{OpenLiveClientBuilder, StartOutcome, ALL};
use ol_domain::config::Config;

/// Start the session, log every event, and stop on Ctrl-C.
///
/// Returns only after the session heartbeat loop has ended the
/// server-side session.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let client = OpenLiveClientBuilder::from_config(&config)
        .build()
        .context("building client")?;

    let events = client.events();
    events.on_auth_reply(|json, _raw| {
        tracing::info!(reply = %json, "auth reply");
    });
    events.on_heartbeat_reply(|popularity, _raw| {
        tracing::debug!(popularity, "heartbeat reply");
    });
    events.on_commands([ALL], |ev| {
        tracing::info!(cmd = %ev.cmd, data = %ev.json["data"], "message");
    });

    match client.start().await {
        Ok(StartOutcome::Started) => {
            let session = client.session();
            let game_id = session.as_ref().map(|s| s.game_id.as_str()).unwrap_or_default();
            tracing::info!(game_id = %game_id, "session running, press Ctrl-C to stop");
        }
        Ok(StartOutcome::AlreadyRunning) => {
            tracing::warn!("session already running");
        }
        Err(e) => return Err(e).context("starting session"),
    }

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r.context("listening for Ctrl-C")?;
            tracing::info!("received SIGINT, shutting down");
            client.stop();
        }
        _ = client.wait_until_stopped() => {
            tracing::warn!("session ended on its own");
        }
    }

    client.wait_until_stopped().await;
    tracing::info!("session closed");
    Ok(())
}
