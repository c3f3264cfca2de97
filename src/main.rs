use anyhow::Context;
use clip_bridge::core::{init_tracing, AppConfig, Session};
use clip_bridge::CaptureKind;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let config = AppConfig::load_or_default();

    // One-shot mode: `clip-bridge capture <video-url> [full|clip|audio] [time]`
    if args.get(1).map(String::as_str) == Some("capture") {
        return run_capture(&config, &args[2..]).await;
    }

    info!("clip-bridge {} starting", clip_bridge::VERSION);
    let mut session = Session::bootstrap(config)
        .await
        .context("session bootstrap failed")?;

    tokio::select! {
        result = session.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    session.shutdown().await;
    Ok(())
}

async fn run_capture(config: &AppConfig, args: &[String]) -> anyhow::Result<()> {
    let Some(video_url) = args.first() else {
        anyhow::bail!("usage: clip-bridge capture <video-url> [full|clip|audio] [current-time]");
    };
    let kind = match args.get(1) {
        Some(name) => CaptureKind::from_wire_name(name)
            .with_context(|| format!("unknown capture kind: {name}"))?,
        None => CaptureKind::Full,
    };
    let current_time = args.get(2).and_then(|t| t.parse::<f64>().ok());

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;
    // No channel in one-shot mode; cancel events have nowhere to go.
    let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
    let trigger = clip_bridge::CaptureTrigger::new(
        http,
        config.backend.http_url("/handle-video-url"),
        outbound_tx,
    );

    if trigger.request(kind, video_url, current_time).await {
        info!("{kind} capture submitted for {video_url}");
        Ok(())
    } else {
        anyhow::bail!("capture request was not accepted")
    }
}
