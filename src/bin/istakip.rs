//! Headless console frontend for the voice bridge.
//!
//! Reads commands from stdin (`connect`, `disconnect`, `board`, `devices`,
//! `quit`), prints session events and notifications to stdout, and logs to
//! stderr.
//!
//! The hosted document store is out of scope here; the bridge runs against
//! the in-memory repository so the voice loop can be exercised end to end.

use istakip::audio::capture::CpalCapture;
use istakip::auth::StaticAuth;
use istakip::notify::{Notification, NotificationSettings, run_notifier};
use istakip::store::memory::InMemoryRepository;
use istakip::store::sync_cache;
use istakip::{
    AppConfig, AuthSession, BridgeEvent, Identity, SessionManager, SnapshotCache, TaskRepository,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = AppConfig::default_config_path();
    let config = if config_path.exists() {
        AppConfig::from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    let operator = std::env::var("ISTAKIP_USER").unwrap_or_else(|_| "operator@local".to_owned());
    let auth = StaticAuth::signed_in(Identity::new(operator.clone()));
    let identity = auth.subscribe().borrow().clone();
    info!("signed in as {operator}");

    let repo = Arc::new(InMemoryRepository::new());
    let cache = SnapshotCache::new();
    let cancel = CancellationToken::new();

    tokio::spawn(sync_cache(
        repo.subscribe(),
        cache.clone(),
        cancel.child_token(),
    ));

    let (notif_tx, mut notif_rx) = mpsc::unbounded_channel::<Notification>();
    tokio::spawn(run_notifier(
        repo.subscribe(),
        NotificationSettings::default(),
        notif_tx,
        cancel.child_token(),
    ));

    let mut manager = SessionManager::new(config, repo, cache.clone(), identity);
    let mut events = manager.events();

    println!("istakip | komutlar: connect, disconnect, board, devices, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(BridgeEvent::Connected) => println!("* bağlandı"),
                    Ok(BridgeEvent::Disconnected) => println!("* bağlantı kapandı"),
                    Ok(BridgeEvent::Speaking(true)) => println!("* asistan konuşuyor..."),
                    Ok(BridgeEvent::Speaking(false)) => println!("* asistan sustu"),
                    Ok(BridgeEvent::Error(msg)) => println!("! {msg}"),
                    Err(_) => {}
                }
            }
            Some(n) = notif_rx.recv() => {
                println!("[bildirim] {}", n.message);
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match line.trim() {
                    "connect" => {
                        if let Err(e) = manager.connect() {
                            println!("! {e}");
                        }
                    }
                    "disconnect" => manager.disconnect().await,
                    "board" => {
                        for task in cache.current().iter() {
                            println!(
                                "No:{} {} ({})",
                                task.order_number,
                                task.title,
                                task.status.label()
                            );
                        }
                    }
                    "devices" => match CpalCapture::list_input_devices() {
                        Ok(names) => {
                            for name in names {
                                println!("  {name}");
                            }
                        }
                        Err(e) => println!("! {e}"),
                    },
                    "quit" | "exit" => break,
                    "" => {}
                    other => println!("? bilinmeyen komut: {other}"),
                }
            }
        }
    }

    manager.disconnect().await;
    cancel.cancel();
    info!("istakip shut down cleanly");
    Ok(())
}
