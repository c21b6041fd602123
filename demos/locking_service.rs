//! Runs a heartbeat service on whichever process holds the lease.
//!
//! Start several copies against the same Redis nodes; exactly one of them logs
//! heartbeats at a time. Stop the holder (Ctrl-C) and another one takes over.
//!
//! ```text
//! cargo run --example locking_service -- locking.json
//! ```
//!
//! where `locking.json` looks like:
//!
//! ```json
//! {
//!   "resource": "heartbeat",
//!   "lease_millis": 5000,
//!   "nodes": [
//!     { "address": "localhost", "port": 7001 },
//!     { "address": "localhost", "port": 7002 },
//!     { "address": "localhost", "port": 7003 }
//!   ]
//! }
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use redlock::*;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SETTINGS: &str = r#"{
    "resource": "heartbeat",
    "nodes": [
        { "address": "localhost", "port": 7001 },
        { "address": "localhost", "port": 7002 },
        { "address": "localhost", "port": 7003 }
    ]
}"#;

/// Logs a heartbeat every two seconds until stopped.
#[derive(Default)]
struct Heartbeat {
    running: Mutex<Option<CancellationToken>>,
}

impl ServiceExecution for Heartbeat {
    async fn start(&self) -> LockResult<()> {
        let token = CancellationToken::new();
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        tokio::spawn(async move {
            let mut beats = 0_u64;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {
                        beats += 1;
                        info!(beats, "heartbeat from the lease holder");
                    }
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(token) = running {
            token.cancel();
            info!("heartbeat stopped");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => LockingSettings::from_file(path)?,
        None => LockingSettings::from_json_str(DEFAULT_SETTINGS)?,
    };

    let provider = RedisLockingProvider::from_settings(&settings).await?;
    let executor = provider.create_executor(Heartbeat::default(), settings.lock_id()?);

    tokio::select! {
        _ = executor.locked_start() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted, giving the lease up");
        }
    }

    executor.dispose().await;
    Ok(())
}
