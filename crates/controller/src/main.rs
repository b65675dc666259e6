// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use pitboss_controller::config::DemoArgs;
use pitboss_controller::{Controller, LiveRpc, MemoryFieldStore, Preferences};

#[tokio::main]
async fn main() {
    let args = DemoArgs::parse();

    let subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Err(e) = run(args).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: DemoArgs) -> anyhow::Result<()> {
    let prefs = Preferences {
        refresh_interval: args.refresh_interval(),
        unit: args.unit(),
        auto_rediscovery: args.auto_rediscovery,
        ip_address: Some(args.ip.clone()),
        scan_continue: true,
    };

    let auth = Arc::new(pitboss_controller::auth::AuthCache::new());
    let rpc = Arc::new(LiveRpc::new(Arc::clone(&auth)));
    let field_store = Arc::new(MemoryFieldStore::new());
    let locks = Arc::new(pitboss_controller::discovery::RediscoveryLocks::new());

    let controller = Controller::new(args.device_id.clone(), args.ip.clone(), prefs, rpc, Arc::clone(&field_store), auth, locks);

    info!(device_id = %args.device_id, ip = %args.ip, "starting controller");
    controller.init().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
                let state = controller.current_state().await;
                info!(
                    connectivity = ?state.connectivity,
                    operation = ?state.operation,
                    panic = state.panic,
                    message = ?state.message,
                    power_w = state.power_w,
                    "status"
                );
            }
        }
    }

    controller.remove().await;
    Ok(())
}
