// Copyright (C) 2023 Felix Huettner
//
// This file is part of DTND.
//
// DTND is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// DTND is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{path::Path, sync::Arc};

use log::{error, info};
use tokio::sync::{broadcast, mpsc};

use dtnd::{
    cla::{loopback::LoopbackCl, ClRegistry},
    common::{settings::Settings, shutdown::Shutdown},
    daemon::BundleDaemon,
    storage::rocks::RocksStore,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting up");
    let settings: Settings = Settings::from_env();
    info!("Starting with settings: {settings:?}");
    if let Some(tokio_tracing_port) = settings.tokio_tracing_port.clone() {
        info!("Initializing tokio tracing on port {tokio_tracing_port}");
        console_subscriber::ConsoleLayer::builder()
            .server_addr(([127, 0, 0, 1], tokio_tracing_port.parse().unwrap()))
            .init();
    }

    let store = match RocksStore::open(Path::new(&settings.store_db_path), settings.store_tidy) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("cannot open store at {}: {e}", settings.store_db_path);
            return;
        }
    };

    let (notify_shutdown, _) = broadcast::channel::<()>(1);
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

    let (event_tx, event_rx) = mpsc::channel(settings.event_queue_depth);
    let mut cl_registry = ClRegistry::new();
    LoopbackCl::register(&mut cl_registry, event_tx.clone());

    let (mut daemon, handle) =
        match BundleDaemon::new(&settings, store, cl_registry, event_tx.clone(), event_rx) {
            Ok(parts) => parts,
            Err(e) => {
                error!("cannot construct the bundle daemon: {e}");
                return;
            }
        };

    // the durable state must be back before any convergence layer
    // starts feeding us
    if let Err(e) = daemon.recover().await {
        error!("recovery failed: {e}");
        return;
    }

    let timer_shutdown = Shutdown::new(notify_shutdown.subscribe());
    let timer_done = shutdown_complete_tx.clone();
    let timers = handle.timers.clone();
    tokio::spawn(async move {
        timers.run(event_tx, timer_shutdown).await;
        drop(timer_done);
    });

    let daemon_shutdown = notify_shutdown.subscribe();
    let daemon_done = shutdown_complete_tx.clone();
    let mut daemon_task = tokio::spawn(daemon.run(daemon_shutdown, daemon_done));

    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        res = &mut daemon_task => {
            match res {
                Ok(Err(e)) => error!("something bad happened with the bundle daemon: {e}. Aborting..."),
                Ok(Ok(())) => info!("bundle daemon finished"),
                Err(e) => error!("bundle daemon task died: {e}"),
            }
        }
        _ = ctrl_c => {
            info!("Shutting down");
        }
    }

    // Stolen from: https://github.com/tokio-rs/mini-redis/blob/master/src/server.rs
    // When `notify_shutdown` is dropped, all tasks which have `subscribe`d will
    // receive the shutdown signal and can exit
    drop(notify_shutdown);
    // Drop final `Sender` so the `Receiver` below can complete
    drop(shutdown_complete_tx);

    // Wait for all tasks to finish processing. When every task drops
    // its `Sender`, the `mpsc` channel closes and `recv()` returns
    // `None`.
    let _ = shutdown_complete_rx.recv().await;

    info!("All done, see you");
}
