// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Logging setup for the test driver.
//!
//! Levels come from `RUST_LOG` and can be flipped at runtime while a long
//! suite is in flight:
//!
//! - `SIGUSR1` sets the level to info.
//! - `SIGUSR2` sets the level to debug (every remote command is logged).

use tokio::signal::unix::{signal, SignalKind};
pub use tracing;
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// The filter used when `RUST_LOG` is unset. Lifecycle transitions are
/// info-level, so a default run still shows setup/teardown progress.
const DEFAULT_FILTER: &str = "info";

/// Initialize the subscriber and the signal-driven level reload.
///
/// Must be called from within a tokio runtime.
pub fn init() {
    let builder = Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_filter_reloading();

    let handle = builder.reload_handle();
    builder.try_init().expect("Could not init tracing subscriber");

    let handle2 = handle.clone();

    tokio::spawn(async move {
        let mut stream = signal(SignalKind::user_defined1()).expect("Could not listen to SIGUSR1");

        while stream.recv().await.is_some() {
            let _ = handle2.reload("info");
        }
    });

    tokio::spawn(async move {
        let mut stream = signal(SignalKind::user_defined2()).expect("Could not listen to SIGUSR2");

        while stream.recv().await.is_some() {
            let _ = handle.reload("debug");
        }
    });
}
