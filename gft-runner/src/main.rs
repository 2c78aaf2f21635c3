// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! `gft` drives the registered end-to-end scenarios against a live
//! cluster described by a TOML config.

mod scenarios;

use gft_config::Config;
use gft_harness::run_suite;
use gft_ssh::SshExec;
use std::{path::PathBuf, sync::Arc};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "gft", about = "Functional test driver for gluster clusters")]
struct Opt {
    /// Cluster description; falls back to the GFT_CONFIG env var.
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, StructOpt)]
enum Cmd {
    /// List the registered scenarios.
    List,
    /// Run scenarios against the configured cluster.
    Run {
        /// Only scenarios whose id contains this substring.
        #[structopt(long)]
        filter: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    gft_tracing::init();

    let opt = Opt::from_args();

    let code = match run(opt).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("gft: {}", e);

            1
        }
    };

    std::process::exit(code);
}

async fn run(opt: Opt) -> Result<i32, Box<dyn std::error::Error>> {
    let registered = scenarios::all();

    match opt.cmd {
        Cmd::List => {
            for sc in &registered {
                let voltypes = sc
                    .volume_types
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let mounts = sc
                    .mount_types
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(",");

                println!("{}  [{}] x [{}]", sc.id, voltypes, mounts);
            }

            Ok(0)
        }
        Cmd::Run { filter } => {
            let config = match opt.config {
                Some(path) => Config::load(path)?,
                None => Config::from_env()?,
            };

            let exec = Arc::new(SshExec::new(&config.user, config.ssh_key.clone()));
            let config = Arc::new(config);

            let (reports, outcome) =
                run_suite(exec, config, &registered, filter.as_deref()).await;

            for r in &reports {
                println!("{}", serde_json::to_string(r)?);
            }

            tracing::info!(
                passed = outcome.passed,
                failed = outcome.failed,
                errored = outcome.errored,
                poisoned = outcome.poisoned,
                "suite finished"
            );

            Ok(outcome.exit_code())
        }
    }
}
