// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{Context as _, Error};
use argh::FromArgs;
use futures::lock::Mutex;
use omaha_update_client::{
    service::OmahaService,
    state_machine::{self, StateMachineBuilder, UpdateStatus, PREF_NAMESPACE},
    time::StandardTimeSource,
};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;

mod configuration;
mod delegate;
mod http_request;
mod storage;
mod timer;

use configuration::Config;
use delegate::HostDelegate;
use http_request::HyperHttpRequest;
use storage::FileStorage;

#[derive(Debug, FromArgs)]
/// Reports this installation to an Omaha server and checks it for updates.
struct Args {
    #[argh(option, short = 'c', default = "PathBuf::from(\"/etc/omaha-update-service/config.json\")")]
    /// path to the JSON product configuration
    config: PathBuf,
    #[argh(option, short = 's', default = "PathBuf::from(\"/var/lib/omaha-update-service/state.json\")")]
    /// path to the file that keeps the client's state between runs
    storage: PathBuf,
    #[argh(switch, short = 'v')]
    /// log verbosely
    verbose: bool,
    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Check(CheckCommand),
    Status(StatusCommand),
}

#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run", description = "run the service until nothing is left to do")]
struct RunCommand {
    #[argh(switch)]
    /// don't treat the application as being in use: only pending requests are sent
    idle: bool,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "check", description = "check for an update right now")]
struct CheckCommand {}

#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "status", description = "print the persisted client state")]
struct StatusCommand {}

fn main() -> Result<(), Error> {
    let args: Args = argh::from_env();
    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().compact().with_max_level(level).init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Error creating runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<(), Error> {
    let storage = FileStorage::open(&args.storage)
        .with_context(|| format!("Failed to open storage {}", args.storage.display()))?;
    let storage = Rc::new(Mutex::new(storage));

    if let Command::Status(_) = args.command {
        return print_status(&storage).await;
    }

    let config = Config::load(&args.config)?;
    let version = config.version().context("Failed to get version")?;
    info!("Starting omaha update service, version {}", version);

    let app_in_use = match &args.command {
        Command::Run(RunCommand { idle }) => !idle,
        _ => false,
    };
    let device_config = if config.official_build {
        Some(config.device_config(version))
    } else {
        info!("Unofficial build, no requests will be made");
        None
    };
    let delegate = HostDelegate::new(
        storage.clone(),
        StandardTimeSource,
        device_config,
        config.in_system_image,
        app_in_use,
    );
    let next_wakeup = delegate.next_wakeup();
    let state_machine = StateMachineBuilder::new(delegate, HyperHttpRequest::new(), storage)
        .disabled(config.disabled)
        .build();
    let service = OmahaService::new(state_machine, config.official_build);

    match args.command {
        Command::Run(_) => {
            service.serve(&mut timer::TokioTimer, || next_wakeup.take()).await;
            Ok(())
        }
        Command::Check(_) => {
            let status = service.check_for_updates().await;
            println!("{}", describe(status));
            Ok(())
        }
        Command::Status(_) => Ok(()),
    }
}

fn describe(status: UpdateStatus) -> &'static str {
    match status {
        UpdateStatus::Updated => "up to date",
        UpdateStatus::Outdated => "update available",
        UpdateStatus::Offline => "offline",
        UpdateStatus::Failed => "check failed",
    }
}

async fn print_status(storage: &Rc<Mutex<FileStorage>>) -> Result<(), Error> {
    let storage = storage.lock().await;
    println!("storage: {}", storage.path().display());
    println!("probably fresh install: {}", state_machine::is_probably_fresh_install(&*storage).await);
    let prefix = format!("{}.", PREF_NAMESPACE);
    for (key, value) in storage.entries().filter(|(key, _)| key.starts_with(&prefix)) {
        println!("{} = {}", &key[prefix.len()..], value);
    }
    Ok(())
}
