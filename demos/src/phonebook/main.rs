// Copyright 2026 hibernate Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A persistent phonebook shell.
//!
//! Contacts live in the store and are activated on demand, at most `--capacity` of them stay in memory.

mod command;
mod servant;

use std::{io::BufRead, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use hibernate::{Context, EvictionConfig, EvictorConfig, FsStoreBuilder, RequestLocator};
use tokio::sync::mpsc;

use crate::{
    command::{Command, Line, Shell},
    servant::{activated, PhoneFactory},
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Directory of the object store.
    #[arg(long, default_value = "phonebook.db")]
    dir: PathBuf,

    /// Max servants in memory.
    #[arg(long, default_value_t = 64)]
    capacity: usize,

    /// Period of the background flush, e.g. `5s`. No background flush if unset.
    #[arg(long)]
    flush_interval: Option<humantime::Duration>,

    /// Eviction policy, `lru` or `fifo`.
    #[arg(long, default_value = "lru")]
    eviction: EvictionConfig,

    /// Skip fsync after each write.
    #[arg(long, default_value_t = false)]
    no_sync: bool,
}

fn init_logger() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_line_number(true))
        .with(EnvFilter::from_default_env())
        .init();
}

/// Read stdin on a plain thread, a pending read must not hold the runtime at exit.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let args = Args::parse();
    tracing::info!(?args, "[phonebook]: start");

    let store = Arc::new(FsStoreBuilder::new(&args.dir).with_sync(!args.no_sync).build()?);
    let context = Context::new(store)?;
    let config = EvictorConfig {
        name: "phonebook".to_string(),
        capacity: args.capacity,
        eviction: args.eviction,
        flush_interval: args.flush_interval.map(Into::into),
    };
    let evictor = context
        .evictor_builder(config)
        .with_initializer(activated)
        .build(context.store().clone(), PhoneFactory)?;
    let shell = Shell::new(RequestLocator::new(evictor));

    {
        let shell = shell.clone();
        tokio::task::spawn_blocking(move || shell.ensure_root()).await??;
    }

    println!("phonebook ready, type `help` for the commands");
    let mut lines = stdin_lines();
    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[phonebook]: interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match Line::try_parse_from(line.split_whitespace()) {
            Ok(line) => line.command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if matches!(command, Command::Quit) {
            break;
        }

        // Dispatches block on the store, keep them off the runtime workers.
        let s = shell.clone();
        match tokio::task::spawn_blocking(move || s.execute(command)).await? {
            Ok(out) => println!("{out}"),
            Err(e) => println!("error: {e:#}"),
        }
    }

    tokio::task::spawn_blocking(move || shell.deactivate()).await??;
    context.shutdown();
    tracing::info!("[phonebook]: bye");
    Ok(())
}
