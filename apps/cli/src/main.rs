//! `opsline`: browse, summarize and purge captured events.

mod cli;
mod commands;
mod render;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use opsline::config::{Settings, StoreBackend, StoreSettings};
use opsline::open_store;

use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    match run(&Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(db) = &cli.db {
        settings.store = StoreSettings {
            backend: StoreBackend::Sqlite,
            path: Some(db.clone()),
        };
    }
    if settings.store.backend == StoreBackend::Memory {
        bail!("no event database configured; pass --db or set store.backend = \"sqlite\"");
    }
    Ok(settings)
}

fn run(cli: &Cli) -> Result<()> {
    let settings = settings(cli)?;
    opsline::logging::init(&settings.log)?;

    let store = open_store(&settings.store).context("opening event database")?;
    let store = store.as_ref();
    let mut out = io::stdout().lock();

    match &cli.command {
        Command::Events(args) => commands::events(store, args, &mut out)?,
        Command::Show(args) => commands::show(store, args, &mut out)?,
        Command::Stats(args) => commands::stats(store, args, &mut out)?,
        Command::Purge(args) => commands::purge(store, args, &settings.to_config(), &mut out)?,
        Command::Clear(args) => commands::clear(store, args, &mut out)?,
    }
    out.flush()?;
    Ok(())
}
