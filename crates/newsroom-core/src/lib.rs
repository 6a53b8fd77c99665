pub mod cli;
pub mod config;
pub mod controller;
pub mod created;
pub mod datetime;
pub mod filter;
pub mod groups;
pub mod query;
pub mod session;
pub mod store;
pub mod url_state;

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::cli::Command;
use crate::controller::FilterController;
use crate::query::{Aggregations, build_search};
use crate::session::{LogDateSelector, QueryFetcher, run_session};
use crate::store::{CommittedStore, FileStore};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting newsroom CLI"
    );

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;
    let mut store = FileStore::open(&data_dir)
        .with_context(|| format!("failed to open committed state in {}", data_dir.display()))?;

    let opts = cfg.search_options()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Session { aggs } => {
            let aggs = match aggs {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let response: serde_json::Value = serde_json::from_str(&text)
                        .with_context(|| format!("invalid search response in {}", path.display()))?;
                    Aggregations::from_response(&response)?
                }
                None => Aggregations::default(),
            };
            let mut ctl = FilterController::mount(store, QueryFetcher::new(opts), cfg.groups()?)
                .with_date_selector(Box::new(LogDateSelector));
            run_session(&mut ctl, &aggs, io::stdin().lock(), &mut out)?;
            debug!(requests = ctl.fetcher().sent, "session finished");
        }
        Command::Url { base } => {
            let base = base
                .or_else(|| cfg.get("url.base"))
                .context("url.base is not configured")?;
            let url = url_state::to_url(&base, store.committed())?;
            writeln!(out, "{url}")?;
        }
        Command::Load { url } => {
            let mut state = url_state::from_url(&url)?;
            state.active_date = store.active_date();
            store.replace(state)?;
            info!(filtered = store.results_filtered(), "loaded committed state from url");
        }
        Command::Query { from } => {
            let body = build_search(store.committed(), from, &opts)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
        }
    }

    info!("done");
    Ok(())
}
