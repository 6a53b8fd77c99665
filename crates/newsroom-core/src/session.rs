use std::io::{BufRead, Write};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::controller::{DateSelector, DraftStatus, FilterController, ItemFetcher};
use crate::created::CreatedPatch;
use crate::datetime::Granularity;
use crate::query::{Aggregations, SearchOptions, build_search};
use crate::store::{CommittedState, CommittedStore};

#[derive(Debug, Clone)]
pub struct QueryFetcher {
    opts: SearchOptions,
    pub sent: usize,
    pub last: Option<Value>,
}

impl QueryFetcher {
    pub fn new(opts: SearchOptions) -> Self {
        Self {
            opts,
            sent: 0,
            last: None,
        }
    }
}

impl ItemFetcher for QueryFetcher {
    fn fetch_items(&mut self, committed: &CommittedState) {
        self.sent += 1;
        match build_search(committed, 0, &self.opts) {
            Ok(body) => {
                info!(request = self.sent, "fetching items");
                self.last = Some(body);
            }
            Err(err) => {
                warn!(error = %err, "could not build search request");
                self.last = None;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct LogDateSelector;

impl DateSelector for LogDateSelector {
    fn select_date(&mut self, date: DateTime<Utc>, granularity: Granularity) {
        info!(date = %date.format("%Y-%m-%d"), granularity = granularity.as_key(), "selected date");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Toggle { field: String, values: Vec<String> },
    Only { field: String, value: String },
    Created(Vec<String>),
    Group(String),
    Show,
    Search,
    Reset,
    Quit,
}

fn parse_line(line: &str) -> anyhow::Result<Option<Line>> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    if cmd.starts_with('#') {
        return Ok(None);
    }
    let rest: Vec<String> = words.map(str::to_string).collect();

    let parsed = match (cmd, rest.as_slice()) {
        ("toggle", [field, values @ ..]) if !values.is_empty() => Line::Toggle {
            field: field.clone(),
            values: values.to_vec(),
        },
        ("only", [field, value]) => Line::Only {
            field: field.clone(),
            value: value.clone(),
        },
        ("created", assignments) if !assignments.is_empty() => Line::Created(assignments.to_vec()),
        ("group", [field]) => Line::Group(field.clone()),
        ("show", []) => Line::Show,
        ("search", []) => Line::Search,
        ("reset", []) => Line::Reset,
        ("quit" | "exit", []) => Line::Quit,
        _ => anyhow::bail!("unrecognized command: {}", line.trim()),
    };
    Ok(Some(parsed))
}

/// Reads draft commands until `quit` or end of input. Bad lines are
/// reported and skipped; store failures end the session.
#[tracing::instrument(skip_all)]
pub fn run_session<S, R, W>(
    ctl: &mut FilterController<S, QueryFetcher>,
    aggs: &Aggregations,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: CommittedStore,
    R: BufRead,
    W: Write,
{
    for line in input.lines() {
        let line = line?;
        let parsed = match parse_line(&line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(err) => {
                writeln!(out, "error: {err}")?;
                continue;
            }
        };
        debug!(?parsed, "session command");

        match parsed {
            Line::Toggle { field, values } => ctl.update_filter(&field, values, false),
            Line::Only { field, value } => ctl.update_filter(&field, value, true),
            Line::Created(assignments) => {
                let patch = assignments
                    .iter()
                    .try_fold(CreatedPatch::new(), |patch, raw| patch.parse_assignment(raw));
                match patch {
                    Ok(patch) => ctl.set_created_filter(&patch),
                    Err(err) => writeln!(out, "error: {err}")?,
                }
            }
            Line::Group(field) => {
                if ctl.toggle_group_open(&field).is_none() {
                    writeln!(out, "error: no filter group for {field}")?;
                }
            }
            Line::Show => render(ctl, aggs, out)?,
            Line::Search => {
                ctl.commit_and_search()?;
                print_request(ctl.fetcher(), out)?;
            }
            Line::Reset => {
                ctl.reset_all()?;
                print_request(ctl.fetcher(), out)?;
            }
            Line::Quit => break,
        }
    }
    Ok(())
}

fn render<S, W>(ctl: &FilterController<S, QueryFetcher>, aggs: &Aggregations, out: &mut W) -> anyhow::Result<()>
where
    S: CommittedStore,
    W: Write,
{
    let status = match ctl.status() {
        DraftStatus::Clean => "clean",
        DraftStatus::Dirty => "dirty",
    };
    let flags = ctl.panel_flags();
    writeln!(out, "status: {status}")?;

    for view in ctl.group_views(aggs) {
        let marker = if view.group.open { "-" } else { "+" };
        let selected = view.active.values(&view.group.field).join(", ");
        writeln!(out, "[{marker}] {} ({}): {selected}", view.group.label, view.group.field)?;
        if view.group.open {
            for bucket in view.buckets {
                let check = if view.is_selected(&bucket.key) { "x" } else { " " };
                writeln!(out, "    [{check}] {} ({})", bucket.key, bucket.doc_count)?;
            }
        }
    }

    let created: Vec<String> = ctl
        .created_view()
        .created
        .iter()
        .map(|(k, v)| format!("{}={v}", k.as_key()))
        .collect();
    writeln!(out, "created: {}", created.join(" "))?;

    if flags.reset_available || flags.results_filtered {
        writeln!(out, "actions: search reset")?;
    }
    Ok(())
}

fn print_request<W: Write>(fetcher: &QueryFetcher, out: &mut W) -> anyhow::Result<()> {
    if let Some(body) = &fetcher.last {
        writeln!(out, "{}", serde_json::to_string(body)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_lines() {
        assert_eq!(parse_line("  ").unwrap(), None);
        assert_eq!(parse_line("# note").unwrap(), None);
        assert_eq!(
            parse_line("toggle sttgenre Sport News").unwrap(),
            Some(Line::Toggle {
                field: "sttgenre".to_string(),
                values: vec!["Sport".to_string(), "News".to_string()],
            })
        );
        assert_eq!(parse_line("exit").unwrap(), Some(Line::Quit));
        assert!(parse_line("toggle sttgenre").is_err());
        assert!(parse_line("only a b c").is_err());
    }
}
