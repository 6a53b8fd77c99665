use std::collections::BTreeMap;

use anyhow::{Context, anyhow};
use tracing::{debug, trace};
use url::Url;
use url::form_urlencoded;

use crate::created::{CreatedFilter, CreatedKey};
use crate::filter::ActiveFilter;
use crate::store::CommittedState;

const QUERY_PARAM: &str = "q";
const FILTER_PARAM: &str = "filter";

/// Query string for the committed state: `q`, `filter` as JSON, and one
/// parameter per created-date key. Empty parts are left out.
pub fn encode_query(state: &CommittedState) -> anyhow::Result<String> {
    let mut out = form_urlencoded::Serializer::new(String::new());
    if let Some(q) = state.query.as_deref().filter(|q| !q.is_empty()) {
        out.append_pair(QUERY_PARAM, q);
    }
    if !state.active.is_empty() {
        let json = serde_json::to_string(&state.active).context("failed to encode filter")?;
        out.append_pair(FILTER_PARAM, &json);
    }
    for (key, value) in state.created.iter() {
        out.append_pair(key.as_key(), value);
    }
    Ok(out.finish())
}

pub fn to_url(base: &str, state: &CommittedState) -> anyhow::Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid base url: {base}"))?;
    let query = encode_query(state)?;
    url.set_query(if query.is_empty() { None } else { Some(&query) });
    debug!(url = %url, "encoded committed state");
    Ok(url)
}

pub fn from_url(raw: &str) -> anyhow::Result<CommittedState> {
    match Url::parse(raw) {
        Ok(url) => decode_query(url.query().unwrap_or("")),
        Err(_) => decode_query(raw.trim_start_matches('?')),
    }
}

pub fn decode_query(query: &str) -> anyhow::Result<CommittedState> {
    let mut state = CommittedState::default();
    let mut created = BTreeMap::new();

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            QUERY_PARAM => {
                state.query = (!value.is_empty()).then(|| value.into_owned());
            }
            FILTER_PARAM => {
                state.active = parse_filter_param(&value)?;
            }
            other => match CreatedKey::from_key(other) {
                Some(created_key) if other == created_key.as_key() => {
                    created.insert(other.to_string(), value.into_owned());
                }
                _ => trace!(param = other, "ignoring unrelated url parameter"),
            },
        }
    }

    state.created = CreatedFilter::from(created);
    Ok(state)
}

fn parse_filter_param(raw: &str) -> anyhow::Result<ActiveFilter> {
    if raw.trim().is_empty() {
        return Ok(ActiveFilter::new());
    }
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid filter parameter: {err}"))
}
