use std::collections::BTreeMap;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::created::{CreatedFilter, CreatedKey};
use crate::datetime::{format_utc, local_to_utc, parse_date, parse_offset_minutes, parse_time};
use crate::store::CommittedState;

pub const MAX_RESULT_WINDOW: usize = 1000;

const AGG_BUCKET_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub doc_count: u64,
}

impl Bucket {
    pub fn new(key: impl Into<String>, doc_count: u64) -> Self {
        Self {
            key: key.into(),
            doc_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregations {
    by_field: BTreeMap<String, Vec<Bucket>>,
}

impl Aggregations {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<Bucket>)>,
        K: Into<String>,
    {
        Self {
            by_field: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn from_response(response: &Value) -> anyhow::Result<Self> {
        let Some(aggs) = response.get("aggregations").and_then(Value::as_object) else {
            return Ok(Self::default());
        };
        let mut by_field = BTreeMap::new();
        for (field, raw) in aggs {
            if raw.get("buckets").is_none() {
                trace!(field = %field, "aggregation has no buckets; skipping");
                continue;
            }
            let list: BucketList = serde_json::from_value(raw.clone())
                .with_context(|| format!("invalid buckets for aggregation {field}"))?;
            by_field.insert(field.clone(), list.buckets);
        }
        Ok(Self { by_field })
    }

    pub fn buckets(&self, field: &str) -> &[Bucket] {
        self.by_field.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub page_size: usize,
    pub post_filter: bool,
    pub agg_fields: BTreeMap<String, String>,
    pub agg_requests: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page_size: 25,
            post_filter: false,
            agg_fields: BTreeMap::new(),
            agg_requests: vec![],
        }
    }
}

impl SearchOptions {
    fn index_field<'a>(&'a self, field: &'a str) -> &'a str {
        self.agg_fields.get(field).map(String::as_str).unwrap_or(field)
    }
}

#[tracing::instrument(skip(state, opts))]
pub fn build_search(state: &CommittedState, from: usize, opts: &SearchOptions) -> anyhow::Result<Value> {
    if from >= MAX_RESULT_WINDOW {
        return Err(anyhow!("page limit exceeded: from={from} (max {MAX_RESULT_WINDOW})"));
    }

    let mut must: Vec<Value> = Vec::new();
    if let Some(q) = state.query.as_deref().filter(|q| !q.trim().is_empty()) {
        must.push(query_string(q, "AND"));
    }

    let mut filters: Vec<Value> = state
        .active
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(field, values)| json!({ "terms": { opts.index_field(field): values } }))
        .collect();
    if let Some(range) = versioncreated_range(&state.created)? {
        filters.push(range);
    }

    let mut source = serde_json::Map::new();
    if opts.post_filter {
        if !filters.is_empty() {
            source.insert("post_filter".to_string(), json!({ "bool": { "must": filters } }));
        }
    } else {
        must.extend(filters);
    }

    source.insert(
        "query".to_string(),
        json!({ "bool": { "must": must, "must_not": [], "should": [] } }),
    );
    source.insert("sort".to_string(), json!([{ "versioncreated": "desc" }]));
    source.insert("size".to_string(), json!(opts.page_size));
    source.insert("from".to_string(), json!(from));

    if from == 0 && !opts.agg_requests.is_empty() {
        let aggs: serde_json::Map<String, Value> = opts
            .agg_requests
            .iter()
            .map(|field| {
                (
                    field.clone(),
                    json!({ "terms": { "field": opts.index_field(field), "size": AGG_BUCKET_SIZE } }),
                )
            })
            .collect();
        source.insert("aggs".to_string(), Value::Object(aggs));
    }

    debug!(from, post_filter = opts.post_filter, "built search body");
    Ok(Value::Object(source))
}

fn query_string(query: &str, default_operator: &str) -> Value {
    json!({
        "query_string": {
            "query": query,
            "default_operator": default_operator,
            "analyze_wildcard": false,
            "lenient": true
        }
    })
}

/// `gte` starts at `created_from` (at `created_from_time`, midnight by
/// default), `lte` ends at the last second of `created_to`. Both bounds
/// are local to the client and shifted by `timezone_offset`.
pub fn versioncreated_range(created: &CreatedFilter) -> anyhow::Result<Option<Value>> {
    let from = created.get(CreatedKey::From);
    let to = created.get(CreatedKey::To);
    if from.is_none() && to.is_none() {
        return Ok(None);
    }

    let offset = parse_offset_minutes(created.get(CreatedKey::TimezoneOffset))?;
    let mut range = serde_json::Map::new();
    if let Some(from) = from {
        let time = parse_time(created.get(CreatedKey::FromTime).unwrap_or("00:00:00"))?;
        let ts = local_to_utc(parse_date(from)?, time, offset)?;
        range.insert("gte".to_string(), json!(format_utc(ts)));
    }
    if let Some(to) = to {
        let ts = local_to_utc(parse_date(to)?, parse_time("23:59:59")?, offset)?;
        range.insert("lte".to_string(), json!(format_utc(ts)));
    }
    Ok(Some(json!({ "range": { "versioncreated": range } })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::created::CreatedPatch;
    use crate::filter::ActiveFilter;

    fn state_with_genre() -> CommittedState {
        let mut active = ActiveFilter::new();
        active.toggle("sttgenre", ["Sport", "News"], false);
        CommittedState {
            active,
            ..Default::default()
        }
    }

    #[test]
    fn filters_become_terms_in_must() {
        let mut opts = SearchOptions::default();
        opts.agg_fields
            .insert("sttgenre".to_string(), "sttgenre.keyword".to_string());

        let body = build_search(&state_with_genre(), 0, &opts).unwrap();
        assert_eq!(
            body["query"]["bool"]["must"],
            json!([{ "terms": { "sttgenre.keyword": ["Sport", "News"] } }])
        );
        assert!(body.get("post_filter").is_none());
        assert!(body.get("aggs").is_none());
        assert_eq!(body["size"], json!(25));
    }

    #[test]
    fn post_filter_mode_moves_filters_out_of_query() {
        let opts = SearchOptions {
            post_filter: true,
            agg_requests: vec!["sttgenre".to_string()],
            ..Default::default()
        };
        let mut state = state_with_genre();
        state.query = Some("hockey".to_string());

        let body = build_search(&state, 0, &opts).unwrap();
        assert_eq!(body["query"]["bool"]["must"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            body["post_filter"]["bool"]["must"][0],
            json!({ "terms": { "sttgenre": ["Sport", "News"] } })
        );
        assert_eq!(body["aggs"]["sttgenre"]["terms"]["size"], json!(50));

        let page_two = build_search(&state, 25, &opts).unwrap();
        assert!(page_two.get("aggs").is_none());
    }

    #[test]
    fn deep_pages_are_rejected() {
        assert!(build_search(&CommittedState::default(), 1000, &SearchOptions::default()).is_err());
    }

    #[test]
    fn created_range_uses_offset() {
        let created = CreatedFilter::new().merged(
            &CreatedPatch::new()
                .set(CreatedKey::From, "2020-01-01")
                .set(CreatedKey::To, "2020-01-31")
                .set(CreatedKey::TimezoneOffset, "-60"),
        );
        let range = versioncreated_range(&created).unwrap().unwrap();
        assert_eq!(
            range,
            json!({ "range": { "versioncreated": {
                "gte": "2019-12-31T23:00:00+0000",
                "lte": "2020-01-31T22:59:59+0000"
            } } })
        );

        assert!(versioncreated_range(&CreatedFilter::new()).unwrap().is_none());
    }

    #[test]
    fn huge_offset_from_url_is_rejected() {
        let state =
            crate::url_state::from_url("?created_from=2020-01-01&timezone_offset=1000000000000")
                .unwrap();
        let err = build_search(&state, 0, &SearchOptions::default()).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let created = CreatedFilter::new().merged(
            &CreatedPatch::new()
                .set(CreatedKey::To, "2020-01-31")
                .set(CreatedKey::TimezoneOffset, "-1500"),
        );
        assert!(versioncreated_range(&created).is_err());
    }

    #[test]
    fn reads_buckets_from_response() {
        let response = json!({
            "_items": [],
            "aggregations": {
                "sttgenre": { "buckets": [{ "key": "Sport", "doc_count": 4 }] },
                "total": { "value": 9 }
            }
        });
        let aggs = Aggregations::from_response(&response).unwrap();
        assert_eq!(aggs.buckets("sttgenre"), [Bucket::new("Sport", 4)]);
        assert!(aggs.buckets("total").is_empty());
    }
}
