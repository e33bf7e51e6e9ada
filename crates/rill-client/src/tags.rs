//! Tag-query metric search.

use rill_net::RequestContext;
use serde::Deserialize;

use crate::client::{RillClient, Target};
use crate::error::ClientError;

/// Advisory cap on result-set size, honored best-effort by the store.
const ADVISORY_LIMIT_HEADER: &str = "X-Snowth-Advisory-Limit";
/// Total matching metrics, which can exceed the returned page.
const RESULT_COUNT_HEADER: &str = "X-Snowth-Search-Result-Count";

/// Options for [`RillClient::find_tags`].
#[derive(Debug, Clone, Default)]
pub struct FindTagsOptions {
    /// Advisory result limit; `None` lets the store decide.
    pub limit: Option<i64>,
    /// Only metrics active at or after this unix second.
    pub activity_start_secs: Option<i64>,
    /// Only metrics active at or before this unix second.
    pub activity_end_secs: Option<i64>,
    /// Include each metric's latest values in the response.
    pub latest: bool,
    /// Return only the match count, no items.
    pub count_only: bool,
}

/// Latest values recorded for a matched metric, one list per value kind.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FindTagsLatest {
    /// Latest numeric points, `[timestamp_ms, value]` pairs.
    #[serde(default)]
    pub numeric: Vec<(i64, f64)>,
    /// Latest text points, `[timestamp_ms, value]` pairs.
    #[serde(default)]
    pub text: Vec<(i64, String)>,
    /// Latest histogram points, `[timestamp_ms, base64]` pairs.
    #[serde(default)]
    pub histogram: Vec<(i64, String)>,
}

/// One metric matched by a tag query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FindTagsItem {
    /// Owning stream UUID.
    pub uuid: String,
    /// Canonical metric name, including its tags.
    pub metric_name: String,
    /// Account the metric belongs to.
    pub account_id: i64,
    /// Metric kind as reported by the store.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Search category, when the store assigns one.
    #[serde(default)]
    pub category: Option<String>,
    /// Latest values, present when requested.
    #[serde(default)]
    pub latest: Option<FindTagsLatest>,
}

/// Result of a tag query.
#[derive(Debug, Clone, PartialEq)]
pub struct FindTagsResult {
    /// Matched metrics (empty for count-only queries).
    pub items: Vec<FindTagsItem>,
    /// Total matches, which can exceed the returned page.
    pub count: i64,
}

/// Body of a count-only tag query.
#[derive(Debug, Deserialize)]
struct FindTagsCount {
    count: i64,
}

impl RillClient {
    /// Find metrics matching a tag query.
    ///
    /// Tag search is served from any node's index, so this targets the
    /// active set rather than the ring.
    pub async fn find_tags(
        &self,
        account_id: i64,
        query: &str,
        options: &FindTagsOptions,
        ctx: &RequestContext,
    ) -> Result<FindTagsResult, ClientError> {
        let mut params = url::form_urlencoded::Serializer::new(String::new());
        params.append_pair("query", query);
        if let Some(start) = options.activity_start_secs {
            params.append_pair("activity_start_secs", &start.to_string());
        }
        if let Some(end) = options.activity_end_secs {
            params.append_pair("activity_end_secs", &end.to_string());
        }
        if options.latest {
            params.append_pair("latest", "1");
        }
        if options.count_only {
            params.append_pair("count_only", "1");
        }
        let path = format!("/find/{account_id}/tags?{}", params.finish());

        let mut headers = Vec::new();
        if let Some(limit) = options.limit {
            headers.push((ADVISORY_LIMIT_HEADER.to_string(), limit.to_string()));
        }

        let response = self
            .execute(Target::AnyActive, "GET", &path, None, &headers, ctx)
            .await?;

        let header_count = response
            .header(RESULT_COUNT_HEADER)
            .and_then(|v| v.parse().ok());

        if options.count_only {
            // Count-only responses carry the count in the body; the header
            // stands in when the body is not the count document.
            let count = rill_net::decode_json::<FindTagsCount>(&response.body)
                .map(|c| c.count)
                .or_else(|e| header_count.ok_or(e))?;
            return Ok(FindTagsResult {
                items: Vec::new(),
                count,
            });
        }

        let items: Vec<FindTagsItem> = rill_net::decode_json(&response.body)?;
        let count = header_count.unwrap_or(items.len() as i64);
        Ok(FindTagsResult { items, count })
    }
}
