//! Rolled-up value reads.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rill_net::RequestContext;
use serde::Deserialize;

use crate::client::{RillClient, Target};
use crate::error::ClientError;

/// One rolled-up data point.
///
/// The store serves these as `[timestamp, value]` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "(i64, f64)")]
pub struct RollupValue {
    /// Start of the rollup window, unix seconds.
    pub timestamp: i64,
    /// Rolled-up value for the window.
    pub value: f64,
}

impl From<(i64, f64)> for RollupValue {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

/// Clamp a timestamp to the start of its rollup window.
fn align(ts: SystemTime, span_secs: i64) -> i64 {
    let unix = ts
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    unix - unix.rem_euclid(span_secs)
}

impl RillClient {
    /// Read rolled-up values for one metric.
    ///
    /// `period` selects the rollup span; `start` and `end` are clamped to
    /// window boundaries so the store returns whole windows. Routed to the
    /// metric's owning nodes via the ring.
    pub async fn read_rollup_values(
        &self,
        metric_id: &str,
        metric: &str,
        period: Duration,
        start: SystemTime,
        end: SystemTime,
        ctx: &RequestContext,
    ) -> Result<Vec<RollupValue>, ClientError> {
        let span = (period.as_secs().max(1)) as i64;
        let start_ts = align(start, span);
        let end_ts = align(end, span);

        let metric: String = url::form_urlencoded::byte_serialize(metric.as_bytes()).collect();
        let path = format!(
            "/rollup/{metric_id}/{metric}?start_ts={start_ts}&end_ts={end_ts}&rollup_span={span}s"
        );
        self.get_json(Target::Key(metric_id.to_string()), &path, ctx)
            .await
    }
}
