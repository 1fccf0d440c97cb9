//! The analytics query behind the queue snapshot.

/// Render the query returning one `(status, length, labels)` row per
/// distinct label set and latest status.
///
/// Each job is collapsed to its latest status; only self-hosted jobs that
/// carry a known pool label, started within `lookback_days`, and are still
/// `in_progress` or `queued` are counted. `database` and `table` must be
/// plain identifiers (the config validator enforces this); pool labels are
/// quoted.
pub fn build_queue_query(
    database: &str,
    table: &str,
    known_pools: &[String],
    lookback_days: u32,
) -> String {
    let labels = known_pools
        .iter()
        .map(|l| quote(l))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT
    last_status AS status,
    toUInt32(count()) AS length,
    labels
FROM
(
    SELECT
        arraySort(groupArray(status))[-1] AS last_status,
        labels,
        id,
        html_url
    FROM {database}.{table}
    WHERE has(labels, 'self-hosted')
        AND hasAny([{labels}], labels)
        AND started_at > now() - INTERVAL {lookback_days} DAY
    GROUP BY ALL
    HAVING last_status IN ('in_progress', 'queued')
)
GROUP BY ALL
ORDER BY labels, last_status"
    )
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
