use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::supabase::SupabaseClient;

/// Subscribe-and-replace live query. The store has no push channel of its
/// own, so the subscription re-runs the query on an interval and publishes
/// a full snapshot whenever the result set changes; consumers replace their
/// materialized list wholesale, no incremental patching.
///
/// The polling task stops when every receiver has been dropped.
pub fn subscribe(
    client: Arc<SupabaseClient>,
    path: String,
    auth_token: String,
    interval: Duration,
) -> watch::Receiver<Vec<Value>> {
    let (tx, rx) = watch::channel(Vec::new());

    tokio::spawn(async move {
        loop {
            match client
                .request::<Vec<Value>>(Method::GET, &path, Some(&auth_token), None)
                .await
            {
                Ok(rows) => {
                    let changed = *tx.borrow() != rows;
                    if changed && tx.send(rows).is_err() {
                        break;
                    }
                }
                // A failed poll is a missed tick, not the end of the
                // subscription; the previous snapshot stays current.
                Err(e) => warn!("live query poll failed for {}: {}", path, e),
            }

            if tx.is_closed() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
        debug!("live query for {} stopped", path);
    });

    rx
}
