use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::Transaction;

/// Value of `on_change_callback` meaning the wallet listens through the
/// interactive popup instead of an HTTP endpoint.
pub const POST_MESSAGE: &str = "postMessage";

/// Posts the transaction to the wallet's `on_change_callback` after a status
/// change. Delivery is best effort.
#[derive(Clone)]
pub struct CallbackNotifier {
    client: Client,
}

impl CallbackNotifier {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Returns whether the callback endpoint accepted the update.
    pub async fn notify(&self, tx: &Transaction) -> bool {
        let Some(url) = tx.on_change_callback.as_deref() else {
            return false;
        };
        if url == POST_MESSAGE {
            return false;
        }

        let result = self
            .client
            .post(url)
            .json(&json!({ "transaction": tx }))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                debug!(transaction_id = %tx.id, status = %tx.status, "Delivered status callback");
                true
            }
            Err(e) => {
                warn!(
                    transaction_id = %tx.id,
                    callback = %url,
                    error = %e,
                    "Status callback failed"
                );
                false
            }
        }
    }
}
