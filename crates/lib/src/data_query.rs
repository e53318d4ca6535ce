//! Data-query turn: forward the question to the SQL translator and deliver the rendered result.

use crate::delivery::Delivery;
use crate::sql::SqlTranslator;
use std::sync::Arc;

pub const DATA_DISABLED_MESSAGE: &str = "Data queries are not configured on this server.";

pub struct DataProcessor {
    translator: Option<Arc<dyn SqlTranslator>>,
    delivery: Arc<Delivery>,
}

impl DataProcessor {
    /// `translator` is None when no database is configured.
    pub fn new(translator: Option<Arc<dyn SqlTranslator>>, delivery: Arc<Delivery>) -> Self {
        Self {
            translator,
            delivery,
        }
    }

    /// Answer `question` for `sender_id`. No conversation state is read or written.
    pub async fn handle(&self, sender_id: &str, question: &str) {
        let Some(ref translator) = self.translator else {
            log::warn!("data query from {} ignored: no database configured", sender_id);
            self.delivery.deliver(sender_id, DATA_DISABLED_MESSAGE).await;
            return;
        };
        let outcome = translator.translate_and_execute(question).await;
        self.delivery.deliver(sender_id, &outcome.to_string()).await;
    }
}
