//! Dispatcher: classify a validated event and run the matching processor as a supervised
//! background task.
//!
//! Callers do not wait for processing; the webhook response is sent as soon as `dispatch`
//! returns.

use crate::agent::GeneralProcessor;
use crate::data_query::DataProcessor;
use crate::event::{InboundEvent, MessageContent};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Prefix marking a data query (case-sensitive).
pub const DATA_PREFIX: &str = "data: ";

/// Processing path for a text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Data query with the prefix removed.
    Data(String),
    /// General chat with the full text.
    General(String),
}

pub fn classify(text: &str) -> Route {
    match text.strip_prefix(DATA_PREFIX) {
        Some(question) => Route::Data(question.to_string()),
        None => Route::General(text.to_string()),
    }
}

/// Route for an event, or None when its message kind is not acted upon.
pub fn route(event: &InboundEvent) -> Option<Route> {
    match &event.message {
        MessageContent::Text { body } => Some(classify(body)),
        MessageContent::Reaction { .. } => None,
    }
}

/// Run `work` on its own task. Errors and panics are logged with `label`; nothing propagates.
pub fn spawn_supervised<F, E>(label: String, work: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::spawn(work).await {
            Ok(Ok(())) => log::debug!("{}: done", label),
            Ok(Err(e)) => log::warn!("{}: failed: {}", label, e),
            Err(e) if e.is_panic() => log::error!("{}: panicked", label),
            Err(_) => log::warn!("{}: cancelled", label),
        }
    })
}

pub struct Dispatcher {
    general: Arc<GeneralProcessor>,
    data: Arc<DataProcessor>,
}

impl Dispatcher {
    pub fn new(general: Arc<GeneralProcessor>, data: Arc<DataProcessor>) -> Self {
        Self { general, data }
    }

    /// Start processing `event` in the background. Returns the supervising task handle, or None
    /// when the event carries nothing to act on.
    pub fn dispatch(&self, event: InboundEvent) -> Option<JoinHandle<()>> {
        let route = route(&event)?;
        let sender = event.sender_id;
        let work_id = uuid::Uuid::new_v4();
        let handle = match route {
            Route::Data(question) => {
                let data = self.data.clone();
                let label = format!("data query {} from {}", work_id, sender);
                log::debug!("dispatch: {}", label);
                spawn_supervised(label, async move {
                    data.handle(&sender, &question).await;
                    Ok::<(), std::convert::Infallible>(())
                })
            }
            Route::General(text) => {
                let general = self.general.clone();
                let label = format!("general query {} from {}", work_id, sender);
                log::debug!("dispatch: {}", label);
                spawn_supervised(label, async move { general.handle(&sender, &text).await })
            }
        };
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Delivery;
    use crate::session::ConversationStore;
    use crate::sql::QueryOutcome;
    use crate::testing::{FixedTranslator, RecordingChannel, ScriptedBackend};

    fn event(message: MessageContent) -> InboundEvent {
        InboundEvent {
            sender_id: "111".to_string(),
            phone_uid: None,
            display_number: None,
            received_at: "1669233778".to_string(),
            message,
        }
    }

    fn text(body: &str) -> InboundEvent {
        event(MessageContent::Text {
            body: body.to_string(),
        })
    }

    #[test]
    fn data_prefix_is_exact_and_case_sensitive() {
        assert_eq!(
            classify("data: total sales by region"),
            Route::Data("total sales by region".to_string())
        );
        assert_eq!(classify("Data: x"), Route::General("Data: x".to_string()));
        assert_eq!(classify("data:x"), Route::General("data:x".to_string()));
        assert_eq!(classify(" data: x"), Route::General(" data: x".to_string()));
        assert_eq!(classify("data: "), Route::Data(String::new()));
    }

    #[test]
    fn reactions_are_not_routed() {
        let e = event(MessageContent::Reaction {
            message_id: "wamid.X".to_string(),
            emoji: "x".to_string(),
        });
        assert_eq!(route(&e), None);
    }

    struct Setup {
        dispatcher: Dispatcher,
        llm: Arc<ScriptedBackend>,
        translator: Arc<FixedTranslator>,
        channel: Arc<RecordingChannel>,
    }

    fn setup(replies: &[&str]) -> Setup {
        let channel = Arc::new(RecordingChannel::default());
        let delivery = Arc::new(Delivery::channel(channel.clone()));
        let llm = Arc::new(ScriptedBackend::new(replies.iter().copied()));
        let translator = Arc::new(FixedTranslator::new(QueryOutcome::Failed {
            error: "no db".to_string(),
        }));
        let general = Arc::new(GeneralProcessor::new(
            Arc::new(ConversationStore::default()),
            llm.clone(),
            delivery.clone(),
            10,
        ));
        let data = Arc::new(DataProcessor::new(Some(translator.clone()), delivery));
        Setup {
            dispatcher: Dispatcher::new(general, data),
            llm,
            translator,
            channel,
        }
    }

    #[tokio::test]
    async fn data_text_goes_to_data_path_only() {
        let s = setup(&[]);
        s.dispatcher
            .dispatch(text("data: total sales by region"))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(s.translator.questions().await, vec!["total sales by region"]);
        assert!(s.llm.prompts().await.is_empty());
        assert_eq!(s.channel.texts().await, vec!["Query failed: no db"]);
    }

    #[tokio::test]
    async fn other_text_goes_to_general_path_only() {
        let s = setup(&["hi there"]);
        s.dispatcher.dispatch(text("hello")).unwrap().await.unwrap();
        assert!(s.translator.questions().await.is_empty());
        assert_eq!(s.llm.prompts().await.len(), 1);
        assert_eq!(s.channel.texts().await, vec!["hi there"]);
    }

    #[tokio::test]
    async fn failing_work_is_contained() {
        let s = setup(&[]);
        // Completion fails; the supervisor logs and the handle still resolves.
        s.dispatcher.dispatch(text("hello")).unwrap().await.unwrap();
        let handle = spawn_supervised("panicking".to_string(), async {
            if true {
                panic!("boom");
            }
            Ok::<(), String>(())
        });
        assert!(handle.await.is_ok());
    }
}
