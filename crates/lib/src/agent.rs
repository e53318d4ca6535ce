//! General-query turn: build the prompt from the sender's catalog and recent history, call the
//! completion backend, deliver the reply, then react to intent phrases in it.
//!
//! Intent phrases: "item is being created" commits a new catalog item (via a second completion
//! asking for the item as a fenced JSON block); "fetching menu items" lists the catalog.

use crate::catalog::{self, CatalogItem, ExtractionError};
use crate::delivery::Delivery;
use crate::llm::{ChatMessage, CompletionBackend, LlmError};
use crate::session::{Conversation, ConversationStore, Turn};
use std::sync::Arc;

pub const SYSTEM_PROMPT: &str = "Strictly answer in English. You are a chat bot whose job is to complete information from user of database entries for food menu, you should expect from user to give you following values for every entry: Item Name, Item Type (One of Dish, Sandwich, Drink), Item Unit Price, Item Preparation Time. When user begins asking you to create new entry take whatever user passes and request the missing until all are complete, then confirm with user all the info again, and when user confirms reply with \"Item is being created\" only. If user asks for the menu reply with \"Fetching menu items...\" only.";

pub const ITEM_JSON_PROMPT: &str = "Format the item details as json with following keys \"name\", \"type\" in lower case, \"unit_price\" with value in cents, and \"preparation_time\" with value in minutes. add three back ticks around the json block";

/// Reply phrase meaning the confirmed item should be committed (matched case-insensitively).
pub const COMMIT_SENTINEL: &str = "item is being created";
/// Reply phrase meaning the catalog should be listed (matched case-insensitively).
pub const LIST_SENTINEL: &str = "fetching menu items";

pub const ITEM_CREATED_MESSAGE: &str = "Item has been created.";
pub const ITEM_FAILED_MESSAGE: &str = "Sorry, the item could not be created. Please try again.";
pub const TURN_FAILED_MESSAGE: &str =
    "Sorry, something went wrong while answering. Please try again later.";

/// Intent detected in a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CommitItem,
    ListCatalog,
}

/// Commit wins when both phrases are present.
pub fn detect_intent(reply: &str) -> Option<Intent> {
    let lower = reply.to_lowercase();
    if lower.contains(COMMIT_SENTINEL) {
        Some(Intent::CommitItem)
    } else if lower.contains(LIST_SENTINEL) {
        Some(Intent::ListCatalog)
    } else {
        None
    }
}

/// System instruction, current catalog, then the last `window` turns (oldest first).
pub fn build_prompt(conversation: &Conversation, window: usize) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::new("system", SYSTEM_PROMPT),
        ChatMessage::new(
            "user",
            format!(
                "Current menu is, note that prices are in cents and preparation time is in minutes: {}",
                catalog::render_catalog(conversation.catalog())
            ),
        ),
    ];
    messages.extend(conversation.recent(window).iter().map(ChatMessage::from));
    messages
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("item extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Handles general (non-data) messages for all senders.
pub struct GeneralProcessor {
    store: Arc<ConversationStore>,
    llm: Arc<dyn CompletionBackend>,
    delivery: Arc<Delivery>,
    prompt_window: usize,
}

impl GeneralProcessor {
    pub fn new(
        store: Arc<ConversationStore>,
        llm: Arc<dyn CompletionBackend>,
        delivery: Arc<Delivery>,
        prompt_window: usize,
    ) -> Self {
        Self {
            store,
            llm,
            delivery,
            prompt_window,
        }
    }

    /// Run one turn for `sender_id`. The sender's conversation stays locked for the whole turn,
    /// so concurrent messages from one sender are applied in arrival order of the lock.
    ///
    /// The primary reply is delivered before any follow-up; a failed follow-up leaves the
    /// catalog unchanged and is reported to the sender.
    pub async fn handle(&self, sender_id: &str, text: &str) -> Result<(), AgentError> {
        let conversation = self.store.get_or_create(sender_id).await;
        let mut conv = conversation.lock().await;

        conv.push_turn(Turn::user(text));
        let prompt = build_prompt(&conv, self.prompt_window);

        let reply = match self.llm.complete(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                self.delivery.deliver(sender_id, TURN_FAILED_MESSAGE).await;
                return Err(e.into());
            }
        };
        conv.push_turn(Turn::assistant(reply.clone()));
        self.delivery.deliver(sender_id, &reply).await;

        match detect_intent(&reply) {
            Some(Intent::CommitItem) => {
                match self.request_item(prompt).await {
                    Ok(item) => {
                        log::info!(
                            "agent: adding item '{}' to catalog of {}",
                            item.name,
                            sender_id
                        );
                        conv.add_item(item);
                        conv.push_turn(Turn::assistant(ITEM_CREATED_MESSAGE));
                        self.delivery.deliver(sender_id, ITEM_CREATED_MESSAGE).await;
                    }
                    Err(e) => {
                        self.delivery.deliver(sender_id, ITEM_FAILED_MESSAGE).await;
                        return Err(e);
                    }
                }
            }
            Some(Intent::ListCatalog) => {
                let listing = catalog::render_listing(conv.catalog());
                conv.push_turn(Turn::assistant(listing.clone()));
                self.delivery.deliver(sender_id, &listing).await;
            }
            None => {}
        }
        Ok(())
    }

    /// Ask the model for the pending item as a fenced JSON block and parse it.
    async fn request_item(&self, mut prompt: Vec<ChatMessage>) -> Result<CatalogItem, AgentError> {
        prompt.push(ChatMessage::new("user", ITEM_JSON_PROMPT));
        let reply = self.llm.complete(&prompt).await?;
        Ok(catalog::extract_item(&reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ItemKind;
    use crate::session::Role;
    use crate::testing::{RecordingChannel, ScriptedBackend};

    const ITEM_BLOCK: &str = "```json\n{\"name\": \"Tea\", \"type\": \"drink\", \"unit_price\": 500, \"preparation_time\": 3}\n```";

    struct Harness {
        store: Arc<ConversationStore>,
        llm: Arc<ScriptedBackend>,
        channel: Arc<RecordingChannel>,
        processor: GeneralProcessor,
    }

    fn harness(replies: &[&str]) -> Harness {
        let store = Arc::new(ConversationStore::default());
        let llm = Arc::new(ScriptedBackend::new(replies.iter().copied()));
        let channel = Arc::new(RecordingChannel::default());
        let delivery = Arc::new(Delivery::channel(channel.clone()));
        let processor = GeneralProcessor::new(store.clone(), llm.clone(), delivery, 10);
        Harness {
            store,
            llm,
            channel,
            processor,
        }
    }

    fn tea() -> CatalogItem {
        CatalogItem {
            name: "Tea".to_string(),
            kind: ItemKind::Drink,
            unit_price: 500,
            preparation_time: 3,
        }
    }

    #[test]
    fn detects_intents_case_insensitively() {
        assert_eq!(detect_intent("ITEM IS BEING CREATED"), Some(Intent::CommitItem));
        assert_eq!(detect_intent("Fetching menu items..."), Some(Intent::ListCatalog));
        assert_eq!(
            detect_intent("Fetching menu items. Item is being created"),
            Some(Intent::CommitItem)
        );
        assert_eq!(detect_intent("What is the price?"), None);
    }

    #[tokio::test]
    async fn plain_turn_appends_user_then_assistant() {
        let h = harness(&["What is the item name?"]);
        h.processor.handle("111", "new item please").await.unwrap();

        let history = h.store.history("111").await.unwrap();
        assert_eq!(
            history,
            vec![
                Turn::user("new item please"),
                Turn::assistant("What is the item name?")
            ]
        );
        assert_eq!(h.channel.texts().await, vec!["What is the item name?"]);
        assert!(h.store.catalog("111").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_has_system_catalog_and_window() {
        let replies: Vec<String> = (0..7).map(|i| format!("reply {}", i)).collect();
        let h = harness(&replies.iter().map(String::as_str).collect::<Vec<_>>());
        for i in 0..7 {
            h.processor.handle("111", &format!("msg {}", i)).await.unwrap();
        }
        let prompts = h.llm.prompts().await;
        let last = prompts.last().unwrap();
        assert_eq!(last[0], ChatMessage::new("system", SYSTEM_PROMPT));
        assert_eq!(last[1].role, "user");
        assert!(last[1].content.ends_with("minutes: []"));
        // 13 stored turns before the last call; only the newest 10 are sent.
        assert_eq!(last.len(), 2 + 10);
        assert_eq!(last[2], ChatMessage::new("assistant", "reply 1"));
        assert_eq!(last.last().unwrap(), &ChatMessage::new("user", "msg 6"));
    }

    #[tokio::test]
    async fn commit_phrase_adds_one_item_and_confirms() {
        let h = harness(&["Item is being created", ITEM_BLOCK]);
        h.processor.handle("111", "yes, confirm").await.unwrap();

        assert_eq!(h.store.catalog("111").await.unwrap(), vec![tea()]);
        assert_eq!(
            h.channel.texts().await,
            vec!["Item is being created", ITEM_CREATED_MESSAGE]
        );
        let history = h.store.history("111").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2], Turn::assistant(ITEM_CREATED_MESSAGE));

        let prompts = h.llm.prompts().await;
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1].len(), prompts[0].len() + 1);
        assert_eq!(prompts[1].last().unwrap(), &ChatMessage::new("user", ITEM_JSON_PROMPT));
    }

    #[tokio::test]
    async fn bad_item_block_skips_mutation_after_primary_reply() {
        let h = harness(&["Item is being created", "sorry, no json here"]);
        let err = h.processor.handle("111", "confirm").await.unwrap_err();
        assert!(matches!(err, AgentError::Extraction(_)));

        assert!(h.store.catalog("111").await.unwrap().is_empty());
        assert_eq!(
            h.channel.texts().await,
            vec!["Item is being created", ITEM_FAILED_MESSAGE]
        );
        assert_eq!(h.store.history("111").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn follow_up_completion_failure_is_contained() {
        let h = harness(&["item is being created"]);
        let err = h.processor.handle("111", "confirm").await.unwrap_err();
        assert!(matches!(err, AgentError::Completion(_)));
        assert!(h.store.catalog("111").await.unwrap().is_empty());
        assert_eq!(h.channel.texts().await[0], "item is being created");
    }

    #[tokio::test]
    async fn follow_up_api_error_leaves_catalog_and_notifies() {
        let h = harness(&["Item is being created"]);
        h.llm.push_error("rate limited").await;
        let err = h.processor.handle("111", "confirm").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Completion(LlmError::Api(ref m)) if m == "rate limited"
        ));
        assert!(h.store.catalog("111").await.unwrap().is_empty());
        assert_eq!(
            h.channel.texts().await,
            vec!["Item is being created", ITEM_FAILED_MESSAGE]
        );
        let prompts = h.llm.prompts().await;
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1].last().unwrap().content, ITEM_JSON_PROMPT);
    }

    #[tokio::test]
    async fn list_phrase_delivers_catalog_without_mutation() {
        let h = harness(&["Item is being created", ITEM_BLOCK, "Fetching menu items..."]);
        h.processor.handle("111", "confirm").await.unwrap();
        h.processor.handle("111", "show me the menu").await.unwrap();

        let expected = catalog::render_listing(&[tea()]);
        assert_eq!(h.channel.texts().await.last().unwrap(), &expected);
        assert_eq!(h.store.catalog("111").await.unwrap(), vec![tea()]);
        let history = h.store.history("111").await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, expected);
    }

    #[tokio::test]
    async fn primary_failure_sends_apology_and_keeps_user_turn() {
        let h = harness(&[]);
        let err = h.processor.handle("111", "hello").await.unwrap_err();
        assert!(matches!(err, AgentError::Completion(_)));
        assert_eq!(h.channel.texts().await, vec![TURN_FAILED_MESSAGE]);
        assert_eq!(h.store.history("111").await.unwrap(), vec![Turn::user("hello")]);
    }
}
