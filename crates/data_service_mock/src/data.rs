use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sync_protocol::{
    Conversation, DataService, Message, Role, ServiceError, Space, UserIdentity,
};

use crate::script::{lock_unpoisoned, MockOp, Script};

/// Backing records served by [`MockDataService`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockData {
    pub user: Option<UserIdentity>,
    pub spaces: Vec<Space>,
    pub active_space: Option<Space>,
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
}

impl MockData {
    /// Two spaces, three conversations and a short exchange in each conversation of the first space.
    #[must_use]
    pub fn fixture() -> Self {
        let personal = Space::new("space-personal", "Personal");
        let work = Space::new("space-work", "Work");

        Self {
            user: Some(UserIdentity {
                id: "user-1".to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: Some("Ada".to_string()),
            }),
            spaces: vec![personal.clone(), work],
            active_space: Some(personal),
            conversations: vec![
                Conversation::new("conv-1", "space-personal", "Groceries"),
                Conversation::new("conv-2", "space-personal", "Trip planning"),
                Conversation::new("conv-3", "space-work", "Standup notes"),
            ],
            messages: vec![
                Message::new("msg-1", "conv-1", Role::User, "What do we need?"),
                Message::new("msg-2", "conv-1", Role::Assistant, "Milk and eggs."),
                Message::new("msg-3", "conv-2", Role::User, "Book the train."),
                Message::new("msg-4", "conv-3", Role::User, "Ship the release."),
            ],
        }
    }
}

/// In-memory [`DataService`] with per-operation call counters.
#[derive(Debug, Default)]
pub struct MockDataService {
    data: Mutex<MockData>,
    touched: Mutex<Vec<String>>,
    script: Script,
}

impl MockDataService {
    #[must_use]
    pub fn new(data: MockData) -> Self {
        Self {
            data: Mutex::new(data),
            touched: Mutex::new(Vec::new()),
            script: Script::default(),
        }
    }

    #[must_use]
    pub fn fixture() -> Self {
        Self::new(MockData::fixture())
    }

    /// Delays every call of `op`; combine with a paused tokio clock in tests.
    #[must_use]
    pub fn with_delay(self, op: MockOp, delay: Duration) -> Self {
        self.script.set_delay(op, delay);
        self
    }

    pub fn set_data(&self, data: MockData) {
        *lock_unpoisoned(&self.data) = data;
    }

    pub fn update(&self, apply: impl FnOnce(&mut MockData)) {
        apply(&mut lock_unpoisoned(&self.data));
    }

    /// Fails the next call of `op` once.
    pub fn fail_next(&self, op: MockOp, error: ServiceError) {
        self.script.fail_next(op, error);
    }

    /// Fails every call of `op` until [`Self::clear_failures`].
    pub fn fail_always(&self, op: MockOp, error: ServiceError) {
        self.script.fail_always(op, error);
    }

    pub fn clear_failures(&self) {
        self.script.clear_failures();
    }

    #[must_use]
    pub fn calls(&self, op: MockOp) -> usize {
        self.script.calls(op)
    }

    /// Space ids passed to `touch_space`, in call order.
    #[must_use]
    pub fn touched_spaces(&self) -> Vec<String> {
        lock_unpoisoned(&self.touched).clone()
    }

    fn read<T>(&self, select: impl FnOnce(&MockData) -> T) -> T {
        select(&lock_unpoisoned(&self.data))
    }
}

#[async_trait]
impl DataService for MockDataService {
    async fn fetch_user(&self) -> Result<Option<UserIdentity>, ServiceError> {
        self.script.enter(MockOp::FetchUser).await?;
        Ok(self.read(|data| data.user.clone()))
    }

    async fn fetch_spaces(&self) -> Result<Vec<Space>, ServiceError> {
        self.script.enter(MockOp::FetchSpaces).await?;
        Ok(self.read(|data| data.spaces.clone()))
    }

    async fn fetch_active_space(&self) -> Result<Option<Space>, ServiceError> {
        self.script.enter(MockOp::FetchActiveSpace).await?;
        Ok(self.read(|data| data.active_space.clone()))
    }

    async fn fetch_conversations(&self, space_id: &str) -> Result<Vec<Conversation>, ServiceError> {
        self.script.enter(MockOp::FetchConversations).await?;
        Ok(self.read(|data| {
            data.conversations
                .iter()
                .filter(|conversation| conversation.space_id == space_id)
                .cloned()
                .collect()
        }))
    }

    async fn fetch_messages(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<Message>, ServiceError> {
        self.script.enter(MockOp::FetchMessages).await?;
        Ok(self.read(|data| {
            data.messages
                .iter()
                .filter(|message| conversation_ids.contains(&message.conversation_id))
                .cloned()
                .collect()
        }))
    }

    async fn touch_space(&self, space_id: &str) -> Result<(), ServiceError> {
        self.script.enter(MockOp::TouchSpace).await?;
        lock_unpoisoned(&self.touched).push(space_id.to_string());
        Ok(())
    }
}
