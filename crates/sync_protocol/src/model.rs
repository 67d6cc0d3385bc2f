use serde::{Deserialize, Deserializer, Serialize};

/// Workspace grouping conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Space {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub space_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Conversation {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        space_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            space_id: space_id.into(),
            title: title.into(),
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Message {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Bearer credential material plus its expiry in epoch seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl CredentialState {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            expires_at: Some(expires_at),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_at.is_none()
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }

    /// Returns the copy of this credential allowed to leave the coordinator.
    #[must_use]
    pub fn sanitized(&self, exposure: CredentialExposure) -> Self {
        match exposure {
            CredentialExposure::Full => self.clone(),
            CredentialExposure::AccessOnly => Self {
                access_token: self.access_token.clone(),
                refresh_token: None,
                expires_at: self.expires_at,
            },
            CredentialExposure::Hidden => Self {
                access_token: None,
                refresh_token: None,
                expires_at: self.expires_at,
            },
        }
    }
}

/// Deployment policy for credential fields in snapshots sent to presentation processes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialExposure {
    Full,
    #[default]
    AccessOnly,
    Hidden,
}

/// Wholesale copy of the coordinator's application state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSnapshot {
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub spaces: Vec<Space>,
    #[serde(default)]
    pub active_space: Option<Space>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub user: Option<UserIdentity>,
    #[serde(default)]
    pub initial_data_loaded: bool,
    #[serde(default)]
    pub last_fetched: Option<String>,
    #[serde(default)]
    pub credentials: CredentialState,
}

impl ApplicationSnapshot {
    /// True when neither spaces nor conversations have been populated.
    #[must_use]
    pub fn core_collections_empty(&self) -> bool {
        self.spaces.is_empty() && self.conversations.is_empty()
    }

    /// Merges every field present in `partial`, leaving the rest untouched.
    pub fn apply_partial(&mut self, partial: PartialSnapshot) {
        let PartialSnapshot {
            spaces,
            active_space,
            conversations,
            messages,
            user,
            last_fetched,
        } = partial;

        if let Some(spaces) = spaces {
            self.spaces = spaces;
        }
        if let Some(active_space) = active_space {
            self.active_space = active_space;
        }
        if let Some(conversations) = conversations {
            self.conversations = conversations;
        }
        if let Some(messages) = messages {
            self.messages = messages;
        }
        if let Some(user) = user {
            self.user = user;
        }
        if let Some(last_fetched) = last_fetched {
            self.last_fetched = Some(last_fetched);
        }
    }

    #[must_use]
    pub fn sanitized(&self, exposure: CredentialExposure) -> Self {
        let mut copy = self.clone();
        copy.credentials = self.credentials.sanitized(exposure);
        copy
    }
}

/// Field-wise proposal merged into the authoritative snapshot.
///
/// `active_space` and `user` use a nested option: absent leaves the field alone,
/// an explicit `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spaces: Option<Vec<Space>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_space: Option<Option<Space>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversations: Option<Vec<Conversation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub user: Option<Option<UserIdentity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<String>,
}

impl PartialSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    #[must_use]
    pub fn with_spaces(mut self, spaces: Vec<Space>) -> Self {
        self.spaces = Some(spaces);
        self
    }

    #[must_use]
    pub fn with_active_space(mut self, active_space: Option<Space>) -> Self {
        self.active_space = Some(active_space);
        self
    }

    #[must_use]
    pub fn with_conversations(mut self, conversations: Vec<Conversation>) -> Self {
        self.conversations = Some(conversations);
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: Option<UserIdentity>) -> Self {
        self.user = Some(user);
        self
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
