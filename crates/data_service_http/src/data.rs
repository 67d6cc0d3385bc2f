use std::sync::Arc;

use async_trait::async_trait;
use auth_client::{AuthenticatedClient, Method, RequestError};
use serde_json::json;
use sync_protocol::{Conversation, DataService, Message, ServiceError, Space, UserIdentity};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::endpoints::{EndpointError, HttpEndpoints};
use crate::rows::UserRow;

/// [`DataService`] backed by a PostgREST-style API reached through the authenticated client.
pub struct HttpDataService {
    client: Arc<AuthenticatedClient>,
    endpoints: HttpEndpoints,
}

impl HttpDataService {
    pub fn new(client: Arc<AuthenticatedClient>, endpoints: HttpEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn rest(&self, path: &str, query: &[(&str, &str)]) -> Result<String, ServiceError> {
        self.endpoints.rest(path, query).map_err(invalid_endpoint)
    }
}

fn invalid_endpoint(error: EndpointError) -> ServiceError {
    ServiceError::Validation(error.to_string())
}

fn in_list(ids: &[String]) -> String {
    let quoted = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "")))
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({quoted})")
}

#[async_trait]
impl DataService for HttpDataService {
    async fn fetch_user(&self) -> Result<Option<UserIdentity>, ServiceError> {
        let url = self.endpoints.auth("user", &[]).map_err(invalid_endpoint)?;
        match self.client.get_json::<UserRow>(&url).await {
            Ok(row) => Ok(Some(row.into())),
            Err(RequestError::Status { status: 404, .. }) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn fetch_spaces(&self) -> Result<Vec<Space>, ServiceError> {
        let url = self.rest("spaces", &[("select", "*"), ("order", "created_at.asc")])?;
        Ok(self.client.get_json(&url).await?)
    }

    async fn fetch_active_space(&self) -> Result<Option<Space>, ServiceError> {
        let url = self.rest(
            "spaces",
            &[
                ("select", "*"),
                ("order", "last_used_at.desc.nullslast"),
                ("limit", "1"),
            ],
        )?;
        let spaces: Vec<Space> = self.client.get_json(&url).await?;
        Ok(spaces.into_iter().next())
    }

    async fn fetch_conversations(&self, space_id: &str) -> Result<Vec<Conversation>, ServiceError> {
        let filter = format!("eq.{space_id}");
        let url = self.rest(
            "conversations",
            &[
                ("select", "*"),
                ("space_id", filter.as_str()),
                ("order", "updated_at.desc"),
            ],
        )?;
        Ok(self.client.get_json(&url).await?)
    }

    async fn fetch_messages(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<Message>, ServiceError> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = in_list(conversation_ids);
        let url = self.rest(
            "messages",
            &[
                ("select", "*"),
                ("conversation_id", filter.as_str()),
                ("order", "created_at.asc"),
            ],
        )?;
        Ok(self.client.get_json(&url).await?)
    }

    async fn touch_space(&self, space_id: &str) -> Result<(), ServiceError> {
        let filter = format!("eq.{space_id}");
        let url = self.rest("spaces", &[("id", filter.as_str())])?;
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|error| ServiceError::Validation(error.to_string()))?;

        self.client
            .request(Method::PATCH, &url, Some(json!({ "last_used_at": now })))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_list_quotes_ids() {
        assert_eq!(
            in_list(&["c1".to_string(), "c\"2".to_string()]),
            r#"in.("c1","c2")"#
        );
    }
}
