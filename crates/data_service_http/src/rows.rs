use serde::Deserialize;
use sync_protocol::UserIdentity;

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// User record as returned by the auth provider.
#[derive(Debug, Deserialize)]
pub(crate) struct UserRow {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<UserRow> for UserIdentity {
    fn from(row: UserRow) -> Self {
        let metadata = row.user_metadata.unwrap_or_default();
        Self {
            id: row.id,
            email: row.email.filter(|email| !email.trim().is_empty()),
            display_name: metadata
                .display_name
                .or(metadata.full_name)
                .or(metadata.name)
                .filter(|name| !name.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_through_metadata_keys() {
        let row: UserRow = serde_json::from_str(
            r#"{"id":"u1","email":"ada@example.com","user_metadata":{"full_name":"Ada L"},"role":"authenticated"}"#,
        )
        .expect("row parses");

        assert_eq!(
            UserIdentity::from(row),
            UserIdentity {
                id: "u1".to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: Some("Ada L".to_string()),
            }
        );
    }
}
