use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

use super::claims::{Claims, ClaimsError};

/// Access and refresh token, always stored and replaced together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl Debug for CredentialPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"**********")
            .field("refresh_token", &"**********")
            .finish()
    }
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn claims(&self) -> Result<Claims, ClaimsError> {
        Claims::decode(&self.access_token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(alias = "bearer", alias = "BEARER")]
    Bearer,
    #[serde(untagged)]
    Other(String),
}

/// Body of `POST <refresh-path>`.
#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Successful refresh response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<TokenType>,
}

impl RefreshResponse {
    /// The pair to store. Servers that do not rotate refresh tokens omit one; the
    /// token that was just exchanged stays valid in that case.
    pub fn into_pair(self, exchanged_refresh_token: &str) -> CredentialPair {
        CredentialPair {
            access_token: self.access_token,
            refresh_token: self.refresh_token.unwrap_or_else(|| exchanged_refresh_token.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_debug_hides_tokens() {
        let pair = CredentialPair::new("access-secret", "refresh-secret");
        let printed = format!("{:?}", pair);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_refresh_response_without_rotation() {
        let res: RefreshResponse = serde_json::from_value(json!({
            "access_token": "a2",
            "expires_in": 3600,
            "token_type": "bearer",
        }))
        .unwrap();
        assert_eq!(res.token_type, Some(TokenType::Bearer));
        assert_eq!(res.into_pair("r1"), CredentialPair::new("a2", "r1"));
    }

    #[test]
    fn test_other_token_type() {
        let res: RefreshResponse = serde_json::from_value(json!({
            "access_token": "a2",
            "refresh_token": "r2",
            "token_type": "mac",
        }))
        .unwrap();
        assert_eq!(res.token_type, Some(TokenType::Other("mac".to_string())));
        assert_eq!(res.into_pair("r1"), CredentialPair::new("a2", "r2"));
    }
}
