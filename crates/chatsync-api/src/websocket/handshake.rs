// ── Connection URL and handshake payload ──

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::error::Error;
use crate::transport::normalize_base;

/// JSON sent in the `json` query item of the connection URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakePayload {
    pub user_id: String,
    pub user_details: UserDetails,
    pub user_token: String,
    pub server_determines_connection_id: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserDetails {
    pub id: String,
}

impl HandshakePayload {
    pub fn new(user_id: &str, token: &SecretString) -> Self {
        Self {
            user_id: user_id.to_owned(),
            user_details: UserDetails {
                id: user_id.to_owned(),
            },
            user_token: token.expose_secret().to_owned(),
            server_determines_connection_id: true,
        }
    }
}

/// Build `{base}/connect?json=..&api_key=..&authorization=..&stream-auth-type=jwt`.
pub fn connection_url(
    base: &Url,
    api_key: &str,
    user_id: &str,
    token: &SecretString,
) -> Result<Url, Error> {
    let payload = HandshakePayload::new(user_id, token);
    let json = serde_json::to_string(&payload).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::new(),
    })?;

    let mut url = normalize_base(base).join("connect")?;
    url.query_pairs_mut()
        .append_pair("json", &json)
        .append_pair("api_key", api_key)
        .append_pair("authorization", token.expose_secret())
        .append_pair("stream-auth-type", "jwt");
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_handshake_and_credentials() {
        let base = Url::parse("wss://chat.example.com").unwrap();
        let token = SecretString::from("jwt-token".to_owned());
        let url = connection_url(&base, "key", "u1", &token).unwrap();

        assert_eq!(url.path(), "/connect");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());

        assert_eq!(get("api_key").as_deref(), Some("key"));
        assert_eq!(get("authorization").as_deref(), Some("jwt-token"));
        assert_eq!(get("stream-auth-type").as_deref(), Some("jwt"));

        let json: serde_json::Value = serde_json::from_str(&get("json").unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "user_id": "u1",
                "user_details": { "id": "u1" },
                "user_token": "jwt-token",
                "server_determines_connection_id": true
            })
        );
    }
}
