//! OAuth client registry.
//!
//! CRUD over `client:{clientId}` records plus the token-endpoint
//! authentication policy. Secrets are stored only as SHA-256 hex; the
//! plaintext is returned exactly once, at creation or rotation.
//!
//! Deleting a client does not cascade to its grants: outstanding tokens
//! keep validating until they expire. Operators who need a hard cutoff
//! revoke the client's grants explicitly.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::crypto;
use crate::error::{OAuthError, ProviderResult};
use crate::models::Client;
use crate::store::{self, KvStore};

/// Length of generated client identifiers.
pub const CLIENT_ID_LENGTH: usize = 16;

/// Length of generated client secrets.
pub const CLIENT_SECRET_LENGTH: usize = 32;

pub const AUTH_METHOD_BASIC: &str = "client_secret_basic";
pub const AUTH_METHOD_POST: &str = "client_secret_post";
pub const AUTH_METHOD_NONE: &str = "none";

fn is_known_auth_method(method: &str) -> bool {
    matches!(
        method,
        AUTH_METHOD_BASIC | AUTH_METHOD_POST | AUTH_METHOD_NONE
    )
}

/// Metadata for registering a client.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub redirect_uris: Vec<String>,
    pub client_name: Option<String>,
    pub logo_uri: Option<String>,
    pub client_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
    pub jwks_uri: Option<String>,
    pub contacts: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    /// Defaults to `client_secret_basic`.
    pub token_endpoint_auth_method: Option<String>,
}

/// Partial update; `None` fields are left unchanged. The client id is
/// immutable.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub redirect_uris: Option<Vec<String>>,
    pub client_name: Option<String>,
    pub logo_uri: Option<String>,
    pub client_uri: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
    pub jwks_uri: Option<String>,
    pub contacts: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub token_endpoint_auth_method: Option<String>,
    /// New plaintext secret for a confidential client; stored re-hashed.
    pub client_secret: Option<String>,
}

/// A freshly created or updated client together with the plaintext secret,
/// when one was generated or supplied. This is the only time the plaintext
/// leaves the registry.
#[derive(Debug, Clone)]
pub struct CreatedClient {
    pub client: Client,
    pub client_secret: Option<String>,
}

/// One page of the client listing.
#[derive(Debug, Clone)]
pub struct ClientPage {
    pub clients: Vec<Client>,
    /// Opaque continuation cursor; absent once the listing is complete.
    pub cursor: Option<String>,
}

/// Client registry over the key-value store.
#[derive(Clone)]
pub struct ClientService {
    store: Arc<dyn KvStore>,
}

impl ClientService {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Register a client. Generates the id, and a secret for confidential
    /// clients; only the secret's SHA-256 hex is persisted.
    pub async fn create_client(&self, new: NewClient) -> ProviderResult<CreatedClient> {
        let auth_method = new
            .token_endpoint_auth_method
            .unwrap_or_else(|| AUTH_METHOD_BASIC.to_string());
        if !is_known_auth_method(&auth_method) {
            return Err(OAuthError::InvalidClientMetadata(format!(
                "unknown token_endpoint_auth_method {auth_method:?}"
            )));
        }
        if new.redirect_uris.is_empty() || new.redirect_uris.iter().any(String::is_empty) {
            return Err(OAuthError::InvalidClientMetadata(
                "at least one non-empty redirect URI is required".to_string(),
            ));
        }

        let client_id = crypto::random_string(CLIENT_ID_LENGTH);
        let secret = (auth_method != AUTH_METHOD_NONE)
            .then(|| crypto::random_string(CLIENT_SECRET_LENGTH));

        let client = Client {
            client_id: client_id.clone(),
            client_secret: secret
                .as_deref()
                .map(|s| crypto::sha256_hex(s.as_bytes())),
            redirect_uris: new.redirect_uris,
            client_name: new.client_name,
            logo_uri: new.logo_uri,
            client_uri: new.client_uri,
            policy_uri: new.policy_uri,
            tos_uri: new.tos_uri,
            jwks_uri: new.jwks_uri,
            contacts: new.contacts,
            grant_types: new.grant_types.unwrap_or_else(|| {
                vec![
                    "authorization_code".to_string(),
                    "refresh_token".to_string(),
                ]
            }),
            response_types: new
                .response_types
                .unwrap_or_else(|| vec!["code".to_string()]),
            registration_date: chrono::Utc::now().timestamp(),
            token_endpoint_auth_method: auth_method,
        };

        store::put_json(self.store.as_ref(), &store::client_key(&client_id), &client, None)
            .await?;
        debug!(client_id = %client_id, "client registered");

        Ok(CreatedClient {
            client: client.redacted(),
            client_secret: secret,
        })
    }

    /// Fetch the stored record including the secret hash. Internal; the
    /// public surface only hands out redacted copies.
    pub(crate) async fn fetch(&self, client_id: &str) -> ProviderResult<Option<Client>> {
        Ok(store::get_json(self.store.as_ref(), &store::client_key(client_id)).await?)
    }

    /// Look up a client for management callers; the secret hash is
    /// stripped.
    pub async fn get_client(&self, client_id: &str) -> ProviderResult<Option<Client>> {
        Ok(self.fetch(client_id).await?.map(|c| c.redacted()))
    }

    /// Apply a partial update. Switching the auth method to `none` erases
    /// any stored secret; a supplied plaintext secret is re-hashed.
    pub async fn update_client(
        &self,
        client_id: &str,
        update: ClientUpdate,
    ) -> ProviderResult<CreatedClient> {
        let mut client = self
            .fetch(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("unknown client".to_string()))?;

        if let Some(method) = update.token_endpoint_auth_method {
            if !is_known_auth_method(&method) {
                return Err(OAuthError::InvalidClientMetadata(format!(
                    "unknown token_endpoint_auth_method {method:?}"
                )));
            }
            client.token_endpoint_auth_method = method;
        }

        if let Some(uris) = update.redirect_uris {
            if uris.is_empty() || uris.iter().any(String::is_empty) {
                return Err(OAuthError::InvalidClientMetadata(
                    "at least one non-empty redirect URI is required".to_string(),
                ));
            }
            client.redirect_uris = uris;
        }
        if let Some(name) = update.client_name {
            client.client_name = Some(name);
        }
        if let Some(uri) = update.logo_uri {
            client.logo_uri = Some(uri);
        }
        if let Some(uri) = update.client_uri {
            client.client_uri = Some(uri);
        }
        if let Some(uri) = update.policy_uri {
            client.policy_uri = Some(uri);
        }
        if let Some(uri) = update.tos_uri {
            client.tos_uri = Some(uri);
        }
        if let Some(uri) = update.jwks_uri {
            client.jwks_uri = Some(uri);
        }
        if let Some(contacts) = update.contacts {
            client.contacts = Some(contacts);
        }
        if let Some(grant_types) = update.grant_types {
            client.grant_types = grant_types;
        }
        if let Some(response_types) = update.response_types {
            client.response_types = response_types;
        }

        let new_secret = if client.is_public() {
            // Public clients never carry a stored secret.
            client.client_secret = None;
            None
        } else if let Some(secret) = update.client_secret {
            client.client_secret = Some(crypto::sha256_hex(secret.as_bytes()));
            Some(secret)
        } else {
            None
        };

        store::put_json(self.store.as_ref(), &store::client_key(client_id), &client, None)
            .await?;
        debug!(client_id = %client_id, "client updated");

        Ok(CreatedClient {
            client: client.redacted(),
            client_secret: new_secret,
        })
    }

    /// Delete the client record. Grants and tokens are untouched.
    pub async fn delete_client(&self, client_id: &str) -> ProviderResult<()> {
        self.store.delete(&store::client_key(client_id)).await?;
        debug!(client_id = %client_id, "client deleted");
        Ok(())
    }

    /// Page through registered clients. The cursor is the store's opaque
    /// cursor and is omitted once the listing is complete.
    pub async fn list_clients(
        &self,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> ProviderResult<ClientPage> {
        let page = self
            .store
            .list(store::CLIENT_PREFIX, limit, cursor)
            .await?;

        let mut clients = Vec::with_capacity(page.keys.len());
        for key in &page.keys {
            // A record may vanish between the listing and the read.
            if let Some(client) = store::get_json::<Client>(self.store.as_ref(), key).await? {
                clients.push(client.redacted());
            }
        }

        Ok(ClientPage {
            clients,
            cursor: page.cursor,
        })
    }

    /// Authenticate a client at the token endpoint.
    ///
    /// Public clients skip secret checking. Confidential clients must
    /// present a secret whose SHA-256 hex matches the stored hash.
    pub(crate) async fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> ProviderResult<Client> {
        let client = self
            .fetch(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("unknown client".to_string()))?;

        if client.is_public() {
            return Ok(client);
        }

        let supplied = client_secret.filter(|s| !s.is_empty()).ok_or_else(|| {
            OAuthError::InvalidClient("client secret is required".to_string())
        })?;
        let stored = client.client_secret.as_deref().ok_or_else(|| {
            OAuthError::InvalidClient("client has no registered secret".to_string())
        })?;

        if !crypto::ct_eq(&crypto::sha256_hex(supplied.as_bytes()), stored) {
            debug!(client_id = %client_id, "client secret mismatch");
            return Err(OAuthError::InvalidClient(
                "invalid client credentials".to_string(),
            ));
        }

        Ok(client)
    }

    /// The client's application-facing metadata, as a JSON object in the
    /// RFC 7591 response vocabulary.
    pub(crate) fn registration_response_fields(client: &Client) -> Value {
        let mut fields = serde_json::Map::new();
        fields.insert("client_id".into(), client.client_id.clone().into());
        fields.insert(
            "redirect_uris".into(),
            client.redirect_uris.clone().into(),
        );
        fields.insert(
            "grant_types".into(),
            client.grant_types.clone().into(),
        );
        fields.insert(
            "response_types".into(),
            client.response_types.clone().into(),
        );
        fields.insert(
            "token_endpoint_auth_method".into(),
            client.token_endpoint_auth_method.clone().into(),
        );
        if let Some(name) = &client.client_name {
            fields.insert("client_name".into(), name.clone().into());
        }
        if let Some(uri) = &client.logo_uri {
            fields.insert("logo_uri".into(), uri.clone().into());
        }
        if let Some(uri) = &client.client_uri {
            fields.insert("client_uri".into(), uri.clone().into());
        }
        if let Some(uri) = &client.policy_uri {
            fields.insert("policy_uri".into(), uri.clone().into());
        }
        if let Some(uri) = &client.tos_uri {
            fields.insert("tos_uri".into(), uri.clone().into());
        }
        if let Some(uri) = &client.jwks_uri {
            fields.insert("jwks_uri".into(), uri.clone().into());
        }
        if let Some(contacts) = &client.contacts {
            fields.insert("contacts".into(), contacts.clone().into());
        }
        Value::Object(fields)
    }
}
