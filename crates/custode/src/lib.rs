//! Custode, an embeddable OAuth 2.1 authorization server.
//!
//! Applications compose the provider with two request handlers (one for
//! unauthenticated UI and authorization pages, one for protected resource
//! endpoints) and delegate the standards-level concerns to the library:
//! token issuance and validation, client registration, PKCE, refresh
//! rotation, metadata discovery, CORS, and at-rest encryption of per-grant
//! application state ("props") keyed to possession of a live token.
//!
//! State lives entirely in a pluggable key-value store ([`KvStore`]); the
//! crate ships an in-memory backend for tests and local development and a
//! Redis backend for deployments.

pub mod config;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod routes;
pub mod services;
pub mod store;
pub mod token;

pub use config::ProviderOptions;
pub use error::{OAuthError, ProviderResult};
pub use handler::{HandlerKind, Request, RequestContext, RequestHandler, RequestHandlerFactory};
pub use provider::OAuthProvider;
pub use services::{
    AuthRequest, AuthorizationInput, ClientService, ClientUpdate, CompletedAuthorization,
    GrantService, NewClient, OAuthHelpers,
};
pub use store::{KvPage, KvStore, MemoryStore, RedisStore};
