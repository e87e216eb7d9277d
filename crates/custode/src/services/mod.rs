//! Core services: client registry and grant management.

pub mod clients;
pub mod grants;

pub use clients::{ClientPage, ClientService, ClientUpdate, CreatedClient, NewClient};
pub use grants::{
    AuthRequest, AuthorizationInput, CompletedAuthorization, GrantPage, GrantService,
};

/// Management surface exposed to embedded handlers through
/// [`crate::RequestContext::oauth`].
#[derive(Clone)]
pub struct OAuthHelpers {
    clients: ClientService,
    grants: GrantService,
}

impl OAuthHelpers {
    pub(crate) fn new(clients: ClientService, grants: GrantService) -> Self {
        Self { clients, grants }
    }

    /// Client registry operations.
    pub fn clients(&self) -> &ClientService {
        &self.clients
    }

    /// Authorization and grant operations.
    pub fn grants(&self) -> &GrantService {
        &self.grants
    }
}
