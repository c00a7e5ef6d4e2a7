use shared::{domain::DisplayName, error::HubError};

/// Turns what a client claims to be into the name the hub routes by.
///
/// The hub trusts self-declared names; a credential-backed provider can
/// replace [`SelfDeclared`] without touching routing.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, claimed: &str) -> Result<DisplayName, HubError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SelfDeclared;

impl IdentityProvider for SelfDeclared {
    fn authenticate(&self, claimed: &str) -> Result<DisplayName, HubError> {
        DisplayName::parse(claimed)
    }
}
