//! Credential management for the Responder API client.
//!
//! # Components
//!
//! - [`credentials`] - credential state, sign-in status, token lifetimes and expiry predicates
//! - [`token`] - OAuth2 token endpoint: password and refresh_token grants
//! - [`jwt`] - ID token payload decoding into a [`Profile`]
//! - [`persistence`] - storage of the last auth response across restarts
//! - [`store`] - the [`CredentialStore`] contract and the [`AuthStore`] implementation

pub mod credentials;
pub mod error;
pub mod jwt;
pub mod persistence;
pub mod store;
pub mod token;

pub use credentials::{CredentialPatch, Credentials, Profile, SignInStatus, TokenLifetimes};
pub use error::{AuthError, Result};
pub use persistence::{
    FileTokenPersistence, MemoryTokenPersistence, PersistedAuth, SharedTokenPersistence,
    TokenPersistence,
};
pub use store::{AuthStore, CredentialStore, HydrateOutcome, SharedCredentialStore};
pub use token::{HttpTokenEndpoint, LoginCredentials, OAuthConfig, TokenEndpoint, TokenResponse};
