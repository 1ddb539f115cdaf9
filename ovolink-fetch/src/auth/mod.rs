//! Authentication and token lifecycle.
//!
//! Leaves first:
//!
//! - [`token_store`] - In-memory credential holder with expiry checks
//! - [`transport`] - The identity provider's HTTP exchanges
//! - [`login_form`] - Parsing of the password login's auto-submit form
//! - [`acquirer`] - PKCE and scripted password login, refresh
//! - [`guard`] - Expiry check and inline refresh around authenticated calls
//!
//! Supporting modules: [`endpoints`], [`pkce`], [`jwt`].

pub mod acquirer;
pub mod endpoints;
pub mod guard;
pub mod jwt;
pub mod login_form;
pub mod pkce;
pub mod token_store;
pub mod transport;
