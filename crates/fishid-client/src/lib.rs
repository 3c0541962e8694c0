//! Client library for the identification API.
//!
//! A [`Session`] carries the API location and a [`TokenProvider`]; every
//! outbound call asks the provider for a bearer token, so there is no global
//! auth state. [`IdentifyFlow`] drives one photo from upload grant to a
//! terminal [`ClientState`].

pub mod api;
pub mod error;
pub mod poll;
pub mod session;

pub use api::{ApiClient, StatusSnapshot};
pub use error::{ClientError, ClientResult};
pub use poll::{poll_until_terminal, ClientState, IdentifyFlow, PollConfig, StatusSource};
pub use session::{CachedTokenProvider, IssuedToken, Session, StaticTokenProvider, TokenProvider, TokenSource};
