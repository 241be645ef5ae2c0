pub mod attempts;
pub mod authorize;
pub mod pkce;
pub mod token;

pub use attempts::LoginAttempts;
pub use authorize::Authorizer;
pub use token::{ExchangeError, HttpTokenExchange, OAuthToken, TokenExchange};
