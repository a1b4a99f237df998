pub mod oauth;

pub use crate::services::crypto::Sealer;
pub use oauth::OAuthTokenProvider;
