pub mod auth;
pub mod classify;
pub mod dispatch;

pub use auth::{AuthClientConfig, AuthenticatedClient, ClientError, GoogleAuthClient};
pub use classify::is_retriable_client_error;
pub use dispatch::{DEFAULT_ENDPOINT, DispatchError, Dispatcher};
