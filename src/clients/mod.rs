pub mod cookie_client;
pub mod lens_client;

pub use cookie_client::RemoteIdentityProvider;
pub use lens_client::{LensClient, UploadRedirect};
