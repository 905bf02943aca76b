pub mod device_service;
pub mod oauth_service;
pub mod password;
pub mod session_service;
pub mod token_service;
pub mod user_service;
pub mod verification_service;

pub use device_service::{DeviceResolver, DeviceService};
pub use oauth_service::{ExternalIdentity, IdentityVerifier, OAuthService};
pub use session_service::{AuthOutcome, SessionService};
pub use user_service::UserService;
pub use verification_service::VerificationService;
