//! Local HTTP(S) server for over-the-air app package installs.
//!
//! An [`InstallSession`] serves one package to one device: a landing page
//! that redirects to the `itms-services` install URL, the plist manifest the
//! device fetches next, display images and finally the package itself.
//! Progress is reported as [`SessionEvent`]s to a single consumer.

pub mod assets;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod manifest;
pub mod models;
pub mod payload;
pub mod port;
pub mod routes;
pub mod session;
pub mod status;
pub mod tls;

mod request_log;

pub use assets::DisplayImages;
pub use config::SessionConfig;
pub use endpoints::Endpoints;
pub use error::{PayloadError, SessionError, SessionFault, TlsConfigError};
pub use models::AppMetadata;
pub use port::PortRange;
pub use session::InstallSession;
pub use status::{SessionEvent, Status};
