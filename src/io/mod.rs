//! I/O modules for talking to the remote engine and writing map output

pub mod credentials;
pub mod session;
pub mod client;
pub mod export;
pub mod map;

pub use credentials::{AccessToken, Credentials};
pub use session::{connect, Authenticator, OAuthAuthenticator, Session};
pub use client::{EarthEngineClient, MapTiles, RemoteEngine};
pub use export::{ExportJob, ExportParams, ExportRequest, ExportTask};
pub use map::{MapDocument, MapLayer, LayerSource};
