/// Twister client
///
/// Caching, verifying data-access layer for the twister peer-to-peer social
/// network. Resources (profiles, avatars, public keys, posts, timelines,
/// direct message threads, accounts) are fetched through the daemon's
/// JSON-RPC interface and its DHT, cached with a configurable staleness
/// limit, deduplicated per identity and checked against their publisher's
/// signature.

pub mod account;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod jobs;
pub mod kinds;
pub mod metrics;
pub mod resource;
pub mod rpc;
pub mod settings;
pub mod telemetry;
pub mod user;
pub mod verification;

pub use account::{Account, AccountSnapshot};
pub use config::ClientConfig;
pub use context::{ClientContext, ClientSnapshot, Clock, ErrorSink, LogErrorSink, SystemClock};
pub use error::{ClientError, ClientResult};
pub use resource::{Resource, ResourceKey, ResourceKind, ResourceSnapshot, NEVER_UPDATED};
pub use settings::{QuerySettings, VerificationMode};
pub use user::{User, UserSnapshot};
