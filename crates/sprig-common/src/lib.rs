pub mod errors;
pub mod events;
pub mod id;

pub use errors::{BridgeError, ConfigError, DispatchError, LaunchError, SprigError};
pub use events::{BridgeEvent, EventBus, IgnoreReason};
pub use id::{new_correlation_id, SurfaceId};

pub type Result<T> = std::result::Result<T, SprigError>;
