pub mod classes_client;
pub mod config;
pub mod error;
pub mod roster_cache;
pub mod roster_client;
pub mod telemetry;
pub mod users_client;

pub use classes_client::{decode_class_creation, ClassCreationResponse, ClassesClient, HttpClassesClient};
pub use error::ClientError;
pub use roster_cache::RosterCache;
pub use roster_client::{HttpRosterSourceClient, RosterSourceClient};
pub use users_client::{HttpUsersClient, UsersClient};
