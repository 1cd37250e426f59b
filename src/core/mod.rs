//! Core module - identity, cache, change bus, transactions, and sessions

pub mod bus;
pub mod cache;
pub mod config;
pub mod identity;
pub mod operation;
pub mod permission;
pub mod project;
pub mod remote;
pub mod session;
pub mod thing;
pub mod transaction;

pub use bus::{ChangeBus, ChangeEvent, ChangeFilter, EventKind, Listener, SessionEvent, Subscription};
pub use cache::{CacheWrite, EntityCache};
pub use config::Config;
pub use identity::{ClassKind, IdParseError, IdentityKey, ThingId};
pub use operation::{Operation, OperationKind, OperationSet, TransactionContext};
pub use permission::{AllowAll, PermissionService, PermissionTarget, Role, RolePermissions, TeamMember};
pub use project::{Project, ProjectError};
pub use remote::{MemoryRemote, Remote, RemoteError, SqliteRemote};
pub use session::{Session, SessionError, SessionState};
pub use thing::{ContainerRef, Content, Thing, ThingData, ThingError};
pub use transaction::{Transaction, TransactionError};
