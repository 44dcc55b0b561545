//! Persistence adapter for the Intake session bridge.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the [`SessionStore`] that durably holds the
//! one opaque session identifier the bridge survives restarts with.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process, and the host can
//!   read the identifier from several processes while one writes it.
//! - **Single key**: the store is a generic key-value table, but the bridge
//!   only ever reads and writes [`SESSION_KEY`].
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`.

mod migrations;
mod pool;
mod store;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use store::{MemorySessionStore, SessionStore, SqliteSessionStore, StoreError, SESSION_KEY};
