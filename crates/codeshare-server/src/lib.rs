pub mod connection;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod server;

pub use registry::{Member, SessionRegistry};
pub use relay::{relay, RelayReport};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
