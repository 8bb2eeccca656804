//! App RPC - Router, Types, and Context

mod context;
mod handlers;
mod types;

pub use context::*;
pub use handlers::*;
pub use types::*;

pub use nexus_rpc::{Context, NoInput, Router, RpcError, RpcResult};
