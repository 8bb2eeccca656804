//! Router registry
//!
//! [`Router`] collects procedures with a builder API; [`Router::compile`]
//! turns it into a [`CompiledRouter`], a static lookup tree keyed by dotted
//! path segments.
//!
//! ```rust,ignore
//! let router = Router::new()
//!     .middleware(logging)
//!     .query("hello", hello)
//!     .subscription("teststream", test_stream)
//!     .merge("user", user_router())
//!     .compile()?;
//!
//! assert!(router.resolve("user.getById").is_ok());
//! assert!(router.resolve("getById").is_err());
//! ```

mod builder;
mod compiled;
mod types;

pub use builder::Router;
pub use compiled::{CompiledRouter, Endpoint};
