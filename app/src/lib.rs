//! Demo service for nexus-rpc
//!
//! `nexus-server` serves [`rpc::create_router`] over HTTP; `nexus-client`
//! calls it through [`nexus_rpc::client::Client`].

pub mod rpc;

use nexus_rpc::{Dispatcher, RegistryError, RequestMeta, RpcConfig};
use rpc::{AppContext, AppState};

/// Compile the application router and attach the context factory.
///
/// # Errors
///
/// Returns the registry error if the router does not compile.
pub fn build_dispatcher(
    state: AppState,
    config: RpcConfig,
) -> Result<Dispatcher<AppContext>, RegistryError> {
    let router = rpc::create_router().compile()?;
    Ok(
        Dispatcher::new(router, move |meta: RequestMeta| {
            rpc::create_context(state.clone(), meta)
        })
        .with_config(config),
    )
}
