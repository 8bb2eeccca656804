//! Compiled lookup tree

use super::{
    builder::Router,
    types::{Procedure, Target},
};
use crate::{
    Context, ProcedureMeta, ProcedureType, RegistryError, RpcError, RpcResult,
    middleware::{Next, Request, build_middleware_chain},
    subscription::{JsonEventStream, SubscriptionContext},
    validation::check_path,
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// A resolved leaf of the router tree
pub struct Endpoint<Ctx: Clone + Send + Sync + 'static> {
    path: String,
    procedure_type: ProcedureType,
    target: Target<Ctx>,
}

impl<Ctx: Clone + Send + Sync + 'static> Endpoint<Ctx> {
    /// Full dotted path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Operation kind
    pub fn procedure_type(&self) -> ProcedureType {
        self.procedure_type
    }
}

/// Node of the static lookup tree: a leaf or a namespace of children
pub(crate) enum RouterNode<Ctx: Clone + Send + Sync + 'static> {
    Leaf(Endpoint<Ctx>),
    Namespace(HashMap<String, RouterNode<Ctx>>),
}

/// Immutable router produced by [`Router::compile`].
///
/// Paths are resolved segment by segment through a tree built once at
/// startup; each query and mutation carries its pre-built middleware chain.
pub struct CompiledRouter<Ctx: Clone + Send + Sync + 'static> {
    root: HashMap<String, RouterNode<Ctx>>,
    catalog: Vec<ProcedureMeta>,
}

impl<Ctx: Clone + Send + Sync + 'static> CompiledRouter<Ctx> {
    pub(crate) fn build(router: Router<Ctx>) -> Result<Self, RegistryError> {
        let Router {
            registrations,
            middleware,
        } = router;

        let mut root = HashMap::new();
        let mut catalog = Vec::with_capacity(registrations.len());

        for registration in registrations {
            let path = registration.path;
            check_path(&path).map_err(|reason| RegistryError::InvalidPath {
                path: path.clone(),
                reason,
            })?;

            let procedure_type = registration.procedure.procedure_type();
            let target = match registration.procedure {
                Procedure::Handler { handler, .. } => {
                    let final_handler: Next<Ctx> = Arc::new(move |ctx, req: Request| {
                        let handler = handler.clone();
                        Box::pin(async move { (handler)(ctx, req.input).await })
                    });
                    let mut layers = middleware.clone();
                    layers.extend(registration.scoped_middleware);
                    Target::Call(build_middleware_chain(&layers, final_handler))
                }
                Procedure::Subscription { handler } => Target::Subscription(handler),
            };

            insert(
                &mut root,
                Endpoint {
                    path: path.clone(),
                    procedure_type,
                    target,
                },
            )?;
            catalog.push(ProcedureMeta {
                path,
                procedure_type,
            });
        }

        catalog.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(
            procedures = catalog.len(),
            middleware = middleware.len(),
            "Router compiled"
        );

        Ok(Self { root, catalog })
    }

    /// Walk the tree one segment at a time.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` when a segment is missing or the path stops at a
    /// namespace.
    pub fn resolve(&self, path: &str) -> RpcResult<&Endpoint<Ctx>> {
        let mut level = &self.root;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let is_last = segments.peek().is_none();
            match level.get(segment) {
                Some(RouterNode::Leaf(endpoint)) if is_last => return Ok(endpoint),
                Some(RouterNode::Namespace(children)) if !is_last => level = children,
                _ => break,
            }
        }

        tracing::debug!(path = %path, "Procedure not found");
        Err(RpcError::procedure_not_found(path))
    }

    /// All procedures sorted by path
    pub fn procedures(&self) -> &[ProcedureMeta] {
        &self.catalog
    }

    /// Number of registered procedures
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// True if no procedure is registered
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Run a query or mutation through its middleware chain.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for unknown paths, `BAD_REQUEST` for subscription paths,
    /// and whatever the middleware or handler returns.
    pub async fn call(
        &self,
        ctx: Context<Ctx>,
        path: &str,
        input: serde_json::Value,
        request_id: &str,
    ) -> RpcResult<serde_json::Value> {
        let endpoint = self.resolve(path)?;
        let Target::Call(chain) = &endpoint.target else {
            return Err(RpcError::bad_request(format!(
                "'{}' is a subscription; use subscribe",
                path
            )));
        };

        let request = Request {
            path: endpoint.path.clone(),
            procedure_type: endpoint.procedure_type,
            input,
            request_id: request_id.to_string(),
        };
        (chain.clone())(ctx, request).await
    }

    /// Start a subscription producer.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for unknown paths, `BAD_REQUEST` for query and mutation
    /// paths, and any input or handler error.
    pub async fn subscribe(
        &self,
        ctx: Context<Ctx>,
        sub_ctx: SubscriptionContext,
        path: &str,
        input: serde_json::Value,
    ) -> RpcResult<JsonEventStream> {
        let endpoint = self.resolve(path)?;
        let Target::Subscription(handler) = &endpoint.target else {
            return Err(RpcError::bad_request(format!(
                "'{}' is a {}; call it instead of subscribing",
                path, endpoint.procedure_type
            )));
        };

        tracing::trace!(
            path = %path,
            subscription_id = %sub_ctx.subscription_id,
            "Starting subscription producer"
        );
        (handler)(ctx, sub_ctx, input).await
    }
}

fn insert<Ctx: Clone + Send + Sync + 'static>(
    root: &mut HashMap<String, RouterNode<Ctx>>,
    endpoint: Endpoint<Ctx>,
) -> Result<(), RegistryError> {
    let path = endpoint.path.clone();
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(RegistryError::InvalidPath {
            path,
            reason: "path cannot be empty".to_string(),
        });
    };

    let mut level = root;
    for (depth, segment) in parents.iter().enumerate() {
        level = match level
            .entry((*segment).to_string())
            .or_insert_with(|| RouterNode::Namespace(HashMap::new()))
        {
            RouterNode::Namespace(children) => children,
            RouterNode::Leaf(_) => {
                return Err(RegistryError::LeafNamespaceConflict {
                    path: segments[..=depth].join("."),
                });
            }
        };
    }

    match level.entry((*last).to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(RouterNode::Leaf(endpoint));
            Ok(())
        }
        Entry::Occupied(existing) => match existing.get() {
            RouterNode::Leaf(_) => Err(RegistryError::DuplicatePath { path }),
            RouterNode::Namespace(_) => Err(RegistryError::LeafNamespaceConflict { path }),
        },
    }
}
