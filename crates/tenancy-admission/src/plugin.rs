//! The WorkspaceTypeExists admission plugin
//!
//! Two stages share one plugin value:
//!
//! - [`WorkspaceTypeExists::admit`] (mutating) attaches the type's required
//!   initializers when a workspace enters `Initializing`.
//! - [`WorkspaceTypeExists::validate`] (validating) checks that the type
//!   exists, that the required initializers survived the rest of the mutating
//!   chain, and that the creator may `use` the type.
//!
//! Neither stage keeps state between calls; both re-derive everything from
//! the request and the catalog.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument};

use tenancy_common::crd::Workspace;
use tenancy_common::{LogicalCluster, LOGICAL_CLUSTER_ANNOTATION};

use crate::attributes::{Attributes, Operation};
use crate::authz::{AuthorizerFactory, UsageAuthorizer, UsageDecision};
use crate::catalog::{resolve_type, ResolvedType, TypeLister};
use crate::context::RequestContext;
use crate::decode::{decode, encode_into, Decoded};
use crate::error::{AdmissionError, InitializationError};
use crate::initializers::{merge_initializers, missing_initializers};
use crate::readiness::ReadinessGate;
use crate::transition::is_transitioning_to_initializing;

/// Name the plugin registers under in the admission chain
pub const PLUGIN_NAME: &str = "tenancy.dev/WorkspaceTypeExists";

/// Validates workspace types and keeps their initializers attached
#[derive(Clone, Default)]
pub struct WorkspaceTypeExists {
    type_lister: Option<Arc<dyn TypeLister>>,
    readiness: ReadinessGate,
    authorizer: Option<UsageAuthorizer>,
}

impl std::fmt::Debug for WorkspaceTypeExists {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceTypeExists")
            .field("has_type_lister", &self.type_lister.is_some())
            .field("readiness", &self.readiness)
            .field("authorizer", &self.authorizer)
            .finish()
    }
}

impl WorkspaceTypeExists {
    /// Create an unwired plugin; it refuses every decision until wired
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire in the type catalog and its sync signal
    pub fn with_type_lister(mut self, lister: Arc<dyn TypeLister>, synced: ReadinessGate) -> Self {
        self.set_type_lister(lister, synced);
        self
    }

    /// Wire in the authorizer factory used for `use` checks
    pub fn with_authorizer_factory(mut self, factory: Arc<dyn AuthorizerFactory>) -> Self {
        self.set_authorizer_factory(factory);
        self
    }

    /// Setter form of [`Self::with_type_lister`]
    pub fn set_type_lister(&mut self, lister: Arc<dyn TypeLister>, synced: ReadinessGate) {
        self.type_lister = Some(lister);
        self.readiness = synced;
    }

    /// Setter form of [`Self::with_authorizer_factory`]
    pub fn set_authorizer_factory(&mut self, factory: Arc<dyn AuthorizerFactory>) {
        self.authorizer = Some(UsageAuthorizer::new(factory));
    }

    /// Startup self-check: fails if a collaborator was never wired in
    pub fn validate_initialization(&self) -> Result<(), InitializationError> {
        if self.type_lister.is_none() {
            return Err(InitializationError::MissingTypeLister {
                plugin: PLUGIN_NAME,
            });
        }
        if self.authorizer.is_none() {
            return Err(InitializationError::MissingAuthorizer {
                plugin: PLUGIN_NAME,
            });
        }
        Ok(())
    }

    /// Whether the type catalog has synced
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Operations this plugin acts on
    pub fn handles(&self, operation: Operation) -> bool {
        matches!(operation, Operation::Create | Operation::Update)
    }

    /// Mutating stage
    ///
    /// On an Update moving the workspace into `Initializing`, appends every
    /// initializer its type requires that is not already present. Everything
    /// else passes through untouched.
    #[instrument(skip_all, fields(name = %attrs.name, operation = ?attrs.operation))]
    pub fn admit(
        &self,
        ctx: &RequestContext,
        attrs: &mut Attributes,
    ) -> Result<(), AdmissionError> {
        if !attrs.is_workspace() || attrs.operation != Operation::Update {
            return Ok(());
        }

        let Some(obj) = attrs.object.as_mut() else {
            return Err(AdmissionError::malformed("update request carries no object"));
        };
        let workspace = match decode::<Workspace>(obj) {
            Decoded::Decoded(ws) => ws,
            Decoded::WrongKind => return Ok(()),
            Decoded::Malformed(message) => return Err(AdmissionError::malformed(message)),
        };
        let old = decode_old(attrs.old_object.as_ref())?;

        if !is_transitioning_to_initializing(&old, &workspace) {
            return Ok(());
        }
        ensure_same_cluster(&old, &workspace)?;

        let resolved = self.resolve(ctx, &workspace)?;
        let merged = merge_initializers(workspace.initializers(), resolved.required_initializers());
        if merged.as_slice() == workspace.initializers() {
            debug!(type_name = %workspace.spec.type_name, "required initializers already present");
            return Ok(());
        }

        debug!(
            type_name = %workspace.spec.type_name,
            added = merged.len() - workspace.initializers().len(),
            "attaching required initializers"
        );
        // Only status.initializers is written back; defaulted fields stay as sent
        let overlay = json!({ "status": { "initializers": merged } });
        encode_into(obj, &overlay).map_err(AdmissionError::malformed)
    }

    /// Validating stage
    ///
    /// Create: the type must exist and the creator must hold `use` on it,
    /// unless it is `Universal`. Update into `Initializing`: the type must
    /// exist and every initializer it requires must be present. Anything
    /// else is allowed.
    #[instrument(skip_all, fields(name = %attrs.name, operation = ?attrs.operation))]
    pub async fn validate(
        &self,
        ctx: &RequestContext,
        attrs: &Attributes,
    ) -> Result<(), AdmissionError> {
        if !attrs.is_workspace() || !self.handles(attrs.operation) {
            return Ok(());
        }

        let Some(obj) = attrs.object.as_ref() else {
            return Err(AdmissionError::malformed("request carries no object"));
        };
        let workspace = match decode::<Workspace>(obj) {
            Decoded::Decoded(ws) => ws,
            Decoded::WrongKind => return Ok(()),
            Decoded::Malformed(message) => return Err(AdmissionError::malformed(message)),
        };

        if attrs.operation == Operation::Update {
            let old = decode_old(attrs.old_object.as_ref())?;
            if !is_transitioning_to_initializing(&old, &workspace) {
                return Ok(());
            }
            ensure_same_cluster(&old, &workspace)?;

            let resolved = self.resolve(ctx, &workspace)?;
            let required = resolved.required_initializers();
            if let Some(missing) = missing_initializers(workspace.initializers(), required).first()
            {
                let present: Vec<&str> =
                    workspace.initializers().iter().map(|i| i.as_str()).collect();
                return Err(AdmissionError::policy_denied(format!(
                    "status.initializers {present:?} does not include required initializer {:?}",
                    missing.as_str()
                )));
            }
            return Ok(());
        }

        let resolved = self.resolve(ctx, &workspace)?;
        if workspace.is_universal() {
            return Ok(());
        }
        self.authorize_use(ctx, attrs, &resolved).await
    }

    fn resolve(
        &self,
        ctx: &RequestContext,
        workspace: &Workspace,
    ) -> Result<ResolvedType, AdmissionError> {
        self.readiness.check()?;
        let lister = self.type_lister.as_deref().ok_or_else(|| {
            AdmissionError::backend_unavailable("catalog", "no WorkspaceType lister configured")
        })?;
        resolve_type(lister, ctx.cluster()?, &workspace.spec.type_name)
    }

    async fn authorize_use(
        &self,
        ctx: &RequestContext,
        attrs: &Attributes,
        resolved: &ResolvedType,
    ) -> Result<(), AdmissionError> {
        let ResolvedType::Catalog { cluster, .. } = resolved else {
            return Ok(());
        };
        let authorizer = self.authorizer.as_ref().ok_or_else(|| {
            AdmissionError::backend_unavailable("authorizer", "no authorizer configured")
        })?;

        let type_name = resolved.name();
        match authorizer.authorize(ctx, &attrs.user, cluster, type_name).await {
            UsageDecision::Allow => Ok(()),
            UsageDecision::Deny(reason) => {
                info!(
                    user = %attrs.user.username,
                    %cluster,
                    type_name,
                    "workspace type use denied"
                );
                let mut message = format!(
                    "unable to use workspace type {type_name:?}: missing verb='use' permission on workspacetypes"
                );
                if !reason.is_empty() {
                    message.push_str(&format!(" ({reason})"));
                }
                Err(AdmissionError::policy_denied(message))
            }
            UsageDecision::Error(message) => Err(AdmissionError::backend_unavailable(
                "authorizer",
                format!("unable to determine access to workspace type {type_name:?}: {message}"),
            )),
        }
    }
}

/// A workspace cannot move to another logical cluster while entering `Initializing`
fn ensure_same_cluster(old: &Workspace, new: &Workspace) -> Result<(), AdmissionError> {
    let (before, after) = (old.logical_cluster(), new.logical_cluster());
    if before == after {
        return Ok(());
    }
    let show = |cluster: Option<LogicalCluster>| {
        cluster.map_or_else(|| "<unset>".to_string(), |c| c.to_string())
    };
    Err(AdmissionError::policy_denied(format!(
        "metadata.annotations[{LOGICAL_CLUSTER_ANNOTATION:?}] cannot change from {} to {}",
        show(before),
        show(after)
    )))
}

fn decode_old(old: Option<&kube::api::DynamicObject>) -> Result<Workspace, AdmissionError> {
    match old.map(decode::<Workspace>) {
        Some(Decoded::Decoded(ws)) => Ok(ws),
        Some(Decoded::WrongKind) => Err(AdmissionError::malformed(
            "old object is not a Workspace",
        )),
        Some(Decoded::Malformed(message)) => Err(AdmissionError::malformed(format!(
            "old object: {message}"
        ))),
        None => Err(AdmissionError::malformed("update request carries no old object")),
    }
}
