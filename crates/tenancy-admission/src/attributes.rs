//! Admission attributes
//!
//! The engine does not consume kube's `AdmissionRequest` directly. The webhook
//! converts each request into [`Attributes`], which is all a stage may look at.

use std::collections::BTreeMap;

use k8s_openapi::api::authentication::v1::UserInfo as K8sUserInfo;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, Operation as K8sOperation};

use tenancy_common::{TENANCY_GROUP, WORKSPACES_RESOURCE};

/// Operation kind of an admission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Object is being created
    Create,
    /// Object is being updated
    Update,
    /// Object is being deleted
    Delete,
    /// Connect to a subresource (exec, proxy, ...)
    Connect,
}

impl From<&K8sOperation> for Operation {
    fn from(op: &K8sOperation) -> Self {
        match op {
            K8sOperation::Create => Self::Create,
            K8sOperation::Update => Self::Update,
            K8sOperation::Delete => Self::Delete,
            K8sOperation::Connect => Self::Connect,
        }
    }
}

/// Group and plural resource name of the admitted object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupResource {
    /// API group, empty for the core group
    pub group: String,
    /// Plural resource name
    pub resource: String,
}

impl GroupResource {
    /// Create a group resource
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// The `workspaces.tenancy.dev` resource this gate acts on
    pub fn workspaces() -> Self {
        Self::new(TENANCY_GROUP, WORKSPACES_RESOURCE)
    }
}

/// The principal making the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Authenticated username
    pub username: String,
    /// Stable user identifier
    pub uid: Option<String>,
    /// Groups the user belongs to
    pub groups: Vec<String>,
    /// Additional authenticator-provided attributes
    pub extra: BTreeMap<String, Vec<String>>,
}

impl UserInfo {
    /// Create a user with the given groups
    pub fn new(username: impl Into<String>, groups: &[&str]) -> Self {
        Self {
            username: username.into(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl From<&K8sUserInfo> for UserInfo {
    fn from(info: &K8sUserInfo) -> Self {
        Self {
            username: info.username.clone().unwrap_or_default(),
            uid: info.uid.clone(),
            groups: info.groups.clone().unwrap_or_default(),
            extra: info.extra.clone().unwrap_or_default(),
        }
    }
}

/// Everything an admission stage may inspect about one request
///
/// `object` is mutable during the mutating stage; the validating stage only
/// reads it.
#[derive(Debug, Clone)]
pub struct Attributes {
    /// Operation kind
    pub operation: Operation,
    /// Resource being admitted
    pub resource: GroupResource,
    /// Name of the object
    pub name: String,
    /// Object after the operation (absent for Delete)
    pub object: Option<DynamicObject>,
    /// Object before the operation (Update and Delete only)
    pub old_object: Option<DynamicObject>,
    /// Requesting principal
    pub user: UserInfo,
}

impl Attributes {
    /// Extract attributes from a webhook admission request
    pub fn from_request(request: &AdmissionRequest<DynamicObject>) -> Self {
        Self {
            operation: Operation::from(&request.operation),
            resource: GroupResource::new(
                request.resource.group.clone(),
                request.resource.resource.clone(),
            ),
            name: request.name.clone(),
            object: request.object.clone(),
            old_object: request.old_object.clone(),
            user: UserInfo::from(&request.user_info),
        }
    }

    /// Whether the request targets the Workspace resource
    pub fn is_workspace(&self) -> bool {
        self.resource == GroupResource::workspaces()
    }
}
