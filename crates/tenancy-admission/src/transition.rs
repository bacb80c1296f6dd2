//! Phase transition detection

use tenancy_common::crd::Workspace;

/// Whether an update moves the workspace into `Initializing`
///
/// True iff the old phase is anything else, unknown phases included, and the
/// new phase is exactly `Initializing`. Creates have no old object and are
/// never transitions.
pub fn is_transitioning_to_initializing(old: &Workspace, new: &Workspace) -> bool {
    !old.phase().is_initializing() && new.phase().is_initializing()
}
