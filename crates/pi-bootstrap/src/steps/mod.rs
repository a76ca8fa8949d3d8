//! Concrete bring-up and teardown steps.

mod gitops;
mod runtime;
mod storage;

pub use gitops::{
    ApplyRootApplication, DeleteRootApplication, InstallGitOpsController,
    UninstallGitOpsController, WaitGitOpsReady,
};
pub use runtime::{InstallRuntime, UninstallRuntime, WaitClusterReady};
pub use storage::{MountStorage, UnmountStorage};
pub(crate) use storage::is_storage_device;

use crate::step::Step;

/// Bring-up order: storage, runtime, cluster readiness, Argo CD, Argo CD
/// readiness, root application.
#[must_use]
pub fn bring_up_sequence() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(MountStorage),
        Box::new(InstallRuntime),
        Box::new(WaitClusterReady),
        Box::new(InstallGitOpsController),
        Box::new(WaitGitOpsReady),
        Box::new(ApplyRootApplication),
    ]
}

/// Teardown order, roughly the reverse of bring-up.
#[must_use]
pub fn teardown_sequence() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(DeleteRootApplication),
        Box::new(UninstallGitOpsController),
        Box::new(UninstallRuntime),
        Box::new(UnmountStorage),
    ]
}
