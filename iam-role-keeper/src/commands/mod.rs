//! Commands module - role lifecycle operations and the service layer exposing them

mod probe;
mod provision;
pub(crate) mod service;
mod teardown;

pub use probe::{adopt, probe, refresh};
pub use provision::{ensure_role, provision};
pub use service::RoleKeeperService;
pub use teardown::{destroy, instance_profile_arn};
