// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use devlink::Errno;

const ENOENT: i32 = 2;
const ENOMEM: i32 = 12;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;
const EOPNOTSUPP: i32 = 95;

/// Errors of subfunction port management.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SfError {
    #[error("no free subfunction id")]
    OutOfIds,
    #[error("out of memory")]
    OutOfMemory,
    #[error("VSI configuration failed: {0}")]
    VsiConfigFailed(String),
    #[error("net device allocation failed: {0}")]
    NetdevAllocFailed(String),
    #[error("net device registration failed: {0}")]
    NetdevRegisterFailed(String),
    #[error("auxiliary device init failed: {0}")]
    AuxInitFailed(String),
    #[error("auxiliary device add failed: {0}")]
    AuxAddFailed(String),
    #[error("admin port creation failed: {0}")]
    AdminPortCreateFailed(String),
    #[error("MAC filter programming failed: {0}")]
    FilterAddFailed(String),
    #[error("operation not supported")]
    NotSupported,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("resource busy: {0}")]
    Busy(String),
    #[error("no such port: {0}")]
    NotFound(u32),
    #[error("VSI allocation failed: {0}")]
    VsiAllocFailed(String),
    #[error("port {0} is active")]
    PortActive(u32),
    #[error("representor attach failed: {0}")]
    EswitchAttachFailed(String),
}

impl SfError {
    /// The negative errno the driver reports for this error.
    pub fn errno(&self) -> i32 {
        -match self {
            SfError::OutOfMemory
            | SfError::NetdevAllocFailed(_)
            | SfError::NetdevRegisterFailed(_)
            | SfError::VsiAllocFailed(_)
            | SfError::EswitchAttachFailed(_) => ENOMEM,
            SfError::VsiConfigFailed(_)
            | SfError::AuxInitFailed(_)
            | SfError::AdminPortCreateFailed(_)
            | SfError::FilterAddFailed(_)
            | SfError::InvalidArgument(_) => EINVAL,
            SfError::AuxAddFailed(_) => ENODEV,
            SfError::NotSupported => EOPNOTSUPP,
            SfError::OutOfIds | SfError::Busy(_) | SfError::PortActive(_) => EBUSY,
            SfError::NotFound(_) => ENOENT,
        }
    }

    /// Whether the error leaves the operation in progress intact.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            SfError::AdminPortCreateFailed(_) | SfError::FilterAddFailed(_)
        )
    }
}

impl From<SfError> for Errno {
    fn from(value: SfError) -> Self {
        Errno(value.errno())
    }
}

#[cfg(test)]
mod test {
    use super::SfError;
    use devlink::Errno;

    #[test]
    fn errnos_are_negative() {
        assert_eq!(SfError::OutOfIds.errno(), -16);
        assert_eq!(SfError::NetdevRegisterFailed("x".into()).errno(), -12);
        assert_eq!(Errno::from(SfError::NotSupported), Errno(-95));
        assert_eq!(SfError::Busy("sfnum 3".into()).errno(), -16);
        assert!(SfError::FilterAddFailed("x".into()).is_soft());
        assert!(!SfError::VsiConfigFailed("x".into()).is_soft());
    }
}
