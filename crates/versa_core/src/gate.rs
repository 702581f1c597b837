//! Replica admission control.
//!
//! The replication component owns the replica's role and its read/write
//! access status. The store only queries it through [`AdmissionGate`]:
//!
//! - writes need `Primary` with write access `Granted`
//! - reads need read access `Granted`; snapshot reads may additionally run on
//!   an active secondary that reports itself readable, since they never need
//!   the freshest data

use crate::error::{CoreError, CoreResult};
use crate::types::IsolationLevel;
use parking_lot::RwLock;

/// Role of this replica in its replica set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaRole {
    /// Sole write authority.
    Primary,
    /// Secondary that applies the primary's commits and may serve reads.
    ActiveSecondary,
    /// Secondary still building its copy.
    IdleSecondary,
    /// Role not known or not assigned.
    Unknown,
}

/// Partition access status reported by the replication component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessStatus {
    /// Access is granted.
    Granted,
    /// A reconfiguration is in progress.
    ReconfigurationPending,
    /// This replica is not the primary.
    NotPrimary,
    /// The replica set has lost write quorum.
    NoWriteQuorum,
}

/// Query interface into the replication component.
///
/// Implementations must be cheap to call: every transactional operation
/// consults the gate.
pub trait AdmissionGate: Send + Sync {
    /// Returns the current replica role.
    fn role(&self) -> ReplicaRole;

    /// Returns the current write access status.
    fn write_status(&self) -> AccessStatus;

    /// Returns the current read access status.
    fn read_status(&self) -> AccessStatus;

    /// Returns whether the replica considers itself readable.
    ///
    /// `for_snapshot` asks whether a snapshot read (which tolerates stale
    /// data) may run even though read access is not globally granted.
    fn is_readable(&self, for_snapshot: bool) -> bool;
}

/// Write admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAdmission {
    /// Write is admitted.
    Admitted,
    /// Write is rejected: the replica is not the primary.
    RejectedRole(ReplicaRole),
    /// Write is rejected: the primary does not currently have write access.
    RejectedStatus(AccessStatus),
}

impl WriteAdmission {
    /// Checks if the write is admitted.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// Converts the decision to a result.
    pub fn to_result(self) -> CoreResult<()> {
        match self {
            Self::Admitted => Ok(()),
            Self::RejectedRole(_) | Self::RejectedStatus(_) => Err(CoreError::NotPrimary),
        }
    }
}

/// Read admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAdmission {
    /// Read access is granted.
    Admitted,
    /// Snapshot read admitted on a readable active secondary.
    AdmittedStale,
    /// Read is rejected.
    Rejected {
        /// Isolation level of the rejected read.
        isolation: IsolationLevel,
        /// Read status at the time of the decision.
        status: AccessStatus,
    },
}

impl ReadAdmission {
    /// Checks if the read is admitted.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Converts the decision to a result.
    pub fn to_result(self) -> CoreResult<()> {
        match self {
            Self::Admitted | Self::AdmittedStale => Ok(()),
            Self::Rejected { isolation, .. } => Err(CoreError::not_readable(isolation)),
        }
    }
}

/// Decides whether a write may proceed.
pub fn check_write_admission(gate: &dyn AdmissionGate) -> WriteAdmission {
    match gate.role() {
        ReplicaRole::Primary => match gate.write_status() {
            AccessStatus::Granted => WriteAdmission::Admitted,
            status => WriteAdmission::RejectedStatus(status),
        },
        role => WriteAdmission::RejectedRole(role),
    }
}

/// Decides whether a read under `isolation` may proceed.
pub fn check_read_admission(gate: &dyn AdmissionGate, isolation: IsolationLevel) -> ReadAdmission {
    let status = gate.read_status();
    if status == AccessStatus::Granted {
        return ReadAdmission::Admitted;
    }

    if isolation == IsolationLevel::Snapshot
        && gate.role() == ReplicaRole::ActiveSecondary
        && gate.is_readable(true)
    {
        return ReadAdmission::AdmittedStale;
    }

    ReadAdmission::Rejected { isolation, status }
}

#[derive(Debug, Clone, Copy)]
struct StatusSnapshot {
    role: ReplicaRole,
    write_status: AccessStatus,
    read_status: AccessStatus,
    readable: bool,
}

/// In-process admission gate whose answers are set by the host.
///
/// The replication component (or a test) drives it with the setters; the
/// store reads it on every operation.
///
/// # Example
///
/// ```rust
/// use versa_core::{AccessStatus, AdmissionGate, ReplicaRole, ReplicaStatus};
///
/// let status = ReplicaStatus::primary();
/// status.set_write_status(AccessStatus::NotPrimary);
/// assert_eq!(status.role(), ReplicaRole::Primary);
/// assert_eq!(status.write_status(), AccessStatus::NotPrimary);
/// ```
#[derive(Debug)]
pub struct ReplicaStatus {
    inner: RwLock<StatusSnapshot>,
}

impl ReplicaStatus {
    /// A primary with read and write access granted.
    #[must_use]
    pub fn primary() -> Self {
        Self::with(ReplicaRole::Primary, AccessStatus::Granted, AccessStatus::Granted, true)
    }

    /// A readable active secondary.
    ///
    /// Secondaries never have write access, and their read status is
    /// `NotPrimary`; they serve snapshot reads through `is_readable`.
    #[must_use]
    pub fn active_secondary() -> Self {
        Self::with(
            ReplicaRole::ActiveSecondary,
            AccessStatus::NotPrimary,
            AccessStatus::NotPrimary,
            true,
        )
    }

    fn with(
        role: ReplicaRole,
        write_status: AccessStatus,
        read_status: AccessStatus,
        readable: bool,
    ) -> Self {
        Self {
            inner: RwLock::new(StatusSnapshot {
                role,
                write_status,
                read_status,
                readable,
            }),
        }
    }

    /// Sets the replica role.
    pub fn set_role(&self, role: ReplicaRole) {
        self.inner.write().role = role;
    }

    /// Sets the write access status.
    pub fn set_write_status(&self, status: AccessStatus) {
        self.inner.write().write_status = status;
    }

    /// Sets the read access status.
    pub fn set_read_status(&self, status: AccessStatus) {
        self.inner.write().read_status = status;
    }

    /// Sets whether the replica reports itself readable.
    pub fn set_readable(&self, readable: bool) {
        self.inner.write().readable = readable;
    }

    /// Promotes this replica to a fully granted primary.
    pub fn promote(&self) {
        let mut inner = self.inner.write();
        inner.role = ReplicaRole::Primary;
        inner.write_status = AccessStatus::Granted;
        inner.read_status = AccessStatus::Granted;
        inner.readable = true;
    }

    /// Demotes this replica to a readable active secondary.
    pub fn demote(&self) {
        let mut inner = self.inner.write();
        inner.role = ReplicaRole::ActiveSecondary;
        inner.write_status = AccessStatus::NotPrimary;
        inner.read_status = AccessStatus::NotPrimary;
        inner.readable = true;
    }
}

impl Default for ReplicaStatus {
    fn default() -> Self {
        Self::primary()
    }
}

impl AdmissionGate for ReplicaStatus {
    fn role(&self) -> ReplicaRole {
        self.inner.read().role
    }

    fn write_status(&self) -> AccessStatus {
        self.inner.read().write_status
    }

    fn read_status(&self) -> AccessStatus {
        self.inner.read().read_status
    }

    fn is_readable(&self, _for_snapshot: bool) -> bool {
        self.inner.read().readable
    }
}
