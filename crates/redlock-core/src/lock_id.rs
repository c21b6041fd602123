//! Lock identity: what is locked, by whom, and for how long.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{LockError, LockResult};

/// Lease duration used when none is given explicitly.
pub const DEFAULT_LEASE_MILLIS: u64 = 5000;

/// Longest lease a node can store: `PX`/`PEXPIRE` take a signed 64-bit value.
pub const MAX_LEASE_MILLIS: u64 = i64::MAX as u64;

/// Identity of a single lease attempt.
///
/// A `LockId` is an immutable value. The owner token distinguishes this holder
/// from any other one: nodes only extend or delete a key whose stored value
/// equals the token. After a full release a holder rotates the token so that a
/// stale holder can never confirm or release a lease it no longer owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockId {
    resource: String,
    owner_token: Uuid,
    lease_millis: u64,
}

impl LockId {
    /// Creates a lock id with an explicit token and lease.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidLease`] when `lease_millis` is zero or
    /// above [`MAX_LEASE_MILLIS`].
    pub fn new(
        resource: impl Into<String>,
        owner_token: Uuid,
        lease_millis: u64,
    ) -> LockResult<Self> {
        if lease_millis == 0 {
            return Err(LockError::InvalidLease(
                "lease must be greater than zero".to_string(),
            ));
        }
        if lease_millis > MAX_LEASE_MILLIS {
            return Err(LockError::InvalidLease(format!(
                "lease of {lease_millis}ms exceeds the {MAX_LEASE_MILLIS}ms maximum"
            )));
        }

        Ok(Self {
            resource: resource.into(),
            owner_token,
            lease_millis,
        })
    }

    /// Creates a lock id for `resource` with a random token and the default lease.
    pub fn new_for(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            owner_token: Uuid::new_v4(),
            lease_millis: DEFAULT_LEASE_MILLIS,
        }
    }

    /// Creates a lock id for `resource` with a random token.
    pub fn with_lease(resource: impl Into<String>, lease: Duration) -> LockResult<Self> {
        let lease_millis = u64::try_from(lease.as_millis())
            .map_err(|_| LockError::InvalidLease(format!("lease of {lease:?} is too long")))?;
        Self::new(resource, Uuid::new_v4(), lease_millis)
    }

    /// Returns a copy carrying a different owner token.
    pub fn with_owner_token(&self, owner_token: Uuid) -> Self {
        Self {
            owner_token,
            ..self.clone()
        }
    }

    /// Returns a copy with a freshly generated owner token.
    pub fn rotated(&self) -> Self {
        self.with_owner_token(Uuid::new_v4())
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn owner_token(&self) -> Uuid {
        self.owner_token
    }

    pub fn lease_millis(&self) -> u64 {
        self.lease_millis
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_millis)
    }

}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource, self.owner_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_lease_is_rejected() {
        let result = LockId::new("resource", Uuid::new_v4(), 0);
        assert!(matches!(result, Err(LockError::InvalidLease(_))));
    }

    #[test]
    fn test_new_for_uses_default_lease() {
        let id = LockId::new_for("resource");
        assert_eq!(id.resource(), "resource");
        assert_eq!(id.lease_millis(), DEFAULT_LEASE_MILLIS);
        assert_eq!(id.lease(), Duration::from_secs(5));
    }

    #[test]
    fn test_rotation_keeps_resource_and_lease() {
        let id = LockId::new("resource", Uuid::new_v4(), 3000).unwrap();
        let rotated = id.rotated();

        assert_ne!(id.owner_token(), rotated.owner_token());
        assert_eq!(id.resource(), rotated.resource());
        assert_eq!(id.lease_millis(), rotated.lease_millis());
        assert_ne!(id, rotated);
    }

    #[test]
    fn test_with_owner_token() {
        let token = Uuid::new_v4();
        let id = LockId::new_for("resource").with_owner_token(token);
        assert_eq!(id.owner_token(), token);
    }

    #[test]
    fn test_oversized_lease_is_rejected() {
        let result = LockId::new("resource", Uuid::new_v4(), u64::MAX);
        assert!(matches!(result, Err(LockError::InvalidLease(_))));

        let result = LockId::with_lease("resource", Duration::MAX);
        assert!(matches!(result, Err(LockError::InvalidLease(_))));

        let largest = LockId::new("resource", Uuid::new_v4(), MAX_LEASE_MILLIS).unwrap();
        assert_eq!(largest.lease_millis(), i64::MAX as u64);
    }

    #[test]
    fn test_with_lease() {
        let id = LockId::with_lease("resource", Duration::from_millis(3000)).unwrap();
        assert_eq!(id.lease_millis(), 3000);
    }
}
