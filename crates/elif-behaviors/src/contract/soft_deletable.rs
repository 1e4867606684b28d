//! Soft-deletable capability

use chrono::{DateTime, SubsecRound, Utc};

use crate::entity::Entity;

/// Entity whose deletion is recorded as a timestamp instead of a removed row
pub trait SoftDeletable: Entity {
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn set_deleted_at(&mut self, deleted_at: Option<DateTime<Utc>>);

    /// Stamp the deletion time with microsecond precision
    fn delete(&mut self) {
        self.set_deleted_at(Some(Utc::now().trunc_subsecs(6)));
    }

    fn restore(&mut self) {
        self.set_deleted_at(None);
    }

    /// Deleted once the stamped time has been reached
    fn is_deleted(&self) -> bool {
        match self.deleted_at() {
            Some(deleted_at) => deleted_at <= Utc::now(),
            None => false,
        }
    }

    /// Whether the entity is (or will be) deleted at `at`; any stamp counts when `at` is `None`
    fn will_be_deleted(&self, at: Option<DateTime<Utc>>) -> bool {
        match (self.deleted_at(), at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(deleted_at), Some(at)) => deleted_at <= at,
        }
    }
}
