//! Append-only movement history.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use asrs_core::{AuditEntryId, CompartmentId, DomainError, ItemId};

/// Kind of movement recorded against a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// A unit was stocked into an empty compartment.
    Added,
    /// A unit was removed outside of an order.
    Retrieved,
    /// A unit was released to satisfy an order line.
    Ordered,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Added => "added",
            AuditAction::Retrieved => "retrieved",
            AuditAction::Ordered => "ordered",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(AuditAction::Added),
            "retrieved" => Ok(AuditAction::Retrieved),
            "ordered" => Ok(AuditAction::Ordered),
            other => Err(DomainError::validation(format!(
                "unknown audit action '{other}'"
            ))),
        }
    }
}

/// A persisted audit record. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub item_id: Option<ItemId>,
    pub compartment_id: Option<CompartmentId>,
    pub action: AuditAction,
    pub recorded_at: DateTime<Utc>,
}

/// An audit record before the store has assigned its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub item_id: Option<ItemId>,
    pub compartment_id: Option<CompartmentId>,
    pub action: AuditAction,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, item_id: ItemId, compartment_id: CompartmentId) -> Self {
        Self {
            item_id: Some(item_id),
            compartment_id: Some(compartment_id),
            action,
        }
    }

    pub fn ordered(item_id: ItemId, compartment_id: CompartmentId) -> Self {
        Self::new(AuditAction::Ordered, item_id, compartment_id)
    }

    pub fn added(item_id: ItemId, compartment_id: CompartmentId) -> Self {
        Self::new(AuditAction::Added, item_id, compartment_id)
    }

    pub fn retrieved(item_id: ItemId, compartment_id: CompartmentId) -> Self {
        Self::new(AuditAction::Retrieved, item_id, compartment_id)
    }

    /// The persisted form. Only stores call this, at append time.
    pub fn stamp(self, id: AuditEntryId, recorded_at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id,
            item_id: self.item_id,
            compartment_id: self.compartment_id,
            action: self.action,
            recorded_at,
        }
    }
}

/// Read-side filter over the audit log. Empty fields match everything;
/// `from` and `to` are both inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub item_id: Option<ItemId>,
    pub compartment_id: Option<CompartmentId>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_item(item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            ..Self::default()
        }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn compartment(mut self, compartment_id: CompartmentId) -> Self {
        self.compartment_id = Some(compartment_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `limit` is applied by the caller after ordering, not here.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.item_id.is_some() && entry.item_id != self.item_id {
            return false;
        }
        if self.compartment_id.is_some() && entry.compartment_id != self.compartment_id {
            return false;
        }
        if self.action.is_some_and(|a| a != entry.action) {
            return false;
        }
        if self.from.is_some_and(|from| entry.recorded_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.recorded_at > to) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn entry(id: i64, action: AuditAction, item: i64, hour: u32) -> AuditEntry {
        NewAuditEntry::new(action, ItemId::new(item), CompartmentId::new(id))
            .stamp(AuditEntryId::new(id), at(hour))
    }

    #[test]
    fn actions_use_lowercase_labels() {
        assert_eq!(AuditAction::Ordered.as_str(), "ordered");
        assert_eq!("retrieved".parse::<AuditAction>().unwrap(), AuditAction::Retrieved);
        assert!("Ordered".parse::<AuditAction>().is_err());
        assert_eq!(serde_json::to_string(&AuditAction::Added).unwrap(), "\"added\"");
    }

    #[test]
    fn date_range_is_inclusive_at_both_ends() {
        let filter = AuditFilter::between(at(9), at(17));
        assert!(filter.matches(&entry(1, AuditAction::Ordered, 1, 9)));
        assert!(filter.matches(&entry(2, AuditAction::Ordered, 1, 17)));
        assert!(!filter.matches(&entry(3, AuditAction::Ordered, 1, 18)));

        let just_before = AuditEntry {
            recorded_at: at(9) - Duration::seconds(1),
            ..entry(4, AuditAction::Ordered, 1, 9)
        };
        assert!(!filter.matches(&just_before));
    }

    #[test]
    fn filters_combine() {
        let filter = AuditFilter::for_item(ItemId::new(1)).action(AuditAction::Added);
        assert!(filter.matches(&entry(1, AuditAction::Added, 1, 10)));
        assert!(!filter.matches(&entry(2, AuditAction::Ordered, 1, 10)));
        assert!(!filter.matches(&entry(3, AuditAction::Added, 2, 10)));

        let by_compartment = AuditFilter::all().compartment(CompartmentId::new(7));
        assert!(by_compartment.matches(&entry(7, AuditAction::Retrieved, 3, 1)));
        assert!(!by_compartment.matches(&entry(8, AuditAction::Retrieved, 3, 1)));
    }
}
