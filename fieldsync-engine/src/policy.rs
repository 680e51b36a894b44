//! The policy table — which fields may leave the device.
//!
//! Each entity kind carries a closed map of field name to
//! [`FieldPolicy`]. The table is built once at startup and validated
//! exhaustively, so an unlisted kind is a construction-time error
//! rather than a silent runtime fallback. A field that appears in data
//! but not in the table is fail-closed: retained locally, never
//! transmitted.

use crate::error::{SyncError, SyncResult};
use fieldsync_types::EntityKind;
use std::collections::{BTreeMap, HashMap};

/// Per-field sync rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPolicy {
    /// Whether the field may leave the device at all.
    pub sync: bool,
    /// Whether the field must be sealed before transit.
    pub encrypted: bool,
    /// Why this rule exists (shown in audits and logs).
    pub reason: &'static str,
}

impl FieldPolicy {
    /// A field that syncs in the clear.
    #[must_use]
    pub const fn syncable(reason: &'static str) -> Self {
        Self {
            sync: true,
            encrypted: false,
            reason,
        }
    }

    /// A field that syncs but must be sealed first.
    #[must_use]
    pub const fn encrypted(reason: &'static str) -> Self {
        Self {
            sync: true,
            encrypted: true,
            reason,
        }
    }

    /// A field that never leaves the device.
    #[must_use]
    pub const fn local_only(reason: &'static str) -> Self {
        Self {
            sync: false,
            encrypted: false,
            reason,
        }
    }
}

/// The fail-closed rule applied to any field absent from the table.
pub const FAIL_CLOSED: FieldPolicy = FieldPolicy::local_only("not listed in policy table");

/// Static declaration of which fields of which entity kinds may leave
/// the device. Immutable after construction.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: HashMap<EntityKind, BTreeMap<&'static str, FieldPolicy>>,
}

impl PolicyTable {
    /// Starts building a policy table.
    #[must_use]
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder {
            entries: HashMap::new(),
        }
    }

    /// Looks up the policy for a field. Absent entries fail closed.
    #[must_use]
    pub fn classify(&self, kind: EntityKind, field: &str) -> FieldPolicy {
        self.entries
            .get(&kind)
            .and_then(|fields| fields.get(field))
            .copied()
            .unwrap_or(FAIL_CLOSED)
    }

    /// Pure lookup: does this field require encryption in transit?
    #[must_use]
    pub fn requires_encryption(&self, kind: EntityKind, field: &str) -> bool {
        self.classify(kind, field).encrypted
    }

    /// The declared fields for a kind (for startup audits).
    pub fn fields_for(&self, kind: EntityKind) -> impl Iterator<Item = (&'static str, FieldPolicy)> + '_ {
        self.entries
            .get(&kind)
            .into_iter()
            .flat_map(|fields| fields.iter().map(|(name, policy)| (*name, *policy)))
    }
}

/// Builder that validates the table exhaustively before use.
pub struct PolicyTableBuilder {
    entries: HashMap<EntityKind, BTreeMap<&'static str, FieldPolicy>>,
}

impl PolicyTableBuilder {
    /// Declares the policy for one field of one kind.
    #[must_use]
    pub fn field(mut self, kind: EntityKind, name: &'static str, policy: FieldPolicy) -> Self {
        self.entries.entry(kind).or_default().insert(name, policy);
        self
    }

    /// Validates and freezes the table.
    ///
    /// Every entity kind must have at least one declared field, and the
    /// reserved `id`/`updatedAt` names must not be declared (they are
    /// identity and recency, carried on every snapshot implicitly).
    pub fn build(self) -> SyncResult<PolicyTable> {
        for kind in EntityKind::ALL {
            let fields = self.entries.get(&kind).ok_or_else(|| {
                SyncError::PolicyViolation {
                    kind,
                    field: "<no fields declared>".to_string(),
                }
            })?;
            for reserved in ["id", "updatedAt"] {
                if fields.contains_key(reserved) {
                    return Err(SyncError::PolicyViolation {
                        kind,
                        field: reserved.to_string(),
                    });
                }
            }
        }
        Ok(PolicyTable {
            entries: self.entries,
        })
    }
}

/// The built-in policy table for the field-operations domain.
///
/// PII and payroll data never leave the device; site access codes and
/// payment details sync only sealed.
pub fn field_ops_policy() -> PolicyTable {
    use EntityKind::*;

    PolicyTable::builder()
        // Customers
        .field(Customer, "name", FieldPolicy::syncable("shared contact info"))
        .field(Customer, "phone", FieldPolicy::syncable("shared contact info"))
        .field(Customer, "email", FieldPolicy::syncable("shared contact info"))
        .field(Customer, "address", FieldPolicy::syncable("crews need the site address"))
        .field(Customer, "ssn", FieldPolicy::local_only("PII never leaves the device"))
        .field(Customer, "payment_card", FieldPolicy::encrypted("card data sealed in transit"))
        .field(Customer, "site_gate_code", FieldPolicy::encrypted("site access code sealed in transit"))
        .field(Customer, "private_notes", FieldPolicy::local_only("office-only notes"))
        // Jobs
        .field(Job, "title", FieldPolicy::syncable("job identification"))
        .field(Job, "status", FieldPolicy::syncable("crews track progress"))
        .field(Job, "customer_id", FieldPolicy::syncable("links job to customer"))
        .field(Job, "site_address", FieldPolicy::syncable("crews need the site address"))
        .field(Job, "start_date", FieldPolicy::syncable("scheduling"))
        .field(Job, "photos", FieldPolicy::syncable("progress photo references"))
        .field(Job, "lockbox_code", FieldPolicy::encrypted("site access code sealed in transit"))
        .field(Job, "bid_margin", FieldPolicy::local_only("pricing stays in the office"))
        // Workers
        .field(Worker, "name", FieldPolicy::syncable("crew roster"))
        .field(Worker, "phone", FieldPolicy::syncable("crew roster"))
        .field(Worker, "role", FieldPolicy::syncable("crew roster"))
        .field(Worker, "certifications", FieldPolicy::syncable("site compliance checks"))
        .field(Worker, "hourly_rate", FieldPolicy::local_only("payroll stays local"))
        .field(Worker, "home_address", FieldPolicy::local_only("PII never leaves the device"))
        // Materials
        .field(Material, "name", FieldPolicy::syncable("inventory tracking"))
        .field(Material, "quantity", FieldPolicy::syncable("inventory tracking"))
        .field(Material, "unit", FieldPolicy::syncable("inventory tracking"))
        .field(Material, "supplier", FieldPolicy::syncable("reordering from the field"))
        .field(Material, "unit_cost", FieldPolicy::local_only("purchase pricing stays local"))
        // Invoices
        .field(Invoice, "number", FieldPolicy::syncable("invoice identification"))
        .field(Invoice, "customer_id", FieldPolicy::syncable("links invoice to customer"))
        .field(Invoice, "amount", FieldPolicy::syncable("field staff confirm totals"))
        .field(Invoice, "status", FieldPolicy::syncable("payment tracking"))
        .field(Invoice, "bank_account", FieldPolicy::encrypted("account details sealed in transit"))
        .field(Invoice, "internal_margin", FieldPolicy::local_only("pricing stays in the office"))
        .build()
        .expect("built-in policy table is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_builds() {
        let table = field_ops_policy();
        assert!(table.classify(EntityKind::Customer, "name").sync);
    }

    #[test]
    fn unknown_field_fails_closed() {
        let table = field_ops_policy();
        let policy = table.classify(EntityKind::Customer, "shoe_size");
        assert!(!policy.sync);
        assert!(!policy.encrypted);
    }

    #[test]
    fn missing_kind_is_a_build_error() {
        let result = PolicyTable::builder()
            .field(EntityKind::Customer, "name", FieldPolicy::syncable("x"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn reserved_names_are_rejected() {
        let mut builder = PolicyTable::builder();
        for kind in EntityKind::ALL {
            builder = builder.field(kind, "name", FieldPolicy::syncable("x"));
        }
        let result = builder
            .field(EntityKind::Job, "updatedAt", FieldPolicy::syncable("x"))
            .build();
        assert!(result.is_err());
    }
}
