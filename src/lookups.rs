//! Reference dimensions, loaded once at startup and shared read-only.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::database::{LookupRows, Store, StoreError};
use crate::models::{DonationStatus, LookupEntry, NotificationKind, Role};

pub const CATEGORIES: &[&str] = &[
    "Tops",
    "Bottoms",
    "Outerwear",
    "Shoes",
    "Dresses",
    "Accessories",
    "Bags",
    "Jewelry",
    "Activewear",
    "Swimwear",
    "Suits & Blazers",
];

pub const COLOURS: &[&str] = &[
    "Black",
    "Blue",
    "White",
    "Multi-colour",
    "Red",
    "Green",
    "Yellow",
    "Pink",
    "Purple",
    "Grey",
    "Brown",
    "Beige",
    "Orange",
    "Gold",
    "Silver",
];

pub const MATERIALS: &[&str] = &[
    "Cotton", "Denim", "Polyester", "Wool", "Silk", "Linen", "Leather", "Nylon", "Spandex",
    "Rayon", "Cashmere", "Velvet", "Suede", "Bamboo", "Hemp", "Fleece", "Satin", "Corduroy",
];

pub const CONDITIONS: &[&str] = &[
    "New with Tags",
    "Like New",
    "Good",
    "Fair",
    "New without Tags",
    "Heavily Used / Poor",
];

pub const GENDERS: &[&str] = &["Mens", "Womens", "Kids", "Unisex"];

pub const SIZES: &[&str] = &["S", "M", "L", "XL", "XXL", "3XL", "4XL"];

fn numbered(names: &[&str]) -> Vec<LookupEntry> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| LookupEntry::new(i as i32 + 1, *name))
        .collect()
}

/// Same rows the initial migration inserts.
pub fn seed_rows() -> LookupRows {
    LookupRows {
        roles: Role::ALL
            .iter()
            .map(|r| LookupEntry::new(r.id(), r.name()))
            .collect(),
        statuses: DonationStatus::ALL
            .iter()
            .map(|s| LookupEntry::new(s.id(), s.name()))
            .collect(),
        categories: numbered(CATEGORIES),
        colours: numbered(COLOURS),
        materials: numbered(MATERIALS),
        conditions: numbered(CONDITIONS),
        genders: numbered(GENDERS),
        sizes: numbered(SIZES),
        notification_types: NotificationKind::ALL
            .iter()
            .enumerate()
            .map(|(i, k)| LookupEntry::new(i as i32 + 1, k.tag()))
            .collect(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{dimension} is missing \"{name}\"")]
    Missing {
        dimension: &'static str,
        name: &'static str,
    },
    #[error("{dimension} \"{name}\" has id {found}, expected {expected}")]
    IdMismatch {
        dimension: &'static str,
        name: &'static str,
        expected: i32,
        found: i32,
    },
    #[error("{0} has no entries")]
    Empty(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One dimension, addressable by id and by name.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    by_id: BTreeMap<i32, String>,
    by_name: HashMap<String, i32>,
}

impl LookupTable {
    fn from_entries(entries: Vec<LookupEntry>) -> Self {
        let mut table = LookupTable::default();
        for entry in entries {
            table.by_name.insert(entry.name.clone(), entry.id);
            table.by_id.insert(entry.id, entry.name);
        }
        table
    }

    pub fn name_of(&self, id: i32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn entries(&self) -> Vec<LookupEntry> {
        self.by_id
            .iter()
            .map(|(id, name)| LookupEntry::new(*id, name.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub roles: LookupTable,
    pub statuses: LookupTable,
    pub categories: LookupTable,
    pub colours: LookupTable,
    pub materials: LookupTable,
    pub conditions: LookupTable,
    pub genders: LookupTable,
    pub sizes: LookupTable,
    pub notification_types: LookupTable,
}

/// Form-population payload for `GET /donation-options`.
#[derive(Debug, Serialize)]
pub struct DonationOptions {
    pub categories: Vec<LookupEntry>,
    pub colours: Vec<LookupEntry>,
    pub materials: Vec<LookupEntry>,
    pub conditions: Vec<LookupEntry>,
    pub genders: Vec<LookupEntry>,
    pub sizes: Vec<LookupEntry>,
    pub statuses: Vec<LookupEntry>,
}

fn expect_id(
    table: &LookupTable,
    dimension: &'static str,
    name: &'static str,
    expected: i32,
) -> Result<(), LookupError> {
    match table.id_of(name) {
        Some(found) if found == expected => Ok(()),
        Some(found) => Err(LookupError::IdMismatch {
            dimension,
            name,
            expected,
            found,
        }),
        None => Err(LookupError::Missing { dimension, name }),
    }
}

impl Lookups {
    pub async fn load(store: &dyn Store) -> Result<Self, LookupError> {
        let mut tx = store.begin().await?;
        let rows = tx.load_lookups().await?;
        Self::from_rows(rows)
    }

    /// Builds the maps and checks them against the ids the code relies on.
    pub fn from_rows(rows: LookupRows) -> Result<Self, LookupError> {
        let lookups = Lookups {
            roles: LookupTable::from_entries(rows.roles),
            statuses: LookupTable::from_entries(rows.statuses),
            categories: LookupTable::from_entries(rows.categories),
            colours: LookupTable::from_entries(rows.colours),
            materials: LookupTable::from_entries(rows.materials),
            conditions: LookupTable::from_entries(rows.conditions),
            genders: LookupTable::from_entries(rows.genders),
            sizes: LookupTable::from_entries(rows.sizes),
            notification_types: LookupTable::from_entries(rows.notification_types),
        };

        for role in Role::ALL {
            expect_id(&lookups.roles, "roles", role.name(), role.id())?;
        }
        for status in DonationStatus::ALL {
            expect_id(&lookups.statuses, "statuses", status.name(), status.id())?;
        }
        if lookups.categories.is_empty() {
            return Err(LookupError::Empty("categories"));
        }
        if lookups.sizes.is_empty() {
            return Err(LookupError::Empty("sizes"));
        }
        for kind in NotificationKind::ALL {
            if lookups.notification_types.id_of(kind.tag()).is_none() {
                tracing::warn!(
                    "Notification type {} is not seeded; those notifications will be skipped",
                    kind.tag()
                );
            }
        }

        Ok(lookups)
    }

    pub fn notification_type_id(&self, tag: &str) -> Option<i32> {
        self.notification_types.id_of(tag)
    }

    pub fn status_name(&self, status_id: i32) -> Option<&str> {
        self.statuses.name_of(status_id)
    }

    pub fn donation_options(&self) -> DonationOptions {
        DonationOptions {
            categories: self.categories.entries(),
            colours: self.colours.entries(),
            materials: self.materials.entries(),
            conditions: self.conditions.entries(),
            genders: self.genders.entries(),
            sizes: self.sizes.entries(),
            statuses: self.statuses.entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_rows_validate() {
        let lookups = Lookups::from_rows(seed_rows()).unwrap();
        assert_eq!(lookups.categories.id_of("Outerwear"), Some(3));
        assert_eq!(lookups.categories.name_of(1), Some("Tops"));
        assert_eq!(lookups.status_name(3), Some("Received at Charity"));
        assert!(lookups.notification_type_id("DONATION_MILESTONE").is_some());
    }

    #[test]
    fn mismatched_status_id_is_rejected() {
        let mut rows = seed_rows();
        rows.statuses.retain(|s| s.id != 5);
        rows.statuses.push(LookupEntry::new(6, "Rejected"));
        let err = Lookups::from_rows(rows).unwrap_err();
        assert!(matches!(err, LookupError::IdMismatch { expected: 5, found: 6, .. }));
    }

    #[test]
    fn missing_role_is_rejected() {
        let mut rows = seed_rows();
        rows.roles.retain(|r| r.id != 2);
        assert!(matches!(
            Lookups::from_rows(rows),
            Err(LookupError::Missing { name: "Charity Staff", .. })
        ));
    }

    #[test]
    fn missing_notification_type_is_tolerated() {
        let mut rows = seed_rows();
        rows.notification_types.clear();
        let lookups = Lookups::from_rows(rows).unwrap();
        assert_eq!(lookups.notification_type_id("SYSTEM_ALERT"), None);
    }
}
