//! Custom field definitions

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::CustomFieldId;

/// A user-defined task attribute. Tasks store values keyed by its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CustomField {
    pub(crate) id: CustomFieldId,
    pub name: String,
}

impl CustomField {
    pub(crate) fn new(id: CustomFieldId) -> Self {
        Self {
            id,
            name: String::new(),
        }
    }

    pub(crate) fn with_name(id: CustomFieldId, name: String) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> CustomFieldId {
        self.id
    }
}

impl Ord for CustomField {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for CustomField {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_by_name_then_id() {
        let mut fields = vec![
            CustomField::with_name(CustomFieldId(1), "project".to_string()),
            CustomField::with_name(CustomFieldId(3), "client".to_string()),
            CustomField::with_name(CustomFieldId(2), "client".to_string()),
        ];
        fields.sort();

        let ids: Vec<_> = fields.iter().map(CustomField::id).collect();
        assert_eq!(ids, vec![CustomFieldId(2), CustomFieldId(3), CustomFieldId(1)]);
    }
}
