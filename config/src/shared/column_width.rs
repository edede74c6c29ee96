use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Overrides for the default column width of record field types.
///
/// Keys are snake_case field type names (for example `calendar_date` or `single_choice`), values
/// are the maximum length of the string column created for fields of that type.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnWidthConfig {
    #[serde(default)]
    pub overrides: BTreeMap<String, u32>,
}

impl ColumnWidthConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some((field_type, _)) = self.overrides.iter().find(|(_, width)| **width == 0) {
            return Err(ValidationError::ColumnWidthZero(field_type.clone()));
        }

        Ok(())
    }
}
