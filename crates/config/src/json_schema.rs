//! JSON Schema export for the config file format.

use crate::InstrumentationConfig;
use schemars::{Schema, schema_for};

/// JSON Schema for `InstrumentationConfig`.
#[must_use]
pub fn instrumentation_config_schema() -> Schema {
    schema_for!(InstrumentationConfig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_top_level_sections() -> Result<(), serde_json::Error> {
        let schema = serde_json::to_value(instrumentation_config_schema())?;
        let properties = schema.get("properties").cloned().unwrap_or_default();
        for section in ["version", "metrics", "dispatcher", "caches", "sinks", "logging"] {
            assert!(properties.get(section).is_some(), "missing {section}");
        }
        Ok(())
    }
}
