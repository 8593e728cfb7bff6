use crate::config::DomainSettings;
use crate::error::{DataProviderError, Result};
use crate::value::ValueType;

use super::{PathCatalog, TimeField, TypeHandler};

/// Handler built from a path table, with no domain-specific criterion rules.
#[derive(Debug)]
pub struct GenericHandler {
    name: String,
    catalog: PathCatalog,
    time_field: TimeField,
}

impl GenericHandler {
    pub fn new<'a>(
        name: impl Into<String>,
        time_field: TimeField,
        paths: impl IntoIterator<Item = (&'a str, ValueType)>,
    ) -> Self {
        Self {
            name: name.into(),
            catalog: PathCatalog::with_paths(paths),
            time_field,
        }
    }

    pub fn from_settings(name: &str, settings: &DomainSettings) -> Result<Self> {
        let time_field = match (&settings.time_field, settings.time_interval.as_slice()) {
            (Some(field), []) => TimeField::Instant(field.clone()),
            (None, [start, end]) => TimeField::Interval {
                start: start.clone(),
                end: end.clone(),
            },
            _ => {
                return Err(DataProviderError::invalid_parameter(
                    name,
                    "declare either time_field or a two-entry time_interval",
                ))
            }
        };

        let mut paths = Vec::with_capacity(settings.paths.len());
        for (path, type_name) in &settings.paths {
            let value_type = ValueType::from_name(type_name).ok_or_else(|| {
                DataProviderError::invalid_parameter(path, format!("unknown type '{}'", type_name))
            })?;
            if !path.starts_with(&format!("{}.", name)) {
                return Err(DataProviderError::InvalidPath(path.clone()));
            }
            paths.push((path.as_str(), value_type));
        }

        Ok(Self::new(name, time_field, paths))
    }
}

impl TypeHandler for GenericHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn catalog(&self) -> &PathCatalog {
        &self.catalog
    }

    fn time_field(&self) -> &TimeField {
        &self.time_field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Path;

    fn session() -> GenericHandler {
        GenericHandler::new(
            "session",
            TimeField::Interval {
                start: "start_time".into(),
                end: "end_time".into(),
            },
            [
                ("session.user", ValueType::Text),
                ("session.start_time", ValueType::Time),
                ("session.end_time", ValueType::Time),
            ],
        )
    }

    #[test]
    fn test_composite_time_field_is_time() {
        let handler = session();
        let path = Path::parse("session._timeline").unwrap();
        assert_eq!(handler.path_type(&path).unwrap(), ValueType::Time);
    }

    #[test]
    fn test_parse_paths_types() {
        let handler = session();
        let (selections, types) = handler
            .parse_paths(&["count(1)", "session.user/group_by", "{backend}.{time_field}"])
            .unwrap();
        assert_eq!(selections.len(), 3);
        assert_eq!(types, vec![ValueType::Int, ValueType::Text, ValueType::Time]);
        assert_eq!(selections[2].path().unwrap().unindexed(), "session.start_time");
    }

    #[test]
    fn test_unknown_path() {
        let handler = session();
        let err = handler.parse_paths(&["session.nope"]).unwrap_err();
        assert!(matches!(err, DataProviderError::InvalidPath(_)));
    }
}
