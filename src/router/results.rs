//! Query results handed back to callers.

use std::ops::Range;
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::backend::Record;
use crate::error::Result;
use crate::value::{Value, ValueType};

use super::hooks::HookChain;

/// Rows of a value query.
///
/// Backend rows are kept as returned. A row is cast to the column types and
/// passed through the read hooks the first time it is accessed, then cached.
pub struct RowSequence {
    columns: Vec<String>,
    types: Vec<ValueType>,
    raw: Vec<Vec<Value>>,
    rows: Vec<OnceCell<Vec<Value>>>,
    total: Option<u64>,
    duration: Duration,
    hooks: HookChain,
}

impl std::fmt::Debug for RowSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSequence")
            .field("columns", &self.columns)
            .field("len", &self.raw.len())
            .field("total", &self.total)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl RowSequence {
    pub(crate) fn new(
        columns: Vec<String>,
        types: Vec<ValueType>,
        raw: Vec<Vec<Value>>,
        total: Option<u64>,
        duration: Duration,
        hooks: HookChain,
    ) -> Self {
        let rows = raw.iter().map(|_| OnceCell::new()).collect();
        Self {
            columns,
            types,
            raw,
            rows,
            total,
            duration,
            hooks,
        }
    }

    /// Hook path of each column: the selected path, or the selection text for path-less columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn types(&self) -> &[ValueType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Matches reported by the engine, falling back to the number of rows returned.
    pub fn total_count(&self) -> u64 {
        self.total.unwrap_or(self.raw.len() as u64)
    }

    /// Wall time spent compiling and executing the query.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Row `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Result<Option<&[Value]>> {
        let Some(cell) = self.rows.get(index) else {
            return Ok(None);
        };
        let row = cell.get_or_try_init(|| self.materialize(&self.raw[index]))?;
        Ok(Some(row.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<&[Value]>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i).transpose())
    }

    /// Rows in `range`, clamped to the sequence bounds.
    pub fn slice(&self, range: Range<usize>) -> Result<Vec<&[Value]>> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        (start..end).filter_map(|i| self.get(i).transpose()).collect()
    }

    fn materialize(&self, raw: &[Value]) -> Result<Vec<Value>> {
        let mut row = Vec::with_capacity(raw.len());
        for (i, value) in raw.iter().enumerate() {
            let value_type = self.types.get(i).copied().unwrap_or(ValueType::Opaque);
            let mut value = value.clone().cast(value_type)?;
            if !value.is_null() {
                if let Some(column) = self.columns.get(i) {
                    self.hooks.on_read(column, &mut value)?;
                }
            }
            row.push(value);
        }
        Ok(row)
    }
}

/// One stored object returned by `get`, read through the hooks.
pub struct ResultObject {
    record: Record,
    hooks: HookChain,
}

impl std::fmt::Debug for ResultObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ResultObject").field(&self.record).finish()
    }
}

impl ResultObject {
    pub(crate) fn new(record: Record, hooks: HookChain) -> Self {
        Self { record, hooks }
    }

    /// Value at a full dotted path such as `log.message`.
    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        let Some(value) = self.record.get(path) else {
            return Ok(None);
        };
        let mut value = value.clone();
        if !value.is_null() {
            self.hooks.on_read(path, &mut value)?;
        }
        Ok(Some(value))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.record.keys().map(String::as_str)
    }

    /// The stored values, without hooks.
    pub fn into_record(self) -> Record {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataProviderError;
    use crate::router::ValueHook;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        reads: AtomicUsize,
    }

    impl ValueHook for Counting {
        fn on_read(&self, _path: &str, value: &mut Value) -> Result<()> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Value::Text(s) = value {
                s.push('!');
            }
            Ok(())
        }
    }

    fn sequence(raw: Vec<Vec<Value>>, hook: Arc<Counting>) -> RowSequence {
        let mut hooks = HookChain::default();
        hooks.push(hook);
        RowSequence::new(
            vec!["alert.name".into(), "count(1)".into()],
            vec![ValueType::Text, ValueType::Int],
            raw,
            None,
            Duration::from_millis(3),
            hooks,
        )
    }

    #[test]
    fn test_rows_cast_and_cache() {
        let hook = Arc::new(Counting::default());
        let rows = sequence(
            vec![
                vec![Value::from("a"), Value::from("12")],
                vec![Value::Null, Value::Float(2.0)],
            ],
            hook.clone(),
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows.total_count(), 2);
        assert_eq!(rows.get(0).unwrap().unwrap(), &[Value::from("a!"), Value::Int(12)][..]);
        assert_eq!(rows.get(1).unwrap().unwrap(), &[Value::Null, Value::Int(2)][..]);
        assert!(rows.get(2).unwrap().is_none());

        let reads = hook.reads.load(Ordering::SeqCst);
        rows.get(0).unwrap();
        assert_eq!(hook.reads.load(Ordering::SeqCst), reads);
    }

    #[test]
    fn test_slice_clamps() {
        let rows = sequence(
            (0..5).map(|i| vec![Value::from("x"), Value::Int(i)]).collect(),
            Arc::new(Counting::default()),
        );
        let slice = rows.slice(3..10).unwrap();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0][1], Value::Int(3));
        assert!(rows.slice(7..9).unwrap().is_empty());
        assert_eq!(rows.iter().count(), 5);
    }

    #[test]
    fn test_cast_failure_surfaces() {
        let rows = sequence(
            vec![vec![Value::from("a"), Value::from("many")]],
            Arc::new(Counting::default()),
        );
        assert!(matches!(rows.get(0), Err(DataProviderError::Conversion { .. })));
    }

    #[test]
    fn test_result_object_reads_through_hooks() {
        let mut hooks = HookChain::default();
        hooks.push(Arc::new(Counting::default()));
        let record: Record = [("log.message".to_string(), Value::from("hi"))].into_iter().collect();
        let object = ResultObject::new(record, hooks);

        assert_eq!(object.get("log.message").unwrap(), Some(Value::from("hi!")));
        assert_eq!(object.get("log.host").unwrap(), None);
        assert_eq!(object.paths().collect::<Vec<_>>(), vec!["log.message"]);
    }
}
