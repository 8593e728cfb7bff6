//! Output column selections.
//!
//! A selection is written `object[:extract][/command,...]`, where the object
//! is a dotted path, a function call over paths and constants, or a constant:
//!
//! ```text
//! count(alert.source(0).node.address.address):year/group_by,order_desc
//! timezone(alert.create_time, '+02:00')
//! alert.additional_data('Ports').data
//! count(1)
//! ```

mod parser;

use std::fmt;

pub(crate) use parser::{lexeme_path, lexeme_quoted, to_error};
pub use parser::{parse_path, parse_selection};

use crate::criterion::escape_value;
use crate::error::{DataProviderError, Result};
use crate::value::{Value, ValueType};

/// Index attached to a repeated path segment.
#[derive(Debug, Clone, PartialEq)]
pub enum PathIndex {
    /// `source(0)`: the n-th element. Negative positions count from the end.
    Position(i64),
    /// `additional_data('Ports')`: the element whose indexation field equals the key.
    Key(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<PathIndex>,
}

/// A dotted, optionally indexed reference into a domain's namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<PathSegment>,
    pub key: Option<String>,
}

impl Path {
    pub fn parse(text: &str) -> Result<Path> {
        parse_path(text)
    }

    /// The domain prefix (first segment).
    pub fn domain(&self) -> &str {
        self.segments.first().map(|s| s.name.as_str()).unwrap_or_default()
    }

    /// Dotted form without indexes or key, e.g. `alert.source.node.name`.
    pub fn unindexed(&self) -> String {
        self.prefix(self.segments.len())
    }

    /// Dotted unindexed form of the first `n` segments.
    pub fn prefix(&self, n: usize) -> String {
        self.segments
            .iter()
            .take(n)
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Unindexed form without the domain, e.g. `source.node.name`.
    pub fn field(&self) -> String {
        self.segments
            .iter()
            .skip(1)
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Indexed segments as `(segment position, index)`.
    pub fn indexes(&self) -> impl Iterator<Item = (usize, &PathIndex)> {
        self.segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.index.as_ref().map(|idx| (i, idx)))
    }

    pub fn is_indexed(&self) -> bool {
        self.indexes().next().is_some()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.name)?;
            match &segment.index {
                Some(PathIndex::Position(n)) => write!(f, "({})", n)?,
                Some(PathIndex::Key(k)) => write!(f, "('{}')", escape_value(k))?,
                None => {}
            }
        }
        if let Some(key) = &self.key {
            write!(f, "['{}']", escape_value(key))?;
        }
        Ok(())
    }
}

/// Functions available in selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Count,
    CountDistinct,
    Min,
    Max,
    Sum,
    Avg,
    Distinct,
    Timezone,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "count" => Function::Count,
            "count_distinct" => Function::CountDistinct,
            "min" => Function::Min,
            "max" => Function::Max,
            "sum" => Function::Sum,
            "avg" => Function::Avg,
            "distinct" => Function::Distinct,
            "timezone" => Function::Timezone,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Count => "count",
            Function::CountDistinct => "count_distinct",
            Function::Min => "min",
            Function::Max => "max",
            Function::Sum => "sum",
            Function::Avg => "avg",
            Function::Distinct => "distinct",
            Function::Timezone => "timezone",
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Function::Count
                | Function::CountDistinct
                | Function::Min
                | Function::Max
                | Function::Sum
                | Function::Avg
        )
    }
}

/// Time-extraction units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extract {
    Year,
    Quarter,
    Month,
    Yday,
    Mday,
    Wday,
    Hour,
    Min,
    Sec,
    Msec,
    Usec,
}

impl Extract {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "year" => Extract::Year,
            "quarter" => Extract::Quarter,
            "month" => Extract::Month,
            "yday" => Extract::Yday,
            "mday" => Extract::Mday,
            "wday" => Extract::Wday,
            "hour" => Extract::Hour,
            "min" => Extract::Min,
            "sec" => Extract::Sec,
            "msec" => Extract::Msec,
            "usec" => Extract::Usec,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Extract::Year => "year",
            Extract::Quarter => "quarter",
            Extract::Month => "month",
            Extract::Yday => "yday",
            Extract::Mday => "mday",
            Extract::Wday => "wday",
            Extract::Hour => "hour",
            Extract::Min => "min",
            Extract::Sec => "sec",
            Extract::Msec => "msec",
            Extract::Usec => "usec",
        }
    }

    /// Coarseness rank; lower is coarser.
    pub fn rank(&self) -> u8 {
        match self {
            Extract::Year => 0,
            Extract::Quarter => 1,
            Extract::Month => 2,
            Extract::Yday | Extract::Mday | Extract::Wday => 3,
            Extract::Hour => 4,
            Extract::Min => 5,
            Extract::Sec => 6,
            Extract::Msec => 7,
            Extract::Usec => 8,
        }
    }

    /// Bucket width matching this unit.
    pub fn step(&self) -> TimeStep {
        match self {
            Extract::Year => TimeStep::Year,
            Extract::Quarter => TimeStep::Quarter,
            Extract::Month => TimeStep::Month,
            Extract::Yday | Extract::Mday | Extract::Wday => TimeStep::Day,
            Extract::Hour => TimeStep::Hour,
            Extract::Min => TimeStep::Minute,
            Extract::Sec => TimeStep::Second,
            Extract::Msec => TimeStep::Millisecond,
            Extract::Usec => TimeStep::Microsecond,
        }
    }
}

/// Fixed-width time interval used for time-series buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeStep {
    Year,
    Quarter,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GroupBy,
    OrderAsc,
    OrderDesc,
}

impl Command {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "group_by" => Command::GroupBy,
            "order_asc" => Command::OrderAsc,
            "order_desc" => Command::OrderDesc,
            _ => return None,
        })
    }
}

/// The object of a selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionValue {
    Path(Path),
    Function {
        function: Function,
        args: Vec<SelectionValue>,
    },
    Constant(Value),
}

impl SelectionValue {
    /// Build a function call, folding `count(distinct(x))` into `count_distinct(x)`.
    pub fn function(function: Function, mut args: Vec<SelectionValue>) -> SelectionValue {
        if function == Function::Count && args.len() == 1 {
            if let SelectionValue::Function {
                function: Function::Distinct,
                args: inner,
            } = &mut args[0]
            {
                let inner = std::mem::take(inner);
                return SelectionValue::Function {
                    function: Function::CountDistinct,
                    args: inner,
                };
            }
        }
        SelectionValue::Function { function, args }
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a Path>) {
        match self {
            SelectionValue::Path(p) => out.push(p),
            SelectionValue::Function { args, .. } => args.iter().for_each(|a| a.collect_paths(out)),
            SelectionValue::Constant(_) => {}
        }
    }

    fn return_type(&self, path_type: &mut dyn FnMut(&Path) -> Result<ValueType>) -> Result<ValueType> {
        match self {
            SelectionValue::Path(p) => path_type(p),
            SelectionValue::Constant(Value::Int(_)) => Ok(ValueType::Int),
            SelectionValue::Constant(Value::Float(_)) => Ok(ValueType::Float),
            SelectionValue::Constant(_) => Ok(ValueType::Text),
            SelectionValue::Function { function, args } => match function {
                Function::Count | Function::CountDistinct => Ok(ValueType::Int),
                Function::Avg => Ok(ValueType::Float),
                Function::Timezone => Ok(ValueType::Time),
                Function::Min | Function::Max | Function::Sum | Function::Distinct => match args.first() {
                    Some(arg) => arg.return_type(path_type),
                    None => Ok(ValueType::Text),
                },
            },
        }
    }
}

impl fmt::Display for SelectionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionValue::Path(p) => write!(f, "{}", p),
            SelectionValue::Constant(Value::Text(s)) => write!(f, "'{}'", escape_value(s)),
            SelectionValue::Constant(v) => write!(f, "{}", v),
            SelectionValue::Function { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One requested output column.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionObject {
    /// Source text the selection was parsed from.
    pub raw: String,
    pub object: SelectionValue,
    pub extract: Option<Extract>,
    pub commands: Vec<Command>,
}

impl SelectionObject {
    pub fn parse(text: &str) -> Result<SelectionObject> {
        parse_selection(text)
    }

    /// Every path referenced by the object, in order.
    pub fn paths(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.object.collect_paths(&mut out);
        out
    }

    /// The first referenced path.
    pub fn path(&self) -> Option<&Path> {
        self.paths().into_iter().next()
    }

    /// The outermost function, if any.
    pub fn function(&self) -> Option<Function> {
        match &self.object {
            SelectionValue::Function { function, .. } => Some(*function),
            _ => None,
        }
    }

    /// Function arguments of the outermost call.
    pub fn function_args(&self) -> &[SelectionValue] {
        match &self.object {
            SelectionValue::Function { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.function().is_some_and(|f| f.is_aggregate())
    }

    pub fn is_group_by(&self) -> bool {
        self.commands.contains(&Command::GroupBy)
    }

    pub fn order(&self) -> Option<SortOrder> {
        self.commands.iter().find_map(|c| match c {
            Command::OrderAsc => Some(SortOrder::Asc),
            Command::OrderDesc => Some(SortOrder::Desc),
            Command::GroupBy => None,
        })
    }

    /// Column type: extraction yields integers, functions follow their own rules,
    /// bare paths take the domain type.
    pub fn return_type(&self, path_type: &mut dyn FnMut(&Path) -> Result<ValueType>) -> Result<ValueType> {
        let inner = self.object.return_type(path_type)?;
        Ok(if self.extract.is_some() { ValueType::Int } else { inner })
    }

    pub(crate) fn validate(self) -> Result<Self> {
        let asc = self.commands.contains(&Command::OrderAsc);
        let desc = self.commands.contains(&Command::OrderDesc);
        if asc && desc {
            return Err(DataProviderError::Parse {
                position: self.raw.find('/').unwrap_or_default(),
                input: self.raw,
                message: "order_asc and order_desc are mutually exclusive".into(),
            });
        }
        Ok(self)
    }
}

impl fmt::Display for SelectionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.object)?;
        if let Some(extract) = self.extract {
            write!(f, ":{}", extract.name())?;
        }
        if !self.commands.is_empty() {
            let names: Vec<_> = self
                .commands
                .iter()
                .map(|c| match c {
                    Command::GroupBy => "group_by",
                    Command::OrderAsc => "order_asc",
                    Command::OrderDesc => "order_desc",
                })
                .collect();
            write!(f, "/{}", names.join(","))?;
        }
        Ok(())
    }
}
