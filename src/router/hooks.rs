//! Value interception points for collaborators that rewrite data in flight.

use std::sync::Arc;

use crate::criterion::Criterion;
use crate::error::Result;
use crate::value::Value;

/// Hook consulted on every value crossing the router.
///
/// All methods default to doing nothing, so an implementation only overrides
/// the direction it cares about.
pub trait ValueHook: Send + Sync {
    /// Called with the raw criteria of a query before the domain compiles them.
    fn on_criteria(&self, _domain: &str, _criteria: &mut Criterion) -> Result<()> {
        Ok(())
    }

    /// Called for each value written: criterion values and inserted or updated data.
    fn on_write(&self, _path: &str, _value: &mut Value) -> Result<()> {
        Ok(())
    }

    /// Called for each value read back, after it was cast to its column type.
    fn on_read(&self, _path: &str, _value: &mut Value) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of hooks, shared with the row sequences it produced.
#[derive(Clone, Default)]
pub(crate) struct HookChain {
    hooks: Vec<Arc<dyn ValueHook>>,
}

impl HookChain {
    pub(crate) fn push(&mut self, hook: Arc<dyn ValueHook>) {
        self.hooks.push(hook);
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    pub(crate) fn on_criteria(&self, domain: &str, mut criteria: Criterion) -> Result<Criterion> {
        for hook in &self.hooks {
            hook.on_criteria(domain, &mut criteria)?;
        }
        Ok(criteria)
    }

    pub(crate) fn on_write(&self, path: &str, value: &mut Value) -> Result<()> {
        for hook in &self.hooks {
            hook.on_write(path, value)?;
        }
        Ok(())
    }

    pub(crate) fn on_read(&self, path: &str, value: &mut Value) -> Result<()> {
        for hook in &self.hooks {
            hook.on_read(path, value)?;
        }
        Ok(())
    }

    /// Pass every leaf value of `criteria` through `on_write`.
    pub(crate) fn write_criteria(&self, criteria: &Criterion) -> Result<Criterion> {
        if self.hooks.is_empty() {
            return Ok(criteria.clone());
        }
        criteria.map_leaves(&mut |leaf| {
            let mut leaf = leaf.clone();
            self.on_write(&leaf.path, &mut leaf.value)?;
            Ok(Criterion::Leaf(leaf))
        })
    }
}
