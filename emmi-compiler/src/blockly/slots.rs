use std::collections::{HashMap, HashSet};

use crate::error::CompileError;
use crate::ir::ast::{MAX_SLOTS, VarRef, VarType};

/// Display name to `{type, slot}` for one export pass.
///
/// A name spelled like a slot token (`F2`) is that slot, whatever type the
/// reference asks for. Other names get the lowest free slot of the requested
/// type in first-reference order. A name keeps the slot it got first.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: HashMap<String, VarRef>,
    taken: HashSet<VarRef>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<VarRef> {
        self.slots.get(name).copied()
    }

    /// Claims the slot a slot-token name spells. Must run before any
    /// [`SlotTable::resolve`] so that plain names cannot take it first.
    pub fn reserve(&mut self, name: &str) -> Option<VarRef> {
        if let Some(existing) = self.get(name) {
            return Some(existing);
        }
        let var = VarRef::parse(name)?;
        self.claim(name, var);
        Some(var)
    }

    pub fn resolve(&mut self, name: &str, requested: VarType) -> Result<VarRef, CompileError> {
        if let Some(var) = self.reserve(name) {
            return Ok(var);
        }
        let free = (1..=MAX_SLOTS)
            .filter_map(|slot| VarRef::new(requested, slot))
            .find(|var| !self.taken.contains(var));
        let Some(var) = free else {
            return Err(CompileError::SlotExhausted { var_type: requested, max: MAX_SLOTS });
        };
        self.claim(name, var);
        Ok(var)
    }

    fn claim(&mut self, name: &str, var: VarRef) {
        self.taken.insert(var);
        self.slots.insert(name.to_string(), var);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
