use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::eval::Value;

lazy_static! {
    static ref EMPTY_CONTEXT: HashMap<String, Value> = HashMap::new();
}

/// Sparse per-coordinate environmental readings. Mutated by the driver
/// during setup; read each tick by the simulation when building a cell's
/// evaluation context.
#[derive(Debug, Clone, Default)]
pub struct Field {
    values: HashMap<(usize, usize), HashMap<String, Value>>,
}

impl Field {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a reading, creating the coordinate entry if absent.
    pub fn set_value(&mut self, x: usize, y: usize, name: &str, value: Value) {
        self.values
            .entry((x, y))
            .or_default()
            .insert(name.to_string(), value);
    }

    /// The readings at a coordinate; unset coordinates yield an empty
    /// map. Callers must treat the result as read-only.
    pub fn get_context(&self, x: usize, y: usize) -> &HashMap<String, Value> {
        self.values.get(&(x, y)).unwrap_or(&EMPTY_CONTEXT)
    }
}
