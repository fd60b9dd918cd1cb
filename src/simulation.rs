use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::eval::{Value, VariableContext};
use crate::field::Field;
use crate::monad::Monad;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("cell ({x}, {y}) already holds a monad")]
    Occupied { x: usize, y: usize },
}

/// The 8 relative offsets around a cell and their compass names, with x
/// growing rightward and y growing downward.
const NEIGHBOR_OFFSETS: [(i64, i64, &str); 8] = [
    (-1, -1, "nw"),
    (0, -1, "n"),
    (1, -1, "ne"),
    (-1, 0, "w"),
    (1, 0, "e"),
    (-1, 1, "sw"),
    (0, 1, "s"),
    (1, 1, "se"),
];

/// Owns the grid of agent slots and the ambient field, and drives each
/// occupied cell through its per-tick evaluation phases.
#[derive(Debug, Clone)]
pub struct Simulation {
    width: usize,
    height: usize,
    grid: Vec<Vec<Option<Monad>>>,
    field: Field,
    tick_count: u64,
}

impl Simulation {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            grid: (0..height).map(|_| (0..width).map(|_| None).collect()).collect(),
            field: Field::new(),
            tick_count: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Ticks completed so far; monotonic from 0.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Places an agent. A cell holds at most one.
    pub fn place_monad(&mut self, x: usize, y: usize, monad: Monad) -> Result<(), SimulationError> {
        if x >= self.width || y >= self.height {
            return Err(SimulationError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        if self.grid[y][x].is_some() {
            return Err(SimulationError::Occupied { x, y });
        }
        debug!("placed monad `{}` at ({}, {})", monad.name(), x, y);
        self.grid[y][x] = Some(monad);
        Ok(())
    }

    /// Removes and returns the agent at a cell, if any.
    pub fn remove_monad(&mut self, x: usize, y: usize) -> Option<Monad> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.grid[y][x].take()
    }

    /// Read-only inspection handle for one cell, for point inspection of
    /// an agent's state, memory and trace.
    pub fn monad_at(&self, x: usize, y: usize) -> Option<&Monad> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.grid[y][x].as_ref()
    }

    pub fn set_field_value(&mut self, x: usize, y: usize, name: &str, value: Value) {
        self.field.set_value(x, y, name, value);
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The current states of the occupied, in-bounds cells among the 8
    /// relative offsets, keyed by compass direction. States are read from
    /// the live grid: during a sweep, neighbors processed earlier in
    /// row-major order are observed post-update, later ones pre-update.
    pub fn neighbor_states(&self, x: usize, y: usize) -> HashMap<String, Value> {
        let mut neighbors = HashMap::new();
        for (dx, dy, direction) in NEIGHBOR_OFFSETS {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
                continue;
            }
            if let Some(neighbor) = &self.grid[ny as usize][nx as usize] {
                let state = neighbor
                    .state()
                    .map(|s| Value::String(s.to_string()))
                    .unwrap_or(Value::Null);
                neighbors.insert(direction.to_string(), state);
            }
        }
        neighbors
    }

    /// One tick: visit cells in row-major order and run each occupied
    /// cell's field, tick and meta phases to completion before moving on.
    /// The tick counter increments after the full sweep.
    pub fn step(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width {
                if self.grid[y][x].is_none() {
                    continue;
                }
                let mut vars = self.field.get_context(x, y).clone();
                vars.insert(
                    "neighbors".to_string(),
                    Value::Map(self.neighbor_states(x, y)),
                );
                let context = VariableContext::from(vars);
                let tick = self.tick_count;
                if let Some(monad) = self.grid[y][x].as_mut() {
                    monad.evaluate_field(&context);
                    monad.evaluate_tick(tick);
                    monad.apply_meta_rules();
                }
            }
        }
        self.tick_count += 1;
    }

    /// Purely derived `state | None` grid for the rendering collaborator.
    pub fn render_states(&self) -> Vec<Vec<Option<String>>> {
        self.grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().and_then(|m| m.state().map(String::from)))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_definition;

    fn monad(source: &str) -> Monad {
        Monad::new(&parse_definition(source).unwrap())
    }

    #[test]
    fn test_growth_scenario() {
        let mut sim = Simulation::new(3, 3);
        sim.place_monad(
            1,
            1,
            monad(
                r#"monad Sprout {
                    state: 'seed'
                    on field(temperature > 60) { state => 'grow' }
                }"#,
            ),
        )
        .unwrap();
        sim.set_field_value(1, 1, "temperature", Value::Integer(70));

        sim.step();

        let sprout = sim.monad_at(1, 1).unwrap();
        assert_eq!(sprout.state(), Some("grow"));
        assert_eq!(sprout.trace_log().len(), 1);
        assert_eq!(sprout.trace_log()[0].prev_state, Some("seed".to_string()));
        assert_eq!(sprout.trace_log()[0].new_state, Some("grow".to_string()));
        assert_eq!(sim.tick_count(), 1);
    }

    #[test]
    fn test_placement_bounds_and_occupancy() {
        let mut sim = Simulation::new(2, 2);
        sim.place_monad(0, 0, monad("monad A { }")).unwrap();

        assert_eq!(
            sim.place_monad(0, 0, monad("monad B { }")),
            Err(SimulationError::Occupied { x: 0, y: 0 })
        );
        assert_eq!(
            sim.place_monad(2, 0, monad("monad C { }")),
            Err(SimulationError::OutOfBounds {
                x: 2,
                y: 0,
                width: 2,
                height: 2,
            })
        );
    }

    #[test]
    fn test_remove_monad() {
        let mut sim = Simulation::new(2, 2);
        sim.place_monad(1, 0, monad("monad A { }")).unwrap();
        let removed = sim.remove_monad(1, 0).unwrap();
        assert_eq!(removed.name(), "A");
        assert!(sim.monad_at(1, 0).is_none());
        assert!(sim.remove_monad(1, 0).is_none());
    }

    #[test]
    fn test_corner_cell_has_at_most_three_neighbors() {
        let mut sim = Simulation::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                sim.place_monad(x, y, monad("monad Filler { state: 'solid' }"))
                    .unwrap();
            }
        }

        let corner = sim.neighbor_states(0, 0);
        assert_eq!(corner.len(), 3);
        assert!(corner.contains_key("e"));
        assert!(corner.contains_key("s"));
        assert!(corner.contains_key("se"));

        let center = sim.neighbor_states(1, 1);
        assert_eq!(center.len(), 8);
    }

    #[test]
    fn test_neighbor_lookup_skips_empty_cells() {
        let mut sim = Simulation::new(3, 3);
        sim.place_monad(0, 1, monad("monad Left { state: 'solid' }"))
            .unwrap();

        let neighbors = sim.neighbor_states(1, 1);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(
            neighbors.get("w"),
            Some(&Value::String("solid".to_string()))
        );
    }

    #[test]
    fn test_stateless_neighbor_reads_as_null() {
        let mut sim = Simulation::new(2, 1);
        sim.place_monad(0, 0, monad("monad Blank { }")).unwrap();
        assert_eq!(sim.neighbor_states(1, 0).get("w"), Some(&Value::Null));
    }

    #[test]
    fn test_in_sweep_neighbor_ordering() {
        // (0,0) is processed before (1,0) in row-major order, so within
        // one sweep the right cell observes its left neighbor's updated
        // state while the left cell saw the right one pre-update. The
        // order dependency is part of the engine's semantics.
        let mut sim = Simulation::new(2, 1);
        sim.place_monad(
            0,
            0,
            monad(
                r#"monad Igniter {
                    state: 'off'
                    on field(spark == 1) { state => 'on' }
                }"#,
            ),
        )
        .unwrap();
        sim.place_monad(
            1,
            0,
            monad(
                r#"monad Watcher {
                    state: 'idle'
                    on field(neighbors.w == 'on') { state => 'seen' }
                }"#,
            ),
        )
        .unwrap();
        sim.set_field_value(0, 0, "spark", Value::Integer(1));

        sim.step();

        // The watcher saw the igniter's fresh state in the same sweep.
        assert_eq!(sim.monad_at(0, 0).unwrap().state(), Some("on"));
        assert_eq!(sim.monad_at(1, 0).unwrap().state(), Some("seen"));
    }

    #[test]
    fn test_mirror_order_observes_pre_update_state() {
        // Same shape as above, but the watcher sits left of the igniter
        // and therefore runs first, observing the pre-update state.
        let mut sim = Simulation::new(2, 1);
        sim.place_monad(
            0,
            0,
            monad(
                r#"monad Watcher {
                    state: 'idle'
                    on field(neighbors.e == 'on') { state => 'seen' }
                }"#,
            ),
        )
        .unwrap();
        sim.place_monad(
            1,
            0,
            monad(
                r#"monad Igniter {
                    state: 'off'
                    on field(spark == 1) { state => 'on' }
                }"#,
            ),
        )
        .unwrap();
        sim.set_field_value(1, 0, "spark", Value::Integer(1));

        sim.step();
        assert_eq!(sim.monad_at(0, 0).unwrap().state(), Some("idle"));
        assert_eq!(sim.monad_at(1, 0).unwrap().state(), Some("on"));

        sim.step();
        assert_eq!(sim.monad_at(0, 0).unwrap().state(), Some("seen"));
    }

    #[test]
    fn test_render_states() {
        let mut sim = Simulation::new(2, 2);
        sim.place_monad(1, 0, monad("monad A { state: 'solid' }"))
            .unwrap();

        let rendered = sim.render_states();
        assert_eq!(rendered[0][0], None);
        assert_eq!(rendered[0][1], Some("solid".to_string()));
        assert_eq!(rendered[1][0], None);
    }

    #[test]
    fn test_tick_context_excludes_field_values() {
        // Tick rules evaluate against `{t}` alone; a tick trigger that
        // references a field reading fails and is contained.
        let mut sim = Simulation::new(1, 1);
        sim.place_monad(
            0,
            0,
            monad(
                r#"monad Confused {
                    state: 'seed'
                    on tick(temperature > 60) { state => 'grow' }
                }"#,
            ),
        )
        .unwrap();
        sim.set_field_value(0, 0, "temperature", Value::Integer(70));

        sim.step();
        assert_eq!(sim.monad_at(0, 0).unwrap().state(), Some("seed"));
    }
}
