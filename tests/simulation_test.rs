use monadica::{parse_definition, Monad, Simulation, Value};

extern crate monadica;

fn place(sim: &mut Simulation, x: usize, y: usize, source: &str) {
    let definition = parse_definition(source).unwrap();
    sim.place_monad(x, y, Monad::new(&definition)).unwrap();
}

#[test]
fn it_runs_the_growth_scenario() {
    let mut sim = Simulation::new(3, 3);
    place(
        &mut sim,
        1,
        1,
        r#"monad Sprout {
            state: 'seed'
            on field(temperature > 60) { state => 'grow' }
        }"#,
    );
    sim.set_field_value(1, 1, "temperature", Value::Integer(70));

    sim.step();

    let sprout = sim.monad_at(1, 1).unwrap();
    assert_eq!(sprout.state(), Some("grow"));
    assert_eq!(sprout.trace_log().len(), 1);
    assert_eq!(sprout.trace_log()[0].prev_state, Some("seed".to_string()));
    assert_eq!(sprout.trace_log()[0].new_state, Some("grow".to_string()));

    let rendered = sim.render_states();
    assert_eq!(rendered[1][1], Some("grow".to_string()));
    assert_eq!(rendered[0][0], None);
}

#[test]
fn it_contains_failures_to_the_offending_rule() {
    let mut sim = Simulation::new(1, 1);
    place(
        &mut sim,
        0,
        0,
        r#"monad Resilient {
            state: 'seed'
            memory: { hits: 0 }
            on field(nonexistent > 1) { state => 'broken' }
            on field(temperature > 60) { state => 'grow' }
            on tick() { memory.hits => memory.hits + 1 }
        }"#,
    );
    sim.set_field_value(0, 0, "temperature", Value::Integer(70));

    for _ in 0..3 {
        sim.step();
    }

    let monad = sim.monad_at(0, 0).unwrap();
    // The bad rule never fires, its siblings and later phases still do.
    assert_eq!(monad.state(), Some("grow"));
    assert_eq!(monad.memory().get("hits"), Some(&Value::Integer(3)));
    // One transition only: later ticks re-trigger the rule but the state
    // no longer changes.
    assert_eq!(monad.trace_log().len(), 1);
}

#[test]
fn it_feeds_neighbor_states_into_field_conditions() {
    let mut sim = Simulation::new(3, 1);
    place(&mut sim, 0, 0, "monad Wall { state: 'solid' }");
    place(
        &mut sim,
        1,
        0,
        r#"monad Sensor {
            state: 'idle'
            on field('solid' in neighbors) { state => 'touching' }
        }"#,
    );

    sim.step();
    assert_eq!(sim.monad_at(1, 0).unwrap().state(), Some("touching"));
}

#[test]
fn it_steps_multiple_agents_independently() {
    let definition = parse_definition(
        r#"monad Grower {
            state: 'seed'
            memory: { age: 0 }
            on field(temperature > 60) { state => 'grow' }
            on tick() { memory.age => memory.age + 1 }
        }"#,
    )
    .unwrap();

    let mut sim = Simulation::new(2, 1);
    sim.place_monad(0, 0, Monad::new(&definition)).unwrap();
    sim.place_monad(1, 0, Monad::new(&definition)).unwrap();
    // Only the left cell is warmed.
    sim.set_field_value(0, 0, "temperature", Value::Integer(70));

    sim.step();
    sim.step();

    let left = sim.monad_at(0, 0).unwrap();
    let right = sim.monad_at(1, 0).unwrap();
    assert_eq!(left.state(), Some("grow"));
    assert_eq!(right.state(), Some("seed"));
    // Instances never share memory.
    assert_eq!(left.memory().get("age"), Some(&Value::Integer(2)));
    assert_eq!(right.memory().get("age"), Some(&Value::Integer(2)));
    assert_eq!(sim.tick_count(), 2);
}

#[test]
fn it_renders_a_state_grid_per_tick() {
    let mut sim = Simulation::new(2, 2);
    place(&mut sim, 0, 1, "monad A { state: 'solid' }");

    let rendered = sim.render_states();
    assert_eq!(
        rendered,
        vec![
            vec![None, None],
            vec![Some("solid".to_string()), None],
        ]
    );
}
