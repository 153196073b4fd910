// tests/property.rs

mod common;
use crate::common::layered_dag;

use std::collections::HashMap;

use clusterflow::dag::Graph;
use clusterflow::fs::mock::MockFileSystem;
use clusterflow::scheduler::{StatusQuery, TargetStatus};
use clusterflow::state::{State, TargetState};
use proptest::prelude::*;

const MAX_NODES: usize = 8;

fn any_state() -> impl Strategy<Value = State> {
    prop::sample::select(State::ALL.to_vec())
}

/// Row `i` picks dependencies among the nodes before `i`.
fn any_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(any::<bool>(), MAX_NODES), 1..=MAX_NODES).prop_map(
        |rows| {
            rows.iter()
                .enumerate()
                .map(|(i, row)| (0..i).filter(|&j| row[j]).collect())
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn transitions_follow_the_table(steps in prop::collection::vec((any_state(), 0.0f64..1e6), 0..12)) {
        let mut record = TargetState::new("T");
        for (to, at) in steps {
            let before = record.clone();
            let allowed = !before.state.is_end_state() && before.state.can_move_to(to);
            let result = record.transition_at(to, at);

            prop_assert_eq!(result.is_ok(), allowed);
            if allowed {
                prop_assert_eq!(record.state, to);
            } else {
                prop_assert_eq!(&record, &before);
            }

            if let (Some(s), Some(r)) = (record.submitted_at, record.started_at) {
                prop_assert!(s <= r);
            }
            if let (Some(r), Some(e)) = (record.started_at, record.ended_at) {
                prop_assert!(r <= e);
            }
        }
    }

    #[test]
    fn distribution_counts_target_and_closure(
        deps in any_dag(),
        completed in prop::collection::vec(any::<bool>(), MAX_NODES),
    ) {
        let graph = Graph::from_targets(layered_dag(&deps)).unwrap();
        let fs = MockFileSystem::new();

        let mut states = HashMap::new();
        for (i, done) in completed.iter().take(deps.len()).enumerate() {
            if *done {
                let name = format!("N{i}");
                let mut s = TargetState::new(name.clone());
                for to in [State::Submitted, State::Running, State::Completed] {
                    s.transition(to).unwrap();
                }
                fs.add_file(format!("/w/out{i}"), "");
                states.insert(name, s);
            }
        }
        let mut query = StatusQuery::from_states(&graph, &fs, states);

        for i in 0..deps.len() {
            let name = format!("N{i}");
            let closure = graph.dependency_closure(&name);
            let dist = query.distribution(&name)?;
            prop_assert_eq!(dist.total(), 1 + closure.len());

            let sum: usize = TargetStatus::ALL.iter().map(|s| dist.count(*s)).sum();
            prop_assert_eq!(sum, dist.total());

            // A stale dependency makes every dependent stale too.
            if closure.iter().any(|d| query.should_run(d).unwrap()) {
                prop_assert!(query.should_run(&name)?);
            }
        }
    }
}
