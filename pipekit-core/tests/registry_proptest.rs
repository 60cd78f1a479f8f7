use pipekit_core::registry::TaskRegistry;
use pipekit_core::Error;
use proptest::prelude::*;

const TASKS: usize = 5;
const PLUGINS: [&str; 3] = ["sass", "copy", "concat"];

/// Each task lists references; a value above the task's own index (and below
/// `TASKS`) points at another task, anything else at a plugin. Only forward
/// references are generated, so the graph is acyclic.
fn gen_task_lists() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..10, 0..4), TASKS)
}

fn reference(task: usize, value: usize) -> String {
    if value > task && value < TASKS {
        format!("t{}", value)
    } else {
        format!("{}:t{}", PLUGINS[value % PLUGINS.len()], value)
    }
}

fn build(lists: &[Vec<usize>]) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    for plugin in PLUGINS {
        registry.declare_plugin(plugin);
    }
    for (task, values) in lists.iter().enumerate() {
        let refs: Vec<String> = values.iter().map(|&v| reference(task, v)).collect();
        registry.register(format!("t{}", task), refs);
    }
    registry
}

fn expected_len(lists: &[Vec<usize>], task: usize) -> usize {
    lists[task]
        .iter()
        .map(|&v| {
            if v > task && v < TASKS {
                expected_len(lists, v)
            } else {
                1
            }
        })
        .sum()
}

proptest! {
    #[test]
    fn test_expansion_length_is_transitive_entry_count(lists in gen_task_lists()) {
        let registry = build(&lists);
        for task in 0..TASKS {
            let queue = registry.expand(&format!("t{}", task)).unwrap();
            prop_assert_eq!(queue.len(), expected_len(&lists, task));
            prop_assert!(queue.iter().all(|i| PLUGINS.contains(&i.plugin.as_str())));
        }
    }

    #[test]
    fn test_back_reference_is_always_a_cycle(lists in gen_task_lists()) {
        // Chain t0 -> t1 -> ... -> t4 -> t0 on top of the random references.
        let mut lists = lists;
        for (task, values) in lists.iter_mut().enumerate().take(TASKS - 1) {
            values.push(task + 1);
        }
        let mut registry = build(&lists);
        let mut last: Vec<String> = lists[TASKS - 1]
            .iter()
            .map(|&v| reference(TASKS - 1, v))
            .collect();
        last.push("t0".to_string());
        registry.register(format!("t{}", TASKS - 1), last);

        for task in 0..TASKS {
            let result = registry.expand(&format!("t{}", task));
            prop_assert!(matches!(result, Err(Error::CyclicTask(_))));
        }
    }
}
