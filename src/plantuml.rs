//! PlantUML diagram generation

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use crate::fsm::TransitionRecord;

/// Generate PlantUML diagram from the registered states and the transition log
pub(crate) fn generate_plantuml<'a, S, K, T>(states: K, transitions: T, current_state: &S) -> String
where
    S: Debug + Eq + Hash + 'a,
    K: IntoIterator<Item = &'a S>,
    T: IntoIterator<Item = &'a TransitionRecord<S>>,
{
    let mut plantuml = String::new();
    plantuml.push_str("@startuml\n");
    plantuml.push_str("skinparam state {\n");
    plantuml.push_str("  BackgroundColor<<Current>> YellowGreen\n");
    plantuml.push_str("}\n\n");

    let mut seen: HashSet<&S> = HashSet::new();

    // Sorted so the output does not depend on hash order
    let mut edges = Vec::new();
    for record in transitions {
        edges.push(format!("{:?} --> {:?} : {}\n", record.from, record.to, record.trigger));
        seen.insert(&record.from);
        seen.insert(&record.to);
    }
    edges.sort();
    for edge in edges {
        plantuml.push_str(&edge);
    }

    // States never involved in a transition
    let mut idle: Vec<String> = states
        .into_iter()
        .filter(|state| !seen.contains(state))
        .map(|state| format!("state {:?}\n", state))
        .collect();
    idle.sort();
    for state in idle {
        plantuml.push_str(&state);
    }

    // Mark current state
    plantuml.push_str(&format!("state {:?} <<Current>>\n", current_state));

    plantuml.push_str("@enduml\n");
    plantuml
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: &'static str, to: &'static str, trigger: &str) -> TransitionRecord<&'static str> {
        TransitionRecord {
            from,
            to,
            trigger: trigger.to_string(),
        }
    }

    #[test]
    fn test_render() {
        let states = ["Idle", "Connecting", "Closed"];
        let log = vec![
            record("Idle", "Connecting", "set_state"),
            record("Connecting", "Idle", "error: refused"),
        ];

        let out = generate_plantuml(states.iter(), log.iter(), &"Idle");

        assert!(out.starts_with("@startuml\n"));
        assert!(out.ends_with("@enduml\n"));
        assert!(out.contains("\"Idle\" --> \"Connecting\" : set_state\n"));
        assert!(out.contains("\"Connecting\" --> \"Idle\" : error: refused\n"));
        assert!(out.contains("state \"Closed\"\n"));
        assert!(!out.contains("state \"Connecting\"\n"));
        assert!(out.contains("state \"Idle\" <<Current>>\n"));
    }
}
