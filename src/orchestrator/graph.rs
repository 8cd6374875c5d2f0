//! Topological layering (§4.6 step 2) over the dependency graph restricted
//! to a group's selected services.

use crate::db::models::ServiceDependency;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// `layers[i]` is the set of service ids dispatched in parallel at layer
/// `i`; layer 0 has in-degree 0 within the restricted graph.
pub type Layers = Vec<Vec<Uuid>>;

/// Computes layers via repeated in-degree-0 removal ("Kahn's algorithm").
/// `edges` is the full project's dependency graph; `selected` restricts it
/// to the services in this group.
pub fn layer(selected: &[Uuid], edges: &[ServiceDependency]) -> Result<Layers> {
    let selected_set: HashSet<Uuid> = selected.iter().copied().collect();

    // depends_on edges restricted to the selected set: service -> [deps]
    let mut deps_of: HashMap<Uuid, Vec<Uuid>> = selected.iter().map(|s| (*s, Vec::new())).collect();
    for edge in edges {
        if selected_set.contains(&edge.service_id) && selected_set.contains(&edge.depends_on_service_id) {
            deps_of.entry(edge.service_id).or_default().push(edge.depends_on_service_id);
        }
    }

    // in-degree counts how many selected services each service depends on
    // that haven't been peeled off yet; a service with in-degree 0 has no
    // unsatisfied dependency and can run in the current layer.
    let mut remaining_deps: HashMap<Uuid, HashSet<Uuid>> = deps_of
        .iter()
        .map(|(svc, deps)| (*svc, deps.iter().copied().collect()))
        .collect();

    let mut layers: Layers = Vec::new();
    let mut placed: HashSet<Uuid> = HashSet::new();

    while placed.len() < selected.len() {
        let layer_now: Vec<Uuid> = remaining_deps
            .iter()
            .filter(|(svc, deps)| !placed.contains(*svc) && deps.is_empty())
            .map(|(svc, _)| *svc)
            .collect();

        if layer_now.is_empty() {
            let cycle_edge = find_cycle_edge(&deps_of, &placed);
            return Err(Error::dependency_cycle(cycle_edge));
        }

        for svc in &layer_now {
            placed.insert(*svc);
        }
        for deps in remaining_deps.values_mut() {
            for svc in &layer_now {
                deps.remove(svc);
            }
        }

        let mut sorted_layer = layer_now;
        sorted_layer.sort();
        layers.push(sorted_layer);
    }

    Ok(layers)
}

/// Names one edge that participates in a cycle among the not-yet-placed
/// services, by walking forward from an arbitrary unplaced node until a
/// repeat is seen.
fn find_cycle_edge(deps_of: &HashMap<Uuid, Vec<Uuid>>, placed: &HashSet<Uuid>) -> String {
    let start = match deps_of.keys().find(|s| !placed.contains(*s)) {
        Some(s) => *s,
        None => return "unknown".to_string(),
    };

    let mut visited = Vec::new();
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut current = start;
    loop {
        if !seen.insert(current) {
            let from = visited.last().copied().unwrap_or(current);
            return format!("{from} -> {current}");
        }
        visited.push(current);
        let unplaced_dep = deps_of
            .get(&current)
            .into_iter()
            .flatten()
            .find(|d| !placed.contains(*d));
        match unplaced_dep {
            Some(next) => current = *next,
            None => return format!("{current} -> (dead end)"),
        }
    }
}

/// Breadth-first expansion of `selected` through the shared-directory rule
/// is handled by the caller (C9); this just validates that every requested
/// id is a real node before layering, surfacing a friendlier error than a
/// silent drop.
pub fn validate_selection(selected: &[Uuid], all_service_ids: &[Uuid]) -> Result<()> {
    let known: HashSet<Uuid> = all_service_ids.iter().copied().collect();
    let missing: Vec<Uuid> = selected.iter().copied().filter(|s| !known.contains(s)).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "unknown service ids in group selection: {:?}",
            missing
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DependencyType;
    use chrono::Utc;

    fn edge(service_id: Uuid, depends_on: Uuid) -> ServiceDependency {
        ServiceDependency {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            service_id,
            depends_on_service_id: depends_on,
            dependency_type: DependencyType::Runtime,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn independent_services_land_in_one_layer() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let layers = layer(&[a, b], &[]).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 2);
    }

    #[test]
    fn chain_produces_one_layer_per_node() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // b depends on a, c depends on b
        let edges = vec![edge(b, a), edge(c, b)];
        let layers = layer(&[a, b, c], &edges).unwrap();
        assert_eq!(layers, vec![vec![a], vec![b], vec![c]]);
    }

    #[test]
    fn diamond_dependency_layers_correctly() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();
        // b and c both depend on a; d depends on both b and c
        let edges = vec![edge(b, a), edge(c, a), edge(d, b), edge(d, c)];
        let mut layers = layer(&[a, b, c, d], &edges).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], vec![a]);
        layers[1].sort();
        let mut expected_middle = vec![b, c];
        expected_middle.sort();
        assert_eq!(layers[1], expected_middle);
        assert_eq!(layers[2], vec![d]);
    }

    #[test]
    fn cycle_is_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let edges = vec![edge(a, b), edge(b, a)];
        let err = layer(&[a, b], &edges).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn unselected_dependencies_are_ignored() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let outside = Uuid::new_v4();
        // b "depends on" a service that isn't in this group's selection
        let edges = vec![edge(b, outside)];
        let layers = layer(&[a, b], &edges).unwrap();
        assert_eq!(layers.len(), 1);
    }
}
