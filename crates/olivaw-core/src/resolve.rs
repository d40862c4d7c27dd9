use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::event::{DependencyRef, Event, Production};
use crate::status::Status;

type Key = (String, String);

/// Lookup of every production in the ledger by `(event, production)`.
struct Graph<'a> {
    nodes: HashMap<Key, &'a Production>,
}

impl<'a> Graph<'a> {
    /// `event` wins over a same-named entry in `ledger`, so callers can
    /// resolve against an in-flight copy.
    fn build(event: &'a Event, ledger: &'a [Event]) -> Self {
        let mut nodes = HashMap::new();
        for e in ledger.iter().filter(|e| e.name != event.name) {
            for p in e.productions() {
                nodes.insert((e.name.clone(), p.name.clone()), p);
            }
        }
        for p in event.productions() {
            nodes.insert((event.name.clone(), p.name.clone()), p);
        }
        Self { nodes }
    }

    fn resolve(&self, from: &Production, dep: &DependencyRef) -> Result<(Key, &'a Production)> {
        let event = dep.event.clone().unwrap_or_else(|| from.event.clone());
        let key = (event, dep.production.clone());
        match self.nodes.get(&key) {
            Some(p) => Ok((key, *p)),
            None => Err(Error::Configuration(format!(
                "production \"{}\" depends on \"{dep}\" which does not exist",
                from.qualified_name()
            ))),
        }
    }

    /// Depth-first walk over the dependencies of `start`, bounded by the
    /// number of productions in the ledger.
    fn check_acyclic(&self, start: &'a Production, verified: &mut HashSet<Key>) -> Result<()> {
        let bound = self.nodes.len();
        let mut path: Vec<Key> = Vec::new();
        self.visit(
            (start.event.clone(), start.name.clone()),
            start,
            &mut path,
            verified,
            bound,
        )
    }

    fn visit(
        &self,
        key: Key,
        node: &'a Production,
        path: &mut Vec<Key>,
        verified: &mut HashSet<Key>,
        bound: usize,
    ) -> Result<()> {
        if verified.contains(&key) {
            return Ok(());
        }
        if let Some(pos) = path.iter().position(|k| *k == key) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|(e, p)| format!("{e}/{p}"))
                .collect();
            cycle.push(format!("{}/{}", key.0, key.1));
            return Err(Error::Configuration(format!(
                "dependency cycle detected: {}",
                cycle.join(" -> ")
            )));
        }
        if path.len() > bound {
            return Err(Error::Configuration(format!(
                "dependency chain from \"{}\" exceeds {bound} productions",
                node.qualified_name()
            )));
        }
        path.push(key.clone());
        for dep in node.dependency_refs()? {
            let (dep_key, dep_node) = self.resolve(node, &dep)?;
            self.visit(dep_key, dep_node, path, verified, bound)?;
        }
        path.pop();
        verified.insert(key);
        Ok(())
    }

    fn dependencies_complete(&self, production: &Production) -> Result<bool> {
        for dep in production.dependency_refs()? {
            let (_, p) = self.resolve(production, &dep)?;
            if !p.status.is_complete() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn validate<'a>(event: &'a Event, graph: &Graph<'a>) -> Result<()> {
    let mut verified = HashSet::new();
    for p in event.productions() {
        graph.check_acyclic(p, &mut verified)?;
    }
    Ok(())
}

/// Productions of `event` in `wait` whose dependencies are all `finished` or
/// `uploaded`, in event order.
///
/// `ledger` supplies the other events so cross-event references resolve.
/// Unknown references and cycles are configuration errors.
pub fn get_all_latest<'a>(event: &'a Event, ledger: &'a [Event]) -> Result<Vec<&'a Production>> {
    let graph = Graph::build(event, ledger);
    validate(event, &graph)?;
    let mut ready = Vec::new();
    for p in event.productions() {
        if p.status == Status::Wait && graph.dependencies_complete(p)? {
            ready.push(p);
        }
    }
    Ok(ready)
}

/// Productions of `event` in `wait` still blocked on a dependency.
pub fn waiting_on_dependencies<'a>(
    event: &'a Event,
    ledger: &'a [Event],
) -> Result<Vec<&'a Production>> {
    let graph = Graph::build(event, ledger);
    validate(event, &graph)?;
    let mut blocked = Vec::new();
    for p in event.productions() {
        if p.status == Status::Wait && !graph.dependencies_complete(p)? {
            blocked.push(p);
        }
    }
    Ok(blocked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ps: &[&Production]) -> Vec<String> {
        ps.iter().map(|p| p.name.clone()).collect()
    }

    fn chain() -> Event {
        let mut e = Event::new("S1");
        e.add_production(Production::new("A", "rift")).unwrap();
        e.add_production(Production::new("B", "rift").with_needs(["A"]))
            .unwrap();
        e
    }

    #[test]
    fn no_dependencies_is_eligible() {
        let e = chain();
        let ready = get_all_latest(&e, &[]).unwrap();
        assert_eq!(names(&ready), vec!["A"]);
        assert_eq!(names(&waiting_on_dependencies(&e, &[]).unwrap()), vec!["B"]);
    }

    #[test]
    fn finished_dependency_unblocks() {
        let mut e = chain();
        let mut a = e.production("A").unwrap().clone();
        a.status = Status::Finished;
        e.replace_production(a).unwrap();
        let ready = get_all_latest(&e, &[]).unwrap();
        assert_eq!(names(&ready), vec!["B"]);
    }

    #[test]
    fn uploaded_counts_as_complete_but_running_does_not() {
        let mut e = chain();
        let mut a = e.production("A").unwrap().clone();
        a.status = Status::Running;
        e.replace_production(a.clone()).unwrap();
        assert!(get_all_latest(&e, &[]).unwrap().is_empty());

        a.status = Status::Uploaded;
        e.replace_production(a).unwrap();
        assert_eq!(names(&get_all_latest(&e, &[]).unwrap()), vec!["B"]);
    }

    #[test]
    fn order_follows_event_sequence() {
        let mut e = Event::new("S1");
        for n in ["Z", "M", "A"] {
            e.add_production(Production::new(n, "rift")).unwrap();
        }
        assert_eq!(names(&get_all_latest(&e, &[]).unwrap()), vec!["Z", "M", "A"]);
    }

    #[test]
    fn two_node_cycle_is_error() {
        let mut e = Event::new("S1");
        e.add_production(Production::new("A", "rift").with_needs(["B"]))
            .unwrap();
        e.add_production(Production::new("B", "rift").with_needs(["A"]))
            .unwrap();
        let err = get_all_latest(&e, &[]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn self_dependency_is_cycle() {
        let mut e = Event::new("S1");
        e.add_production(Production::new("A", "rift").with_needs(["A"]))
            .unwrap();
        assert!(get_all_latest(&e, &[]).unwrap_err().to_string().contains("cycle"));
    }

    #[test]
    fn unknown_dependency_is_error() {
        let mut e = Event::new("S1");
        e.add_production(Production::new("A", "rift").with_needs(["ghost"]))
            .unwrap();
        let err = get_all_latest(&e, &[]).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn cross_event_dependency() {
        let mut upstream = Event::new("S0");
        upstream
            .add_production(Production::new("PSD", "bayeswave"))
            .unwrap();
        let mut e = Event::new("S1");
        e.add_production(Production::new("A", "rift").with_needs(["S0/PSD"]))
            .unwrap();

        let ledger = vec![upstream.clone(), e.clone()];
        assert!(get_all_latest(&e, &ledger).unwrap().is_empty());

        let mut psd = upstream.production("PSD").unwrap().clone();
        psd.status = Status::Finished;
        upstream.replace_production(psd).unwrap();
        let ledger = vec![upstream, e.clone()];
        assert_eq!(names(&get_all_latest(&e, &ledger).unwrap()), vec!["A"]);
    }

    #[test]
    fn cross_event_cycle_is_error() {
        let mut s0 = Event::new("S0");
        s0.add_production(Production::new("X", "rift").with_needs(["S1/Y"]))
            .unwrap();
        let mut s1 = Event::new("S1");
        s1.add_production(Production::new("Y", "rift").with_needs(["S0/X"]))
            .unwrap();
        let ledger = vec![s0, s1.clone()];
        assert!(get_all_latest(&s1, &ledger).is_err());
    }
}
