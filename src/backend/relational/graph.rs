//! Relation graph: which tables join to which, and the shortest route
//! between any two of them.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::error::{DataProviderError, Result};

use super::schema::{Relation, Table};

/// Join key columns between two tables, as `(left column, right column)`
/// relative to the edge's stored orientation.
#[derive(Debug, Clone)]
struct JoinKey {
    left: String,
    columns: Vec<(String, String)>,
}

/// Undirected graph over tables. Shortest routes from every table are
/// computed once at construction.
#[derive(Debug)]
pub struct JoinGraph {
    graph: UnGraph<String, JoinKey>,
    node_indices: HashMap<String, NodeIndex>,
    /// source table -> destination table -> tables on the route, both ends included.
    routes: HashMap<String, HashMap<String, Vec<String>>>,
}

impl JoinGraph {
    pub fn new(tables: &[Table], relations: &[Relation]) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut node_indices = HashMap::new();

        for table in tables {
            let idx = graph.add_node(table.name.clone());
            node_indices.insert(table.name.clone(), idx);
        }

        for relation in relations {
            let (Some(&a), Some(&b)) = (
                node_indices.get(&relation.from.table),
                node_indices.get(&relation.to.table),
            ) else {
                continue;
            };

            // Several relations between the same pair form a composite key.
            if let Some(edge) = graph.find_edge(a, b) {
                let key: &mut JoinKey = &mut graph[edge];
                if key.left == relation.from.table {
                    key.columns.push((relation.from.column.clone(), relation.to.column.clone()));
                } else {
                    key.columns.push((relation.to.column.clone(), relation.from.column.clone()));
                }
                continue;
            }

            graph.add_edge(
                a,
                b,
                JoinKey {
                    left: relation.from.table.clone(),
                    columns: vec![(relation.from.column.clone(), relation.to.column.clone())],
                },
            );
        }

        let mut join_graph = Self {
            graph,
            node_indices,
            routes: HashMap::new(),
        };
        for table in tables {
            let routes = join_graph.bfs_routes(&table.name);
            join_graph.routes.insert(table.name.clone(), routes);
        }
        join_graph
    }

    /// Breadth-first shortest routes from `source` to every reachable table.
    ///
    /// Uses parent pointers and rebuilds each route once at the end.
    fn bfs_routes(&self, source: &str) -> HashMap<String, Vec<String>> {
        let mut routes = HashMap::new();
        let Some(&start) = self.node_indices.get(source) else {
            return routes;
        };

        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        parents.insert(start, start);

        while let Some(current) = queue.pop_front() {
            // Neighbors are visited in the order relations were declared.
            let mut neighbors: Vec<_> = self.graph.edges(current).map(|e| (e.id(), e.target(), e.source())).collect();
            neighbors.sort_by_key(|(id, _, _)| *id);

            for (_, target, source) in neighbors {
                let neighbor = if target == current { source } else { target };
                if parents.contains_key(&neighbor) {
                    continue;
                }
                parents.insert(neighbor, current);
                queue.push_back(neighbor);
            }
        }

        for &node in parents.keys() {
            if node == start {
                continue;
            }
            let mut route = vec![self.graph[node].clone()];
            let mut current = node;
            while current != start {
                current = parents[&current];
                route.push(self.graph[current].clone());
            }
            route.reverse();
            routes.insert(self.graph[node].clone(), route);
        }

        routes
    }

    /// Tables on the shortest route from `from` to `to`, both included.
    pub fn route(&self, from: &str, to: &str) -> Result<Vec<String>> {
        if from == to {
            return Ok(vec![from.to_string()]);
        }
        self.routes
            .get(from)
            .and_then(|routes| routes.get(to))
            .cloned()
            .ok_or_else(|| DataProviderError::JoinGraph {
                from: from.into(),
                to: to.into(),
            })
    }

    /// Key columns joining `src` to `dest`, as `(src column, dest column)`.
    pub fn join_columns(&self, src: &str, dest: &str) -> Result<Vec<(String, String)>> {
        let no_edge = || DataProviderError::JoinGraph {
            from: src.into(),
            to: dest.into(),
        };
        let a = *self.node_indices.get(src).ok_or_else(no_edge)?;
        let b = *self.node_indices.get(dest).ok_or_else(no_edge)?;
        let edge = self.graph.find_edge(a, b).ok_or_else(no_edge)?;
        let key = &self.graph[edge];

        Ok(if key.left == src {
            key.columns.clone()
        } else {
            key.columns.iter().map(|(l, r)| (r.clone(), l.clone())).collect()
        })
    }

    /// Tables directly joined to `table`.
    pub fn neighbors(&self, table: &str) -> Vec<String> {
        let Some(&idx) = self.node_indices.get(table) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges(idx).collect();
        edges.sort_by_key(|e| e.id());
        edges
            .into_iter()
            .map(|e| {
                let other = if e.target() == idx { e.source() } else { e.target() };
                self.graph[other].clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::relational::schema::Column;

    fn table(name: &str) -> Table {
        Table {
            name: name.into(),
            primary_key: vec!["id".into()],
        }
    }

    fn relation(from: &str, to: &str) -> Relation {
        Relation {
            from: Column::parse(from).unwrap(),
            to: Column::parse(to).unwrap(),
        }
    }

    fn chain() -> JoinGraph {
        JoinGraph::new(
            &[table("t1"), table("t2"), table("t3"), table("island")],
            &[relation("t1.id", "t2.t1_id"), relation("t2.id", "t3.t2_id")],
        )
    }

    #[test]
    fn test_route_through_intermediate() {
        let graph = chain();
        assert_eq!(graph.route("t1", "t3").unwrap(), vec!["t1", "t2", "t3"]);
        assert_eq!(graph.route("t3", "t1").unwrap(), vec!["t3", "t2", "t1"]);
        assert_eq!(graph.route("t2", "t2").unwrap(), vec!["t2"]);
    }

    #[test]
    fn test_disconnected() {
        let err = chain().route("t1", "island").unwrap_err();
        assert!(matches!(err, DataProviderError::JoinGraph { .. }));
    }

    #[test]
    fn test_join_columns_oriented() {
        let graph = chain();
        assert_eq!(graph.join_columns("t1", "t2").unwrap(), vec![("id".to_string(), "t1_id".to_string())]);
        assert_eq!(graph.join_columns("t2", "t1").unwrap(), vec![("t1_id".to_string(), "id".to_string())]);
    }

    #[test]
    fn test_composite_key() {
        let graph = JoinGraph::new(
            &[table("a"), table("b")],
            &[relation("a.x", "b.ax"), relation("b.ay", "a.y")],
        );
        assert_eq!(
            graph.join_columns("a", "b").unwrap(),
            vec![("x".to_string(), "ax".to_string()), ("y".to_string(), "ay".to_string())]
        );
    }

    #[test]
    fn test_neighbors() {
        assert_eq!(chain().neighbors("t2"), vec!["t1", "t3"]);
    }
}
