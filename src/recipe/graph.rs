// src/recipe/graph.rs

//! Recipe dependency graph for build ordering
//!
//! This module provides a directed graph for tracking dependencies between
//! recipes and determining the correct build order using topological sort.
//! Nodes are stored by index; names are only used for lookups and for
//! breaking ties, so every query returns the same answer for the same input.
//!
//! # Example
//!
//! ```
//! use cellar::recipe::RecipeGraph;
//!
//! let mut graph = RecipeGraph::new();
//! graph.add_recipe("gdal", &["proj", "geos", "libtiff"]);
//! graph.add_recipe("proj", &["libtiff"]);
//! graph.add_recipe("geos", &[]);
//! graph.add_recipe("libtiff", &[]);
//!
//! let order = graph.topological_sort().unwrap();
//! assert_eq!(order, ["geos", "libtiff", "proj", "gdal"]);
//! ```

use crate::error::{Error, Result};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};

/// A directed graph representing recipe dependencies
#[derive(Debug, Default, Clone)]
pub struct RecipeGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// node -> nodes it depends on
    edges: Vec<BTreeSet<usize>>,
    /// node -> nodes that depend on it
    reverse_edges: Vec<BTreeSet<usize>>,
}

impl RecipeGraph {
    /// Create a new empty recipe graph
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.edges.push(BTreeSet::new());
        self.reverse_edges.push(BTreeSet::new());
        idx
    }

    /// Add a recipe with its dependencies
    ///
    /// If the recipe already exists, this merges the dependencies.
    /// Returns the recipe's node index.
    pub fn add_recipe(&mut self, name: &str, dependencies: &[&str]) -> usize {
        let idx = self.node(name);
        for dep in dependencies {
            let dep_idx = self.node(dep);
            self.edges[idx].insert(dep_idx);
            self.reverse_edges[dep_idx].insert(idx);
        }
        idx
    }

    /// Number of recipes in the graph
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check if a recipe exists in the graph
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Node index for a recipe name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Recipe name for a node index
    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    /// Direct dependencies of a node, by index
    pub fn dependency_indices(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges[idx].iter().copied()
    }

    /// Direct dependents of a node, by index
    pub fn dependent_indices(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.reverse_edges[idx].iter().copied()
    }

    /// Get the direct dependencies of a recipe, sorted by name
    pub fn dependencies(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.index_of(name)?;
        Some(self.sorted_names(self.edges[idx].iter().copied()))
    }

    /// Get the recipes that directly depend on this recipe, sorted by name
    pub fn dependents(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.index_of(name)?;
        Some(self.sorted_names(self.reverse_edges[idx].iter().copied()))
    }

    fn sorted_names(&self, nodes: impl Iterator<Item = usize>) -> Vec<&str> {
        let mut names: Vec<&str> = nodes.map(|i| self.names[i].as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Topological order as node indices
    ///
    /// Kahn's algorithm over a min-heap keyed by name: among all recipes whose
    /// dependencies are already placed, the lexicographically smallest goes
    /// next. Fails with [`Error::Cycle`] naming one concrete cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let mut in_degrees: Vec<usize> = self.edges.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<(&str, usize)>> = in_degrees
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(idx, _)| Reverse((self.names[idx].as_str(), idx)))
            .collect();
        let mut order = Vec::with_capacity(self.names.len());

        while let Some(Reverse((_, idx))) = ready.pop() {
            order.push(idx);
            for &dependent in &self.reverse_edges[idx] {
                in_degrees[dependent] -= 1;
                if in_degrees[dependent] == 0 {
                    ready.push(Reverse((self.names[dependent].as_str(), dependent)));
                }
            }
        }

        if order.len() != self.names.len() {
            let cycle = self.find_cycle().unwrap_or_else(|| {
                // Kahn left nodes behind, so a cycle exists; fall back to the remainder
                let mut rest: Vec<String> = (0..self.names.len())
                    .filter(|i| !order.contains(i))
                    .map(|i| self.names[i].clone())
                    .collect();
                rest.sort();
                rest
            });
            return Err(Error::Cycle { cycle });
        }

        Ok(order)
    }

    /// Perform topological sort
    ///
    /// Returns the recipes in build order (dependencies before dependents).
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|idx| self.names[idx].clone())
            .collect())
    }

    /// Find one cycle in the graph
    ///
    /// The path starts and ends with the same recipe (`a -> b -> a`). Roots
    /// and edges are visited in name order so the reported cycle is stable.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut marks = vec![Mark::New; self.names.len()];
        let mut roots: Vec<usize> = (0..self.names.len()).collect();
        roots.sort_by(|a, b| self.names[*a].cmp(&self.names[*b]));

        for root in roots {
            if marks[root] != Mark::New {
                continue;
            }
            // Iterative DFS: (node, remaining children)
            let mut path: Vec<usize> = vec![root];
            let mut stack: Vec<Vec<usize>> = vec![self.children_by_name(root)];
            marks[root] = Mark::Active;

            while let Some(children) = stack.last_mut() {
                match children.pop() {
                    Some(child) => match marks[child] {
                        Mark::Active => {
                            let start = path.iter().position(|&n| n == child)?;
                            let mut cycle: Vec<String> =
                                path[start..].iter().map(|&n| self.names[n].clone()).collect();
                            cycle.push(self.names[child].clone());
                            return Some(cycle);
                        }
                        Mark::New => {
                            marks[child] = Mark::Active;
                            path.push(child);
                            stack.push(self.children_by_name(child));
                        }
                        Mark::Done => {}
                    },
                    None => {
                        stack.pop();
                        if let Some(done) = path.pop() {
                            marks[done] = Mark::Done;
                        }
                    }
                }
            }
        }

        None
    }

    /// Children in reverse name order, so popping yields them alphabetically
    fn children_by_name(&self, idx: usize) -> Vec<usize> {
        let mut children: Vec<usize> = self.edges[idx].iter().copied().collect();
        children.sort_by(|a, b| self.names[*b].cmp(&self.names[*a]));
        children
    }

    /// Group recipes into layers of mutually independent recipes
    ///
    /// Layer 0 has no dependencies; every recipe in layer N depends on at
    /// least one recipe in layer N-1. Each layer is sorted by name.
    pub fn layers(&self) -> Result<Vec<Vec<String>>> {
        let order = self.topological_order()?;
        let mut depth = vec![0usize; self.names.len()];
        for &idx in &order {
            depth[idx] = self.edges[idx]
                .iter()
                .map(|&dep| depth[dep] + 1)
                .max()
                .unwrap_or(0);
        }

        let mut layers: Vec<Vec<String>> = Vec::new();
        for &idx in &order {
            let d = depth[idx];
            if layers.len() <= d {
                layers.resize_with(d + 1, Vec::new);
            }
            layers[d].push(self.names[idx].clone());
        }
        for layer in &mut layers {
            layer.sort();
        }
        Ok(layers)
    }

    fn walk(&self, start: usize, forward: bool) -> BTreeSet<usize> {
        let adjacency = if forward { &self.edges } else { &self.reverse_edges };
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = adjacency[start].iter().copied().collect();

        while let Some(node) = queue.pop_front() {
            if node != start && seen.insert(node) {
                queue.extend(adjacency[node].iter().copied());
            }
        }

        seen
    }

    /// Node indices reachable through dependency edges
    pub fn transitive_dependency_indices(&self, idx: usize) -> BTreeSet<usize> {
        self.walk(idx, true)
    }

    /// Node indices that reach this node through dependency edges
    pub fn transitive_dependent_indices(&self, idx: usize) -> BTreeSet<usize> {
        self.walk(idx, false)
    }

    /// Get all recipes that a given recipe transitively depends on
    pub fn transitive_dependencies(&self, name: &str) -> BTreeSet<String> {
        self.index_of(name)
            .map(|idx| {
                self.walk(idx, true)
                    .into_iter()
                    .map(|i| self.names[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all recipes that transitively depend on a given recipe
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        self.index_of(name)
            .map(|idx| {
                self.walk(idx, false)
                    .into_iter()
                    .map(|i| self.names[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
