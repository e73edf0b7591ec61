use crate::graph::Graph;

/// Iterator over the breadth-first rings of a graph around a start node.
/// Each node is yielded in exactly one ring; nodes within a ring are sorted.
pub(crate) struct Rings<'a> {
    graph: &'a Graph,
    visited: Vec<bool>,
    frontier: Vec<usize>,
}

impl<'a> Rings<'a> {
    pub(super) fn new(graph: &'a Graph, start: usize) -> Self {
        let mut visited = vec![false; graph.node_count()];
        visited[start] = true;
        Self { graph, visited, frontier: vec![start] }
    }
}

impl Iterator for Rings<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.frontier.is_empty() { return None }

        let mut next = Vec::new();
        for &node in &self.frontier {
            for nbr in self.graph.edges(node) {
                if !self.visited[nbr] {
                    self.visited[nbr] = true;
                    next.push(nbr);
                }
            }
        }
        next.sort_unstable();

        Some(std::mem::replace(&mut self.frontier, next))
    }
}
