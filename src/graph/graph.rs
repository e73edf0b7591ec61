use crate::graph::Rings;

/// An unweighted, undirected graph in compressed sparse row format.
#[derive(Debug, Default, Clone)]
pub(crate) struct Graph {
    size: usize,
    offsets: Vec<u32>,
    edges: Vec<u32>,
}

impl Graph {
    /// Construct a graph from adjacency lists.
    pub(crate) fn new(edges: &[Vec<u32>]) -> Self {
        let size = edges.len();
        edges.iter().enumerate().for_each(|(i, nbrs)| {
            assert!(nbrs.iter().all(|&j| (j as usize) < size), "edges[{i}] references a node out of range");
        });

        Self {
            size,
            offsets: std::iter::once(0u32).chain(
                edges.iter()
                    .map(|v| v.len() as u32)
                    .scan(0u32, |acc, len| {*acc += len; Some(*acc)})
            ).collect::<Vec<u32>>(),
            edges: edges.iter().flatten().copied().collect(),
        }
    }

    /// Number of cells.
    #[inline] pub(crate) fn node_count(&self) -> usize { self.size }

    /// Get the number of directed edge entries in the graph.
    #[inline] pub(crate) fn edge_count(&self) -> usize { self.edges.len() }

    /// Slice of `edges` holding the neighbors of `node`.
    #[inline]
    fn range(&self, node: usize) -> std::ops::Range<usize> {
        self.offsets[node] as usize .. self.offsets[node + 1] as usize
    }

    /// Number of neighbors of `node`.
    #[inline] pub(crate) fn degree(&self, node: usize) -> usize { self.range(node).len() }

    /// Neighbors of `node`, in the order they were listed.
    #[inline]
    pub(crate) fn edges(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.range(node).map(move |v| self.edges[v] as usize)
    }

    /// Breadth-first rings around `start`: `[start]`, its neighbors, their
    /// unseen neighbors, and so on until the component is exhausted.
    pub(crate) fn rings(&self, start: usize) -> Rings<'_> {
        Rings::new(self, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cells of a 2 x 2 grid, corners touching: every cell borders the other three.
    fn full_block() -> Graph {
        Graph::new(&[vec![1, 2, 3], vec![0, 2, 3], vec![0, 1, 3], vec![0, 1, 2]])
    }

    /// A strip of three cells with a dropped cell after it.
    fn strip() -> Graph {
        Graph::new(&[vec![1], vec![0, 2], vec![1], vec![]])
    }

    #[test]
    fn offsets_accumulate_neighbor_counts() {
        let graph = strip();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.offsets, vec![0, 1, 3, 4, 4]);
        assert_eq!(graph.edges, vec![1, 0, 2, 1]);
    }

    #[test]
    fn degrees_and_neighbors() {
        let graph = full_block();
        assert!((0..4).all(|cell| graph.degree(cell) == 3));
        assert_eq!(graph.edges(2).collect::<Vec<_>>(), vec![0, 1, 3]);

        let graph = strip();
        assert_eq!(graph.degree(3), 0);
        assert!(graph.edges(3).next().is_none());
    }

    #[test]
    fn no_cells_no_edges() {
        let graph = Graph::new(&[]);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.offsets, vec![0]);
    }

    #[test]
    #[should_panic(expected = "edges[1] references a node out of range")]
    fn dangling_neighbor_panics() {
        Graph::new(&[vec![], vec![7]]);
    }
}
