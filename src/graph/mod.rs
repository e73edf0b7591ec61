mod bfs;
mod graph;

pub(crate) use bfs::Rings;
pub(crate) use graph::Graph;
