pub mod frame_graph;
pub mod shortest_path;
