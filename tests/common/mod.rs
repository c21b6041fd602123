pub mod memory_node;
