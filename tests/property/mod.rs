//! Property-based tests for sibling indices and push-data framing

mod node_index;
mod push_data;
