mod execution_tests;
mod node_tests;
