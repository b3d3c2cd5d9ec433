//! Kernel Unit Tests Module
//!
//! Tests that drive whole kernel operations on the simulated platform in
//! [`sim`]. Module-local unit tests live next to their code.


mod memory_tests;
mod scheduler_tests;
