//! Integration tests for DOF containers
//!
//! These tests exercise containers through the public API only.

// Tests for free/fixed bookkeeping, bounds and serialization
mod container_tests;
