//! Integration tests for objective combinators

// Sums, scalings, penalties, least squares and constraints
mod objective_tests;
