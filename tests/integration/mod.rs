//! Integration tests that test the library as a whole

// Coil length and coil-coil distance objectives
mod coil_optimization;

// Profile products fitted by least squares
mod profile_pressure;
