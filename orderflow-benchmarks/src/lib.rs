//! Criterion benchmarks for the orderflow services.
//!
//! Everything runs against the in-memory adapters, so the numbers measure
//! service and adapter overhead rather than any real backend.
