//! Integration tests for the order pipeline.
//!
//! The tests in `tests/` wire the `orderflow` services to the
//! `orderflow-memory` adapters and drive whole flows: order creation
//! through the bus into stock reconciliation and mail, cache-aside reads
//! going stale and fresh, redelivery and dedupe under the two ack
//! policies, and concurrent guarded decrements.

// Everything lives under tests/; the library itself is intentionally empty.
#![cfg(test)]
