// tests/integration_test.rs

//! Integration tests for the procscope console server.
//!
//! These tests run a real server on ephemeral ports and talk to it over
//! actual sockets, end to end through the adapters, the registry, and the
//! command pool.

mod integration {
    pub mod line_protocol_test;
    pub mod message_protocol_test;
    pub mod test_helpers;
}
