// tests/integration_test.rs

//! Integration tests for the control/agent protocol: connection handling,
//! fan-out broadcast, and the control/agent locators, each driven end to end
//! through a real `ConnectionHandler` over a loopback stream.

mod integration {
    pub mod test_helpers;

    pub mod dispatcher_test;
    pub mod fanout_test;
    pub mod handler_test;
    pub mod handshake_test;
    pub mod locator_test;
}
