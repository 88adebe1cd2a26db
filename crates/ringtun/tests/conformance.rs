//! Shared conformance suite run against the loopback driver.

use std::time::Duration;

use ringtun_testkit::{scenarios, LoopbackDriver};

#[test]
fn receive_round_trip() {
    scenarios::run_receive_round_trip(&LoopbackDriver::new());
}

#[test]
fn send_round_trip() {
    scenarios::run_send_round_trip(&LoopbackDriver::new());
}

#[test]
fn empty_receive_is_not_an_error() {
    scenarios::run_empty_receive(&LoopbackDriver::new());
}

#[test]
fn backpressure_then_drain() {
    scenarios::run_backpressure_then_drain(&LoopbackDriver::new());
}

#[test]
fn terminating_surfaces_on_all_paths() {
    scenarios::run_terminating_surfaces(&LoopbackDriver::new());
}

#[test]
fn corrupt_ring_is_fatal() {
    scenarios::run_corrupt_ring_surfaces(&LoopbackDriver::new());
}

#[test]
fn wait_times_out_at_or_after_deadline() {
    scenarios::run_wait_timeout(&LoopbackDriver::new(), Duration::from_millis(500));
}
