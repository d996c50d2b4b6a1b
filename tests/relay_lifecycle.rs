//! Relay lifecycle tests
//!
//! Device probing order, start failure, idempotent stop, bounded shutdown
//! with a blocked reader, stream end and restart.


use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use camrelay::{Health, RelayError};
use relay_test_utils::*;
use tracing_test::traced_test;

#[test]
fn start_opens_lowest_working_index() {
    let (mut relay, probed) = device_list_relay([None, None, Some(true), Some(true), None]);

    relay.start().expect("device 2 should open");

    assert_eq!(relay.device_index(), Some(2));
    assert_eq!(*probed.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(relay.health(), Health::Running);
    assert_eq!(relay.frame_format(), Some(test_format()));
}

#[test]
fn device_that_is_not_ready_is_skipped() {
    let (mut relay, probed) = device_list_relay([Some(false), Some(true), None, None, None]);

    relay.start().unwrap();

    assert_eq!(relay.device_index(), Some(1));
    assert_eq!(*probed.lock().unwrap(), vec![0, 1]);
}

#[test]
fn start_fails_when_no_device_opens() {
    let (mut relay, probed) = device_list_relay([None, Some(false), None, None, None]);

    let err = relay.start().unwrap_err();

    assert!(matches!(err, RelayError::NoDevice { .. }));
    assert_eq!(*probed.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(relay.health(), Health::NotStarted);
    assert!(relay.fetch(true).is_none());
}

#[test]
fn stop_before_start_is_harmless() {
    let mut relay = free_running_relay(None);

    relay.stop();
    relay.stop();

    assert_eq!(relay.health(), Health::NotStarted);
    assert!(relay.fetch(false).is_none());
}

#[test]
fn stop_twice_leaves_relay_ended() {
    let mut relay = free_running_relay(Some(Duration::from_millis(2)));
    relay.start().unwrap();
    assert!(relay.fetch(true).is_some());

    relay.stop();
    relay.stop();

    assert_eq!(relay.health(), Health::Ended);
    let begin = Instant::now();
    assert!(relay.fetch(true).is_none());
    assert!(begin.elapsed() < Duration::from_millis(50));
}

#[test]
fn start_while_running_is_rejected() {
    let mut relay = free_running_relay(Some(Duration::from_millis(2)));
    relay.start().unwrap();

    assert!(matches!(relay.start(), Err(RelayError::AlreadyRunning)));
    assert!(relay.is_running());
}

#[test]
#[traced_test]
fn stop_with_blocked_reader_is_bounded() {
    let WatchedRelay {
        mut relay,
        gate,
        entered,
        ..
    } = watched_relay(None);
    relay.start().unwrap();

    // Producer is parked in read() and never returns on its own
    entered.recv_timeout(Duration::from_secs(1)).unwrap();
    let begin = Instant::now();
    relay.stop();
    let took = begin.elapsed();

    assert!(took >= Duration::from_millis(200), "stop returned after {took:?}");
    assert!(took < Duration::from_secs(1), "stop returned after {took:?}");
    assert_eq!(relay.health(), Health::Ended);
    assert!(logs_contain("detaching"));

    // Let the detached thread finish
    drop(gate);
}

#[test]
fn stop_releases_a_device_that_times_out_reads() {
    let WatchedRelay {
        mut relay,
        gate: _gate,
        live,
        entered,
    } = watched_relay(Some(Duration::from_millis(20)));
    relay.start().unwrap();
    entered.recv_timeout(Duration::from_secs(1)).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(relay.health(), Health::Running, "timeouts are not end of stream");

    let begin = Instant::now();
    relay.stop();
    assert!(begin.elapsed() < Duration::from_millis(200), "join timed out");
    assert_eq!(live.load(Ordering::SeqCst), 0, "device still held after stop");

    relay.start().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 1);
    relay.stop();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn stop_waits_for_a_cooperative_reader() {
    let mut relay = free_running_relay(Some(Duration::from_millis(5)));
    relay.start().unwrap();

    let begin = Instant::now();
    relay.stop();

    assert!(begin.elapsed() < Duration::from_millis(200));
}

#[test]
fn stream_end_is_permanent_and_non_blocking() {
    let mut relay = ending_relay(2);
    relay.start().unwrap();

    assert!(wait_for_health(&relay, Health::Ended, Duration::from_secs(2)));

    let begin = Instant::now();
    assert!(relay.fetch(true).is_none());
    assert!(relay.fetch(false).is_none());
    assert!(begin.elapsed() < Duration::from_millis(50));

    let stats = relay.stats();
    assert_eq!(stats.frames_published, 2);
    assert_eq!(stats.read_failures, 1);
}

#[test]
fn restart_after_stream_end() {
    let mut relay = ending_relay(1);
    relay.start().unwrap();
    assert!(wait_for_health(&relay, Health::Ended, Duration::from_secs(2)));

    relay.stop();
    relay.start().expect("restart should reopen the device");

    assert!(wait_for_health(&relay, Health::Ended, Duration::from_secs(2)));
    assert_eq!(relay.stats().frames_published, 2);
}

#[test]
fn start_reaps_an_ended_session() {
    let mut relay = ending_relay(1);
    relay.start().unwrap();
    assert!(wait_for_health(&relay, Health::Ended, Duration::from_secs(2)));

    // No explicit stop in between
    relay.start().unwrap();
    assert_eq!(relay.device_index(), Some(0));
}

#[test]
fn failed_restart_reports_not_started() {
    let mut relay = single_use_relay();
    relay.start().unwrap();
    assert!(wait_for_health(&relay, Health::Ended, Duration::from_secs(2)));

    // Reaps the ended session, then finds no device
    let err = relay.start().unwrap_err();
    assert!(matches!(err, RelayError::NoDevice { .. }));
    assert_eq!(relay.health(), Health::NotStarted);
    assert!(relay.device_index().is_none());
}

#[test]
fn drop_stops_the_producer() {
    let (mut relay, gate) = gated_relay();
    relay.start().unwrap();
    gate.send(()).unwrap();
    assert!(relay.fetch(true).is_some());

    let begin = Instant::now();
    drop(relay);
    assert!(begin.elapsed() < Duration::from_secs(1));
}

#[cfg(feature = "v4l2")]
#[test]
#[ignore = "needs a camera on /dev/video0..4"]
fn real_camera_end_to_end() {
    let mut relay = camrelay::Relay::v4l2(camrelay::Config::default());
    relay.start().expect("no camera found");

    let mut seen = Vec::new();
    for _ in 0..3 {
        let frame = relay.fetch(true).expect("camera stalled");
        assert_eq!(frame.len(), frame.format().byte_len());
        seen.push((frame.as_ptr(), frame.sequence()));
    }
    assert_ne!(seen[0].0, seen[1].0);
    assert_ne!(seen[1].0, seen[2].0);
    assert!(seen[0].1 < seen[1].1 && seen[1].1 < seen[2].1);

    relay.stop();
    assert!(relay.fetch(false).is_none());
}
