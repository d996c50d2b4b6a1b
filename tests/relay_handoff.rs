//! Frame hand-off tests
//!
//! Freshness, timing bounds of blocking and non-blocking fetches, and the
//! guarantee that a claimed frame is never overwritten while held.


use std::time::{Duration, Instant};

use camrelay::capture::synthetic::{frame_number, is_intact};
use relay_test_utils::*;

#[test]
fn non_blocking_fetch_without_frame_returns_at_once() {
    let (mut relay, _gate) = gated_relay();
    relay.start().unwrap();

    let begin = Instant::now();
    assert!(relay.fetch(false).is_none());
    assert!(begin.elapsed() < Duration::from_millis(10));
}

#[test]
fn blocking_fetch_gives_up_after_timeout() {
    let (mut relay, _gate) = gated_relay();
    relay.start().unwrap();

    let begin = Instant::now();
    assert!(relay.fetch(true).is_none());
    let waited = begin.elapsed();

    assert!(waited >= Duration::from_millis(450), "gave up after {waited:?}");
    assert!(waited < Duration::from_millis(1000), "gave up after {waited:?}");
}

#[test]
fn blocking_fetch_returns_as_soon_as_a_frame_lands() {
    let (mut relay, gate) = gated_relay();
    relay.start().unwrap();

    let feeder = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        gate.send(()).unwrap();
        gate
    });

    let begin = Instant::now();
    let frame = relay.fetch(true).expect("frame after 30 ms");
    assert_eq!(frame.sequence(), 1);
    assert!(begin.elapsed() < Duration::from_millis(400));
    drop(frame);

    let _gate = feeder.join().unwrap();
}

#[test]
fn each_frame_is_delivered_once() {
    let (mut relay, gate) = gated_relay();
    relay.start().unwrap();

    gate.send(()).unwrap();
    let first = relay.fetch(true).map(|f| f.sequence());
    assert_eq!(first, Some(1));
    assert!(relay.fetch(false).is_none());

    gate.send(()).unwrap();
    let second = relay.fetch(true).map(|f| f.sequence());
    assert_eq!(second, Some(2));

    let stats = relay.stats();
    assert_eq!(stats.frames_fetched, 2);
    assert_eq!(stats.frames_dropped, 0);
}

#[test]
fn newest_frame_wins_over_unread_ones() {
    let (mut relay, gate) = gated_relay();
    relay.start().unwrap();

    for _ in 0..3 {
        gate.send(()).unwrap();
    }
    // Wait until all three are published
    let deadline = Instant::now() + Duration::from_secs(2);
    while relay.stats().frames_published < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    let frame = relay.fetch(false).expect("published frames are fresh");
    assert_eq!(frame.sequence(), 3);
    assert_eq!(frame_number(&frame), Some(3));
    drop(frame);
    assert_eq!(relay.stats().frames_dropped, 2);
}

#[test]
fn consecutive_fetches_use_distinct_slots() {
    let mut relay = free_running_relay(Some(Duration::from_millis(2)));
    relay.start().unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let frame = relay.fetch(true).expect("producer is running");
        assert_eq!(frame.len(), test_format().byte_len());
        seen.push((frame.as_ptr(), frame_number(&frame).unwrap()));
    }

    for pair in seen.windows(2) {
        assert_ne!(pair[0].0, pair[1].0, "slot reused by consecutive fetches");
        assert!(pair[0].1 < pair[1].1, "contents did not advance");
    }
}

#[test]
fn held_frame_is_never_overwritten() {
    let mut relay = free_running_relay(None);
    relay.start().unwrap();

    let mut last = 0;
    for _ in 0..300 {
        let frame = relay.fetch(true).expect("producer is running");
        let n = frame_number(&frame).unwrap();
        assert!(n > last, "frame {n} delivered after {last}");
        assert!(is_intact(&frame), "torn frame {n}");

        // Producer keeps cycling the other two slots meanwhile
        std::thread::sleep(Duration::from_micros(200));
        assert_eq!(frame_number(&frame), Some(n));
        assert!(is_intact(&frame), "frame {n} changed while held");
        last = n;
    }
}

#[test]
fn raw_pointer_stays_valid_until_next_fetch() {
    let mut relay = free_running_relay(Some(Duration::from_millis(1)));
    relay.start().unwrap();

    let (ptr, len, n) = {
        let frame = relay.fetch(true).expect("producer is running");
        (frame.as_ptr(), frame.len(), frame_number(&frame).unwrap())
    };

    // The view is gone but the slot stays locked; let the producer run
    std::thread::sleep(Duration::from_millis(30));
    let published = relay.stats().frames_published;
    assert!(published > n);

    // SAFETY: the slot behind `ptr` is locked until the next fetch and its
    // allocation lives as long as the session.
    let pixels = unsafe { std::slice::from_raw_parts(ptr, len) };
    assert_eq!(frame_number(pixels), Some(n));
    assert!(is_intact(pixels));
}

#[test]
fn slow_consumer_loses_frames_without_stalling_producer() {
    let mut relay = free_running_relay(Some(Duration::from_millis(1)));
    relay.start().unwrap();

    let first = relay.fetch(true).map(|f| f.sequence()).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    let second = relay.fetch(true).map(|f| f.sequence()).unwrap();

    assert!(second > first + 1, "producer stalled: {first} -> {second}");
    assert!(relay.stats().frames_dropped > 0);
}

#[test]
fn fetch_after_stop_is_empty() {
    let mut relay = free_running_relay(Some(Duration::from_millis(1)));
    relay.start().unwrap();
    assert!(relay.fetch(true).is_some());

    relay.stop();

    let begin = Instant::now();
    assert!(relay.fetch(true).is_none());
    assert!(relay.fetch(false).is_none());
    assert!(begin.elapsed() < Duration::from_millis(10));
}
