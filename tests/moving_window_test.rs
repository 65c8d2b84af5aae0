//! Integration tests for the moving window: ingestion, slot arithmetic seen
//! through the public read API, resampling and shutdown.

use chrono::{DateTime, TimeDelta, Utc};
use rust_telemetry::timeseries::{
    Key, MovingWindow, ResamplerConfig, ResamplingFunction, Sample, Selection, UNIX_EPOCH,
};
use rust_telemetry::WindowError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

const SECOND: Duration = Duration::from_secs(1);

fn at(secs: i64) -> DateTime<Utc> {
    UNIX_EPOCH + TimeDelta::seconds(1_700_000_000 + secs)
}

/// Let the window tasks drain everything queued so far.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// A five-slot window of one-second slots with samples `values` at t = 0, 1, ...
async fn window_with(values: &[f64]) -> (MovingWindow, mpsc::Sender<Sample>) {
    let (tx, rx) = mpsc::channel(64);
    let window = assert_ok!(MovingWindow::new(Duration::from_secs(5), rx, SECOND));
    for (i, value) in values.iter().enumerate() {
        tx.send(Sample::new(at(i as i64), *value)).await.unwrap();
    }
    settle().await;
    (window, tx)
}

fn assert_same(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a.is_nan() && e.is_nan()) || a == e,
            "{actual:?} vs {expected:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_values_are_read_in_logical_order() {
    let (mut window, _tx) = window_with(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).await;

    // Two values wrapped out of the five slots
    assert_eq!(window.len(), 5);
    assert_same(&window.to_vec(), &[3.0, 4.0, 5.0, 6.0, 7.0]);
    assert_eq!(window.at(0).unwrap(), 3.0);
    assert_eq!(window.at(-1).unwrap(), 7.0);
    assert_eq!(window.get(-5).unwrap(), Selection::Value(3.0));
    assert_eq!(window.time_bound_oldest(), Some(at(2)));
    assert_eq!(window.time_bound_newest(), Some(at(6)));

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timestamps_round_down_to_their_slot() {
    let (mut window, tx) = window_with(&[1.0, 2.0, 3.0]).await;

    assert_eq!(window.at_time(at(1)).unwrap(), 2.0);
    assert_eq!(window.at_time(at(1) + TimeDelta::milliseconds(999)).unwrap(), 2.0);

    // A late sample inside the span overwrites its slot
    tx.send(Sample::new(at(1) + TimeDelta::milliseconds(400), 20.0))
        .await
        .unwrap();
    settle().await;
    assert_eq!(window.get(at(1)).unwrap(), Selection::Value(20.0));
    assert_eq!(window.time_bound_newest(), Some(at(2)));

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_reads_fail_without_side_effects() {
    let (mut window, _tx) = window_with(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).await;
    let before = window.to_vec();

    let err = assert_err!(window.at(5));
    assert!(matches!(err, WindowError::IndexOutOfRange { index: 5, len: 5 }));
    assert!(assert_err!(window.at(-6)).is_out_of_range());
    assert!(assert_err!(window.at_time(at(0))).is_out_of_range());
    assert!(assert_err!(window.at_time(at(6))).is_out_of_range());

    assert_same(&window.to_vec(), &before);
    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reads_before_first_sample() {
    let (mut window, _tx) = window_with(&[]).await;

    assert_eq!(window.time_bound_oldest(), None);
    assert_eq!(window.count_valid(), 0);
    assert!(window.at(0).unwrap().is_nan());
    assert!(assert_err!(window.at_time(at(0))).is_out_of_range());
    assert!(assert_err!(window.get(Key::range_from(at(0)))).is_out_of_range());

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_gaps_read_as_missing() {
    let (tx, rx) = mpsc::channel(64);
    let mut window = MovingWindow::new(Duration::from_secs(5), rx, SECOND).unwrap();

    for (t, value) in [(0, 1.0), (1, 2.0), (4, 5.0)] {
        tx.send(Sample::new(at(t), value)).await.unwrap();
    }
    tx.send(Sample::absent(at(5))).await.unwrap();
    settle().await;

    assert_same(&window.to_vec(), &[2.0, f64::NAN, f64::NAN, 5.0, f64::NAN]);
    assert_eq!(window.count_valid(), 2);
    assert!(window.at_time(at(2)).unwrap().is_nan());

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_jump_past_whole_window_clears_it() {
    let (mut window, tx) = window_with(&[1.0, 2.0, 3.0, 4.0, 5.0]).await;

    tx.send(Sample::new(at(100), 9.0)).await.unwrap();
    settle().await;

    assert_same(
        &window.to_vec(),
        &[f64::NAN, f64::NAN, f64::NAN, f64::NAN, 9.0],
    );
    assert_eq!(window.time_bound_oldest(), Some(at(96)));

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_index_slices() {
    let (mut window, _tx) = window_with(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).await;

    assert_eq!(
        window.get(1..4).unwrap(),
        Selection::Values(vec![4.0, 5.0, 6.0])
    );
    assert_eq!(window.get(-2..).unwrap().into_values(), vec![6.0, 7.0]);
    assert_eq!(window.get(..2).unwrap().into_values(), vec![3.0, 4.0]);
    assert_eq!(
        window.get(..).unwrap().into_values(),
        vec![3.0, 4.0, 5.0, 6.0, 7.0]
    );
    assert_eq!(window.window_by_index(3, 5).unwrap(), vec![6.0, 7.0]);

    assert!(matches!(
        window.get(3..1),
        Err(WindowError::EmptyRange(_))
    ));
    assert!(window.get(0..6).unwrap_err().is_out_of_range());

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_time_slices() {
    let (mut window, _tx) = window_with(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).await;

    assert_eq!(
        window.get(at(3)..at(5)).unwrap().into_values(),
        vec![4.0, 5.0]
    );
    assert_eq!(window.window(at(5), at(7)).unwrap(), vec![6.0, 7.0]);

    // Open-ended time slices stop at the newest timestamp, exclusive
    assert_eq!(
        window.get(at(4)..).unwrap().into_values(),
        vec![5.0, 6.0]
    );
    assert_eq!(
        window.get(..at(4)).unwrap().into_values(),
        vec![3.0, 4.0]
    );

    assert!(matches!(
        window.get(at(5)..at(5)),
        Err(WindowError::EmptyRange(_))
    ));
    assert!(window.get(at(0)..at(4)).unwrap_err().is_out_of_range());

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slice_keys_of_mixed_kind_are_rejected() {
    let (mut window, _tx) = window_with(&[1.0, 2.0, 3.0]).await;

    assert!(matches!(
        window.get(Key::range(0, at(2))),
        Err(WindowError::KeyType(_))
    ));
    assert!(matches!(
        window.get(Key::range(at(0), 2)),
        Err(WindowError::KeyType(_))
    ));
    assert!(matches!(
        window.get(Key::range_from(Key::full())),
        Err(WindowError::KeyType(_))
    ));

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_custom_alignment_shifts_slot_grid() {
    let (tx, rx) = mpsc::channel(8);
    let mut window = MovingWindow::builder(Duration::from_secs(10), rx, Duration::from_secs(2))
        .align_to(at(1))
        .build()
        .unwrap();

    tx.send(Sample::new(at(4), 1.0)).await.unwrap();
    settle().await;

    // grid points are at odd seconds
    assert_eq!(window.time_bound_newest(), Some(at(3)));
    assert_eq!(window.at_time(at(4)).unwrap(), 1.0);

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resampled_window_emits_one_value_per_period() {
    let (tx, rx) = mpsc::channel(64);
    let mut window = MovingWindow::builder(Duration::from_secs(5), rx, Duration::from_millis(100))
        .resampler_config(ResamplerConfig::new(SECOND).with_align_to(None))
        .build()
        .unwrap();
    assert_eq!(window.len(), 5);
    assert_eq!(window.sampling_period(), SECOND);

    for value in 1..=10 {
        tx.send(Sample::new(Utc::now(), f64::from(value)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(window.at(-1).unwrap(), 5.5);

    // a period without input resamples to a missing value
    tokio::time::sleep(SECOND).await;
    assert!(window.at(-1).unwrap().is_nan());
    assert_eq!(window.at(-2).unwrap(), 5.5);

    let oldest = window.time_bound_oldest().unwrap();
    let newest = window.time_bound_newest().unwrap();
    assert_eq!(newest - oldest, TimeDelta::seconds(4));

    window.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resampler_function_is_applied() {
    let (tx, rx) = mpsc::channel(64);
    let mut window = MovingWindow::builder(Duration::from_secs(5), rx, Duration::from_millis(100))
        .resampler_config(
            ResamplerConfig::new(SECOND)
                .with_align_to(None)
                .with_function(ResamplingFunction::Max),
        )
        .build()
        .unwrap();

    for value in [3.0, 9.0, 1.0] {
        tx.send(Sample::new(Utc::now(), value)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(window.at(-1).unwrap(), 9.0);

    window.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_readers_see_whole_values() {
    let (tx, rx) = mpsc::channel(1024);
    let mut window = MovingWindow::new(Duration::from_secs(100), rx, SECOND).unwrap();

    let producer = tokio::spawn(async move {
        for i in 0..2_000_i64 {
            tx.send(Sample::new(at(i), i as f64)).await.unwrap();
        }
    });

    while !producer.is_finished() {
        let values = window.to_vec();
        assert_eq!(values.len(), 100);
        for value in values.iter().filter(|v| !v.is_nan()) {
            assert_eq!(value.fract(), 0.0);
            assert!((0.0..2_000.0).contains(value));
        }
        tokio::task::yield_now().await;
    }
    producer.await.unwrap();

    window.stop().await.unwrap();
}
