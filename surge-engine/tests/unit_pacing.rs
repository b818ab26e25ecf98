use rand::{rngs::StdRng, SeedableRng};
use std::time::Duration;
use surge_common::SurgeError;
use surge_engine::pacing::Pacing;
use tokio::sync::watch;
use tokio::time::Instant;

#[test]
fn test_draw_distributions() {
    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(Pacing::None.draw(&mut rng), Duration::ZERO);
    let fixed = Pacing::Fixed(Duration::from_millis(500));
    assert_eq!(fixed.draw(&mut rng), Duration::from_millis(500));

    let uniform = Pacing::uniform(Duration::from_secs(1), Duration::from_secs(3)).unwrap();
    let mut distinct = std::collections::HashSet::new();
    for _ in 0..200 {
        let d = uniform.draw(&mut rng);
        assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(3), "{d:?} out of range");
        distinct.insert(d);
    }
    assert!(distinct.len() > 1, "uniform pacing never varied");

    let degenerate = Pacing::uniform(Duration::from_secs(2), Duration::from_secs(2)).unwrap();
    assert_eq!(degenerate.draw(&mut rng), Duration::from_secs(2));
}

#[test]
fn test_inverted_range_rejected() {
    assert!(matches!(
        Pacing::uniform(Duration::from_secs(3), Duration::from_secs(1)),
        Err(SurgeError::Configuration(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_pause_sleeps_full_delay() {
    let (_tx, mut rx) = watch::channel(false);
    let start = Instant::now();
    assert!(Pacing::Fixed(Duration::from_secs(2)).pause(&mut rx).await);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_pause_interrupted_by_stop() {
    let (tx, mut rx) = watch::channel(false);
    let start = Instant::now();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send_replace(true);
        tx
    });
    assert!(!Pacing::Fixed(Duration::from_secs(10)).pause(&mut rx).await);
    assert_eq!(start.elapsed(), Duration::from_millis(300));
    stopper.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pause_returns_immediately_when_already_stopped() {
    let (_tx, mut rx) = watch::channel(true);
    let start = Instant::now();
    assert!(!Pacing::Fixed(Duration::from_secs(5)).pause(&mut rx).await);
    assert_eq!(start.elapsed(), Duration::ZERO);
}
