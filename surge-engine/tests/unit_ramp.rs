use std::time::Duration;
use surge_common::SurgeError;
use surge_engine::ramp::{RampProfile, RampScheduler, Stage};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn up_down() -> RampScheduler {
    // 0 -> 5 over 10 s, then 5 -> 0 over 10 s
    let profile = RampProfile::new(vec![Stage::new(secs(10), 5), Stage::new(secs(10), 0)]);
    RampScheduler::new(profile.unwrap())
}

#[test]
fn test_linear_interpolation_across_stages() {
    let ramp = up_down();
    assert_eq!(ramp.target_at(secs(0)), Some(0));
    assert_eq!(ramp.target_at(Duration::from_millis(4_000)), Some(2));
    // 2.5 rounds half away from zero
    assert_eq!(ramp.target_at(secs(5)), Some(3));
    assert_eq!(ramp.target_at(secs(10)), Some(5));
    assert_eq!(ramp.target_at(secs(15)), Some(3));
    assert_eq!(ramp.target_at(secs(18)), Some(1));
}

#[test]
fn test_end_of_ramp() {
    let ramp = up_down();
    // Exactly at the total duration the final target still applies.
    assert_eq!(ramp.target_at(secs(20)), Some(0));
    assert_eq!(ramp.target_at(Duration::from_millis(20_001)), None);
    assert_eq!(ramp.target_at(secs(3600)), None);
}

#[test]
fn test_zero_duration_stage_jumps() {
    let profile = RampProfile::new(vec![Stage::new(Duration::ZERO, 8), Stage::new(secs(10), 8)]);
    let ramp = RampScheduler::new(profile.unwrap());
    assert_eq!(ramp.target_at(secs(0)), Some(8));
    assert_eq!(ramp.target_at(secs(7)), Some(8));
    assert_eq!(ramp.target_at(secs(10)), Some(8));
}

#[test]
fn test_constant_profile() {
    let profile = RampProfile::constant(3, secs(60)).unwrap();
    assert_eq!(profile.total_duration(), secs(60));
    assert_eq!(profile.peak(), 3);
    let ramp = RampScheduler::new(profile);
    assert_eq!(ramp.target_at(secs(0)), Some(3));
    assert_eq!(ramp.target_at(secs(30)), Some(3));
    assert_eq!(ramp.target_at(secs(61)), None);
}

#[test]
fn test_target_at_monotone_within_rising_stage() {
    let ramp = RampScheduler::new(RampProfile::new(vec![Stage::new(secs(100), 37)]).unwrap());
    let mut prev = 0;
    for ms in (0..=100_000).step_by(250) {
        let t = ramp.target_at(Duration::from_millis(ms)).unwrap();
        assert!(t >= prev, "target fell from {prev} to {t} at {ms} ms");
        assert!(t <= 37);
        prev = t;
    }
    assert_eq!(prev, 37);
}

#[test]
fn test_target_at_secs_rejects_bad_input() {
    let ramp = up_down();
    assert!(matches!(ramp.target_at_secs(-1.0), Err(SurgeError::InvalidTime(_))));
    assert!(matches!(ramp.target_at_secs(f64::NAN), Err(SurgeError::InvalidTime(_))));
    assert!(matches!(ramp.target_at_secs(f64::INFINITY), Err(SurgeError::InvalidTime(_))));
    assert!(matches!(ramp.target_at_secs(1e20), Err(SurgeError::InvalidTime(_))));
    assert_eq!(ramp.target_at_secs(1e9).unwrap(), None);
    assert_eq!(ramp.target_at_secs(5.0).unwrap(), Some(3));
}

#[test]
fn test_profile_validation() {
    assert!(matches!(RampProfile::new(vec![]), Err(SurgeError::Configuration(_))));
    assert!(matches!(
        RampProfile::new(vec![Stage::new(Duration::ZERO, 5)]),
        Err(SurgeError::Configuration(_))
    ));
}

#[test]
fn test_stage_index() {
    let ramp = up_down();
    assert_eq!(ramp.stage_index_at(secs(0)), Some(0));
    assert_eq!(ramp.stage_index_at(secs(9)), Some(0));
    assert_eq!(ramp.stage_index_at(secs(10)), Some(1));
    assert_eq!(ramp.stage_index_at(secs(20)), Some(1));
    assert_eq!(ramp.stage_index_at(secs(21)), None);
}
