use surge_common::SurgeError;

#[test]
fn test_error_display() {
    let err = SurgeError::NetworkError("connection refused".to_string());
    assert_eq!(err.to_string(), "Network error: connection refused");
}

#[test]
fn test_error_equality() {
    let err1 = SurgeError::Configuration("empty ramp".to_string());
    let err2 = SurgeError::Configuration("empty ramp".to_string());
    let err3 = SurgeError::Configuration("bad threshold".to_string());

    assert_eq!(err1, err2);
    assert_ne!(err1, err3);
}

#[test]
fn test_timeout() {
    let err = SurgeError::Timeout(1500);
    assert_eq!(err.to_string(), "Request timed out after 1500 ms");
}

#[test]
fn test_check_failed() {
    let err = SurgeError::CheckFailed("status is 200".to_string());
    assert_eq!(err.to_string(), "Check failed: status is 200");
}

#[test]
fn test_capacity_exceeded() {
    let err = SurgeError::CapacityExceeded { requested: 900, cap: 500 };
    assert_eq!(err.to_string(), "Target concurrency 900 exceeds worker cap 500");
}

#[test]
fn test_invalid_time() {
    let err = SurgeError::InvalidTime("-1s".to_string());
    assert_eq!(err.to_string(), "Invalid elapsed time: -1s");
}

#[test]
fn test_config_helper() {
    assert_eq!(
        SurgeError::config("stage list is empty"),
        SurgeError::Configuration("stage list is empty".to_string())
    );
}

#[test]
fn test_is_transport() {
    assert!(SurgeError::NetworkError("dns".to_string()).is_transport());
    assert!(SurgeError::Timeout(10).is_transport());
    assert!(!SurgeError::CheckFailed("x".to_string()).is_transport());
    assert!(!SurgeError::Configuration("x".to_string()).is_transport());
    assert!(!SurgeError::CapacityExceeded { requested: 2, cap: 1 }.is_transport());
}

#[test]
fn test_error_roundtrip_json() {
    let original = SurgeError::CapacityExceeded { requested: 10, cap: 5 };
    let json = serde_json::to_string(&original).unwrap();
    let decoded: SurgeError = serde_json::from_str(&json).unwrap();
    assert_eq!(original, decoded);
}
