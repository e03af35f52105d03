use disarm::io::{connect, AccessToken, Authenticator, Session};
use disarm::DisarmError;

/// Authenticator whose default session fails a fixed number of times
struct FlakyAuth {
    failures_left: usize,
    initialize_calls: usize,
    authenticate_calls: usize,
    reauth_fails: bool,
}

impl FlakyAuth {
    fn failing(times: usize) -> Self {
        Self {
            failures_left: times,
            initialize_calls: 0,
            authenticate_calls: 0,
            reauth_fails: false,
        }
    }
}

impl Authenticator for FlakyAuth {
    fn initialize(&mut self) -> Result<Session, DisarmError> {
        self.initialize_calls += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(DisarmError::Auth("token expired".to_string()));
        }
        Ok(Session::new("disarm-demo", AccessToken::new("ya29.test", 3600)))
    }

    fn authenticate(&mut self) -> Result<(), DisarmError> {
        self.authenticate_calls += 1;
        if self.reauth_fails {
            Err(DisarmError::Auth("user declined".to_string()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_single_failure_recovers_with_one_reauthentication() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut auth = FlakyAuth::failing(1);
    let session = connect(&mut auth).expect("session after re-authentication");

    assert_eq!(session.project, "disarm-demo");
    assert_eq!(auth.authenticate_calls, 1);
    assert_eq!(auth.initialize_calls, 2);
}

#[test]
fn test_two_consecutive_failures_are_fatal() {
    let mut auth = FlakyAuth::failing(2);
    let result = connect(&mut auth);

    match result {
        Err(DisarmError::Auth(message)) => {
            println!("Fatal as expected: {}", message);
            assert!(message.contains("after re-authentication"));
        }
        other => panic!("expected a fatal auth error, got {:?}", other.map(|s| s.project)),
    }
    assert_eq!(auth.authenticate_calls, 1);
    assert_eq!(auth.initialize_calls, 2);
}

#[test]
fn test_failed_reauthentication_is_fatal() {
    let mut auth = FlakyAuth::failing(1);
    auth.reauth_fails = true;

    assert!(matches!(connect(&mut auth), Err(DisarmError::Auth(_))));
    assert_eq!(auth.authenticate_calls, 1);
    assert_eq!(auth.initialize_calls, 1);
}

#[test]
fn test_healthy_session_never_reauthenticates() {
    let mut auth = FlakyAuth::failing(0);
    assert!(connect(&mut auth).is_ok());
    assert_eq!(auth.authenticate_calls, 0);
}
