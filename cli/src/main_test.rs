use super::*;

fn decide_args(argv: &[&str]) -> DecideArgs {
    let mut full = vec!["wayguard", "decide"];
    full.extend_from_slice(argv);
    match Cli::try_parse_from(full).map(|cli| cli.command) {
        Ok(Command::Decide(args)) => args,
        other => panic!("expected decide args, got {other:?}"),
    }
}

#[test]
fn build_route_merges_extra_query() {
    let route = build_route("/onboarding?step=2", &["ref=mail".to_owned()]).unwrap();
    assert_eq!(route.path, "/onboarding");
    assert_eq!(route.query_param("step"), Some("2"));
    assert_eq!(route.query_param("ref"), Some("mail"));
}

#[test]
fn build_route_rejects_malformed_pair() {
    let err = build_route("/home", &["novalue".to_owned()]).unwrap_err();
    assert!(matches!(err, CliError::InvalidQuery(pair) if pair == "novalue"));
    assert!(matches!(build_route("/home", &["=x".to_owned()]), Err(CliError::InvalidQuery(_))));
}

#[test]
fn anonymous_snapshot_ignores_profile() {
    let args = decide_args(&["--path", "/home", "--profile", "complete"]);
    let snap = build_snapshot(&args);
    assert!(snap.session.is_none());
    assert!(snap.profile.is_none());
    assert!(snap.session_initialized);
}

#[test]
fn signed_in_snapshot_drops_guest_flag() {
    let args = decide_args(&["--path", "/home", "--user", "u1", "--guest", "--profile", "deleted"]);
    let snap = build_snapshot(&args);
    assert_eq!(snap.user_id(), Some("u1"));
    assert!(!snap.is_guest);
    assert_eq!(snap.profile, Some(Profile { onboarding_completed: true, is_deleted: true }));
}

#[test]
fn loading_flag_leaves_session_uninitialized() {
    let args = decide_args(&["--path", "/home", "--loading"]);
    let snap = build_snapshot(&args);
    assert!(snap.loading);
    assert!(!snap.session_initialized);
}

#[test]
fn probe_requires_path() {
    assert!(Cli::try_parse_from(["wayguard", "probe"]).is_err());
}

#[test]
fn last_redirect_flag_suppresses_forced_onboarding() {
    let routes = RouteTable::default();
    let fresh = decide_args(&["--path", "/home", "--user", "u1"]);
    let ruling = evaluate_args(&fresh, &routes).unwrap().unwrap();
    assert_eq!(ruling.rule, wayguard::Rule::ForceOnboarding);

    let repeat = decide_args(&["--path", "/home", "--user", "u1", "--last-redirect", "/onboarding"]);
    let ruling = evaluate_args(&repeat, &routes).unwrap().unwrap();
    assert_eq!(ruling.rule, wayguard::Rule::LoopBreaker);
}

#[test]
fn loading_state_has_no_ruling() {
    let args = decide_args(&["--path", "/home", "--loading"]);
    assert_eq!(evaluate_args(&args, &RouteTable::default()).unwrap(), None);
}
