use clap::CommandFactory;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn flags_override_environment_config() {
    let cli = Cli::try_parse_from([
        "parche",
        "--base-url",
        "http://localhost:8080/",
        "--session-file",
        "/tmp/parche-session",
        "--request-timeout-secs",
        "5",
        "navigate",
        "/home",
    ])
    .unwrap();

    let config = cli.config();
    assert_eq!(config.base_url, "http://localhost:8080");
    assert_eq!(config.session_file, Some(PathBuf::from("/tmp/parche-session")));
    assert_eq!(config.timeouts.request_secs, 5);
}

#[test]
fn parses_enum_arguments() {
    let cli = Cli::try_parse_from(["parche", "books", "status", "12", "want-to-read"]).unwrap();
    match cli.command {
        Command::Books(BooksCommand { command: BooksSubcommand::Status { book_id, status } }) => {
            assert_eq!(book_id, 12);
            assert_eq!(status, ReadingStatus::WantToRead);
        }
        other => panic!("unexpected command: {other:?}"),
    }

    let cli = Cli::try_parse_from(["parche", "lists", "create", "Verano", "--visibility", "followers-only"]).unwrap();
    match cli.command {
        Command::Lists(ListsCommand { command: ListsSubcommand::Create { visibility, description, .. } }) => {
            assert_eq!(visibility, ListVisibility::FollowersOnly);
            assert!(description.is_empty());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn unauthorized_maps_to_session_expired() {
    let err = CliError::from(ApiError::Unauthorized { message: "Token expired".to_owned() });
    assert!(matches!(err, CliError::SessionExpired { .. }));
    assert!(err.to_string().contains("log in again"));

    let err = CliError::from(ApiError::Transport("connection refused".to_owned()));
    assert_eq!(err.to_string(), "connection refused");
}

#[test]
fn refused_sign_in_keeps_server_message() {
    let err = CliError::from(ApiError::Unauthorized { message: "Invalid credentials".to_owned() });
    let err = err.without_prior_session();
    assert_eq!(err.to_string(), "Invalid credentials");

    let err = CliError::from(ApiError::Transport("connection refused".to_owned())).without_prior_session();
    assert_eq!(err.to_string(), "connection refused");
}

async fn run_against(server: &MockServer, session_file: &std::path::Path, args: &[&str]) -> Result<(), CliError> {
    let base_url = server.uri();
    let session_file = session_file.to_string_lossy().into_owned();
    let mut argv = vec!["parche", "--base-url", base_url.as_str(), "--session-file", session_file.as_str()];
    argv.extend_from_slice(args);
    run(Cli::try_parse_from(argv).unwrap()).await
}

#[tokio::test]
async fn wrong_password_reports_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "ERROR",
            "message": "Invalid credentials",
            "data": null
        })))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let err = run_against(&server, &dir.path().join("session"), &["auth", "login", "ana", "--password", "secreto"])
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Invalid credentials");
}

#[tokio::test]
async fn expired_session_asks_to_log_in_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "ERROR",
            "message": "Token expired",
            "data": null
        })))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let session = dir.path().join("session");
    std::fs::write(&session, "stale-token").unwrap();

    let err = run_against(&server, &session, &["profile", "me"]).await.unwrap_err();

    assert!(matches!(err, CliError::SessionExpired { .. }));
    assert!(!session.exists());
}
