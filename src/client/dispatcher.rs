//! Command dispatcher
//!
//! Maps a command name and JSON arguments onto the matching remote call.
//! Names form a closed set; anything else is `UnknownCommand`. Remote and
//! local failures never escape as errors, they come back as
//! `Outcome::Failed` or, for account commands, as an unsuccessful reply.

use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::error::{Failure, TransferError, TransferResult};
use super::transfer::TransferEngine;
use crate::protocol::MessageResponse;
use crate::snapshot::SyncState;
use crate::upload::UploadMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Register,
    Activate,
    RequestPasswordReset,
    ResetPassword,
    Download,
    Upload,
    Modify,
    Move,
    Delete,
    Copy,
    GetFullSnapshot,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Activate => "activate",
            Self::RequestPasswordReset => "request-password-reset",
            Self::ResetPassword => "reset-password",
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Modify => "modify",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Copy => "copy",
            Self::GetFullSnapshot => "get-full-snapshot",
        }
    }
}

impl FromStr for CommandKind {
    type Err = DispatchError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        let kind = match normalized.as_str() {
            "register" => Self::Register,
            "activate" => Self::Activate,
            "request-password-reset" | "reqrecoverpass" => Self::RequestPasswordReset,
            "reset-password" | "recoverpass" => Self::ResetPassword,
            "download" => Self::Download,
            "upload" => Self::Upload,
            "modify" => Self::Modify,
            "move" => Self::Move,
            "delete" => Self::Delete,
            "copy" => Self::Copy,
            "get-full-snapshot" | "get-server-snapshot" => Self::GetFullSnapshot,
            _ => return Err(DispatchError::UnknownCommand(name.to_string())),
        };
        Ok(kind)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid arguments for {command}: {reason}")]
    InvalidArguments {
        command: &'static str,
        reason: String,
    },
}

/// Reply to a user-management command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountReply {
    /// Server message, or the server's details on refusal
    pub content: Value,
    pub successful: bool,
}

/// Result of a dispatched command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Account(AccountReply),
    Timestamp(i64),
    Downloaded(PathBuf),
    Snapshot(SyncState),
    Failed(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Account(reply) => reply.successful,
            Self::Failed(_) => false,
            _ => true,
        }
    }
}

// Arguments

#[derive(Debug, Deserialize)]
struct RegisterArgs {
    user: Option<String>,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ActivateArgs {
    user: Option<String>,
    #[serde(alias = "activation_code")]
    code: String,
}

#[derive(Debug, Deserialize)]
struct ResetRequestArgs {
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResetArgs {
    user: Option<String>,
    #[serde(alias = "recoverpass_code")]
    code: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    #[serde(alias = "filepath")]
    path: String,
}

#[derive(Debug, Deserialize)]
struct UploadArgs {
    #[serde(alias = "filepath")]
    path: String,
    #[serde(default, alias = "md5")]
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferArgs {
    src: String,
    dst: String,
}

pub struct Dispatcher {
    engine: TransferEngine,
}

impl Dispatcher {
    pub fn new(engine: TransferEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    /// Run a command by name
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Outcome, DispatchError> {
        let kind = CommandKind::from_str(name)?;
        self.run(kind, args).await
    }

    pub async fn run(&self, kind: CommandKind, args: Value) -> Result<Outcome, DispatchError> {
        tracing::debug!(command = kind.as_str(), "Dispatching command");

        let connection = self.engine.connection();
        let result = match kind {
            CommandKind::Download => {
                let args: PathArgs = parse_args(kind, args)?;
                self.engine.download(&args.path).await.map(Outcome::Downloaded)
            }
            CommandKind::Upload | CommandKind::Modify => {
                let args: UploadArgs = parse_args(kind, args)?;
                let mode = if kind == CommandKind::Upload {
                    UploadMode::Create
                } else {
                    UploadMode::Modify
                };
                self.engine
                    .upload(&args.path, args.hash.as_deref(), mode)
                    .await
                    .map(Outcome::Timestamp)
            }
            CommandKind::Move => {
                let args: TransferArgs = parse_args(kind, args)?;
                connection.move_file(&args.src, &args.dst).await.map(Outcome::Timestamp)
            }
            CommandKind::Copy => {
                let args: TransferArgs = parse_args(kind, args)?;
                connection.copy_file(&args.src, &args.dst).await.map(Outcome::Timestamp)
            }
            CommandKind::Delete => {
                let args: PathArgs = parse_args(kind, args)?;
                connection.delete(&args.path).await.map(Outcome::Timestamp)
            }
            CommandKind::GetFullSnapshot => connection.fetch_snapshot().await.map(Outcome::Snapshot),
            CommandKind::Register
            | CommandKind::Activate
            | CommandKind::RequestPasswordReset
            | CommandKind::ResetPassword => {
                let result = self.run_account(kind, args).await?;
                return Ok(account_outcome(kind, result));
            }
        };

        Ok(result.unwrap_or_else(|e| failed(kind, &e)))
    }

    async fn run_account(
        &self,
        kind: CommandKind,
        args: Value,
    ) -> Result<TransferResult<MessageResponse>, DispatchError> {
        let connection = self.engine.connection();
        let default_user = connection.username().to_string();

        let result = match kind {
            CommandKind::Register => {
                let args: RegisterArgs = parse_args(kind, args)?;
                let user = args.user.unwrap_or(default_user);
                connection.register(&user, &args.password).await
            }
            CommandKind::Activate => {
                let args: ActivateArgs = parse_args(kind, args)?;
                let user = args.user.unwrap_or(default_user);
                connection.activate(&user, &args.code).await
            }
            CommandKind::RequestPasswordReset => {
                let args: ResetRequestArgs = parse_args(kind, args)?;
                let user = args.user.unwrap_or(default_user);
                connection.request_password_reset(&user).await
            }
            CommandKind::ResetPassword => {
                let args: ResetArgs = parse_args(kind, args)?;
                let user = args.user.unwrap_or(default_user);
                connection.reset_password(&user, &args.code, &args.password).await
            }
            _ => {
                return Err(DispatchError::InvalidArguments {
                    command: kind.as_str(),
                    reason: "not an account command".to_string(),
                })
            }
        };

        Ok(result)
    }
}

fn parse_args<T: DeserializeOwned>(kind: CommandKind, args: Value) -> Result<T, DispatchError> {
    // No arguments at all reads as an empty object
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| DispatchError::InvalidArguments {
        command: kind.as_str(),
        reason: e.to_string(),
    })
}

/// Refusals the server explains are replies, not failures
fn account_outcome(kind: CommandKind, result: TransferResult<MessageResponse>) -> Outcome {
    match result {
        Ok(reply) => Outcome::Account(AccountReply {
            content: Value::String(reply.message),
            successful: true,
        }),
        Err(TransferError::Status {
            status,
            message,
            details,
        }) if (400..500).contains(&status) && status != 401 => {
            tracing::info!(command = kind.as_str(), status = status, "Account command refused");
            Outcome::Account(AccountReply {
                content: details.unwrap_or(Value::String(message)),
                successful: false,
            })
        }
        Err(e) => failed(kind, &e),
    }
}

fn failed(kind: CommandKind, error: &TransferError) -> Outcome {
    let failure = Failure::from(error);
    tracing::error!(
        command = kind.as_str(),
        kind = ?failure.kind,
        status = ?failure.status,
        "Command failed: {}",
        failure.message
    );
    Outcome::Failed(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRepository;
    use crate::client::error::FailureKind;
    use crate::config::ClientConfig;
    use crate::test_support::TestApp;
    use serde_json::json;

    fn dispatcher(base: String, dir: &tempfile::TempDir) -> Dispatcher {
        let config = ClientConfig::new(base, "pippo", "Secret123", dir.path());
        Dispatcher::new(TransferEngine::new(&config).unwrap())
    }

    #[test]
    fn test_command_names() {
        assert_eq!("register".parse::<CommandKind>().unwrap(), CommandKind::Register);
        assert_eq!(
            "request_password_reset".parse::<CommandKind>().unwrap(),
            CommandKind::RequestPasswordReset
        );
        assert_eq!("reqrecoverpass".parse::<CommandKind>().unwrap(), CommandKind::RequestPasswordReset);
        assert_eq!("recoverpass".parse::<CommandKind>().unwrap(), CommandKind::ResetPassword);
        assert_eq!("get_server_snapshot".parse::<CommandKind>().unwrap(), CommandKind::GetFullSnapshot);
        assert_eq!("Get-Full-Snapshot".parse::<CommandKind>().unwrap(), CommandKind::GetFullSnapshot);

        let err = "format_disk".parse::<CommandKind>().unwrap_err();
        assert!(matches!(err, DispatchError::UnknownCommand(name) if name == "format_disk"));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher("http://127.0.0.1:9".to_string(), &dir);

        let err = dispatcher.dispatch("explode", json!({})).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownCommand(_)));

        let err = dispatcher.dispatch("move", json!({"src": "a.txt"})).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArguments { command: "move", .. }));

        let err = dispatcher.dispatch("delete", Value::Null).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArguments { command: "delete", .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher("http://127.0.0.1:9".to_string(), &dir);

        let outcome = dispatcher.dispatch("get_server_snapshot", Value::Null).await.unwrap();
        match outcome {
            Outcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Transport),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_account_commands() {
        let app = TestApp::new().await;
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(app.spawn().await, &dir);

        let weak = dispatcher.dispatch("register", json!({"password": "short"})).await.unwrap();
        match weak {
            Outcome::Account(reply) => {
                assert!(!reply.successful);
                assert!(reply.content["improvements"].as_array().unwrap().len() >= 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let ok = dispatcher.dispatch("register", json!({"password": "Secret123"})).await.unwrap();
        assert!(ok.is_success());

        let again = dispatcher.dispatch("register", json!({"password": "Secret123"})).await.unwrap();
        assert!(matches!(again, Outcome::Account(AccountReply { successful: false, .. })));

        let wrong = dispatcher.dispatch("activate", json!({"code": "nope"})).await.unwrap();
        assert!(!wrong.is_success());

        let code = AccountRepository::new(app.state.db())
            .get("pippo")
            .await
            .unwrap()
            .unwrap()
            .activation_code
            .unwrap();
        let activated = dispatcher
            .dispatch("activate", json!({"user": "pippo", "code": code}))
            .await
            .unwrap();
        assert!(activated.is_success());

        let missing = dispatcher
            .dispatch("reqrecoverpass", json!({"user": "nobody"}))
            .await
            .unwrap();
        assert!(!missing.is_success());

        let snapshot = dispatcher.dispatch("get-full-snapshot", json!({})).await.unwrap();
        assert!(matches!(snapshot, Outcome::Snapshot(state) if state.is_empty()));
    }

    #[tokio::test]
    async fn test_file_commands() {
        let app = TestApp::new().await;
        app.create_user("pippo", "Secret123").await;
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(app.spawn().await, &dir);

        std::fs::write(dir.path().join("a.txt"), b"foo").unwrap();

        let created = dispatcher.dispatch("upload", json!({"path": "a.txt"})).await.unwrap();
        assert!(matches!(created, Outcome::Timestamp(_)));

        let exists = dispatcher.dispatch("upload", json!({"path": "a.txt"})).await.unwrap();
        match exists {
            Outcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Forbidden);
                assert_eq!(failure.status, Some(403));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        std::fs::write(dir.path().join("a.txt"), b"bar").unwrap();
        let modified = dispatcher
            .dispatch("modify", json!({"path": "a.txt", "hash": "37b51d194a7513e45b56f6524f2d51f2"}))
            .await
            .unwrap();
        assert!(modified.is_success());

        let copied = dispatcher
            .dispatch("copy", json!({"src": "a.txt", "dst": "b.txt"}))
            .await
            .unwrap();
        assert!(copied.is_success());
        let moved = dispatcher
            .dispatch("move", json!({"src": "b.txt", "dst": "sub/c.txt"}))
            .await
            .unwrap();
        assert!(moved.is_success());
        let deleted = dispatcher.dispatch("delete", json!({"filepath": "a.txt"})).await.unwrap();
        assert!(deleted.is_success());

        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        let downloaded = dispatcher.dispatch("download", json!({"path": "sub/c.txt"})).await.unwrap();
        match downloaded {
            Outcome::Downloaded(path) => assert_eq!(std::fs::read(path).unwrap(), b"bar"),
            other => panic!("unexpected outcome {:?}", other),
        }

        let gone = dispatcher.dispatch("download", json!({"path": "a.txt"})).await.unwrap();
        assert!(matches!(gone, Outcome::Failed(Failure { kind: FailureKind::NotFound, .. })));

        let escape = dispatcher.dispatch("download", json!({"path": "../x"})).await.unwrap();
        assert!(matches!(escape, Outcome::Failed(Failure { kind: FailureKind::Sandbox, .. })));

        let snapshot = dispatcher.dispatch("get_server_snapshot", json!({})).await.unwrap();
        match snapshot {
            Outcome::Snapshot(state) => {
                assert_eq!(state.len(), 1);
                assert_eq!(
                    state.get("sub/c.txt").unwrap().content_hash,
                    "37b51d194a7513e45b56f6524f2d51f2"
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
