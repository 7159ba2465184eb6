//! A token source that runs a local credential helper

use std::{ffi::OsString, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use super::LocalTokenSource;
use crate::{IdentityHintRef, LocalToken, LocalTokenError};

/// A local token source that runs a credential helper program
///
/// The helper is run with a fixed set of arguments, followed by the identity hint when
/// one is given. The token is read from standard output with trailing whitespace
/// removed.
#[derive(Clone, Debug)]
pub struct CommandTokenSource {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandTokenSource {
    /// Constructs a source that runs `program` with `args`
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Constructs a source that asks the Google Cloud SDK for an access token
    ///
    /// Runs `gcloud auth print-access-token [identity-hint]`.
    pub fn gcloud() -> Self {
        Self::new("gcloud", ["auth", "print-access-token"])
    }

    fn command(&self, identity_hint: Option<&IdentityHintRef>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(hint) = identity_hint {
            cmd.arg(hint.as_str());
        }

        cmd
    }
}

#[async_trait]
impl LocalTokenSource for CommandTokenSource {
    #[tracing::instrument(
        err,
        skip(self, identity_hint),
        fields(
            program = %self.program.to_string_lossy(),
            identity_hint = identity_hint.map(|h| h.as_str()),
        ),
    )]
    async fn fetch_local_token(
        &self,
        identity_hint: Option<&IdentityHintRef>,
    ) -> Result<LocalToken, LocalTokenError> {
        tracing::trace!("running credential helper");

        let output = self
            .command(identity_hint)
            .output()
            .await
            .map_err(|source| LocalTokenError::Spawn {
                program: self.program.to_string_lossy().into_owned(),
                source,
            })?;

        if !output.status.success() {
            return Err(LocalTokenError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let mut token = String::from_utf8(output.stdout)?;
        token.truncate(token.trim_end().len());

        if token.is_empty() {
            return Err(LocalTokenError::Empty);
        }

        tracing::debug!("obtained local identity token");

        Ok(LocalToken::new(token))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_token_from_standard_output() {
        let source = CommandTokenSource::new("echo", ["local123"]);
        let token = source.fetch_local_token(None).await.unwrap();
        assert_eq!(token.as_str(), "local123");
    }

    #[tokio::test]
    async fn appends_identity_hint_as_final_argument() {
        let source = CommandTokenSource::new("echo", ["token-for"]);
        let hint = IdentityHintRef::from_str("someone@example.com");
        let token = source.fetch_local_token(Some(hint)).await.unwrap();
        assert_eq!(token.as_str(), "token-for someone@example.com");
    }

    #[tokio::test]
    async fn trims_only_trailing_whitespace() {
        let source = CommandTokenSource::new("printf", ["  local123 \n\n"]);
        let token = source.fetch_local_token(None).await.unwrap();
        assert_eq!(token.as_str(), "  local123");
    }

    #[tokio::test]
    async fn empty_output_is_an_error() {
        let source = CommandTokenSource::new("printf", ["\n"]);
        let result = source.fetch_local_token(None).await;
        assert!(matches!(result, Err(LocalTokenError::Empty)));
    }

    #[tokio::test]
    async fn unsuccessful_exit_is_an_error() {
        let source = CommandTokenSource::new("sh", ["-c", "echo 'not signed in' >&2; exit 3"]);
        let result = source.fetch_local_token(None).await;
        match result {
            Err(LocalTokenError::Failed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "not signed in");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let source = CommandTokenSource::new("anvil-tokens-no-such-helper", Vec::<String>::new());
        let result = source.fetch_local_token(None).await;
        assert!(matches!(result, Err(LocalTokenError::Spawn { .. })));
    }
}
