//! FTP session adapter backed by `suppaftp`.
//!
//! `suppaftp`'s synchronous client is driven from tokio's blocking pool. The
//! control stream moves into the blocking task for each round trip and back
//! into the session afterwards; a session whose task was abandoned (timeout or
//! panic) reports itself as closed.

use std::fs::File;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};
use switch_sync_ports::{
    BoxFuture, ChangeDirOutcome, RemoteConnectorPort, RemotePath, RemoteSession,
};
use switch_sync_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
    timeout_with_context,
};

/// Connection settings for [`FtpConnector`].
#[derive(Debug, Clone)]
pub struct FtpSettings {
    /// Server host name or address.
    pub host: Box<str>,
    /// Control port.
    pub port: u16,
    /// Login user.
    pub user: Box<str>,
    /// Login password.
    pub password: SecretString,
    /// Bound on resolve + connect + login.
    pub connect_timeout: Duration,
}

/// Opens passive-mode FTP sessions.
#[derive(Debug, Clone)]
pub struct FtpConnector {
    settings: FtpSettings,
    endpoint: String,
}

impl FtpConnector {
    /// Build a connector for the given server.
    #[must_use]
    pub fn new(settings: FtpSettings) -> Self {
        let endpoint = format!("{}:{}", settings.host, settings.port);
        Self { settings, endpoint }
    }
}

impl RemoteConnectorPort for FtpConnector {
    fn connect(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Box<dyn RemoteSession>>> {
        let ctx = ctx.clone();
        let settings = self.settings.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let timeout = settings.connect_timeout;
            let task = tokio::task::spawn_blocking(move || open_stream(&settings));
            let opened = async move { task.await.map_err(|error| task_failed("connect", &error))? };
            let stream = timeout_with_context(&ctx, timeout, "ftp.connect", opened)
                .await
                .map_err(|error| {
                    let error = if error.has_code("core", "timeout") {
                        ErrorEnvelope::expected_with_class(
                            ErrorCode::new("remote", "connect_timeout"),
                            format!("timed out connecting to {endpoint}"),
                            ErrorClass::Retriable,
                        )
                        .with_metadata("timeoutMs", timeout.as_millis().to_string())
                    } else {
                        error
                    };
                    error.with_metadata("endpoint", endpoint.clone())
                })?;
            let session: Box<dyn RemoteSession> = Box::new(FtpSession::new(stream));
            Ok(session)
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn open_stream(settings: &FtpSettings) -> Result<FtpStream> {
    let address = resolve(&settings.host, settings.port)?;
    let mut stream = FtpStream::connect_timeout(address, settings.connect_timeout)
        .map_err(|error| remote_error("connect_failed", "connect", &error, ErrorClass::Retriable))?;
    stream
        .login(settings.user.as_ref(), settings.password.expose())
        .map_err(|error| {
            remote_error("login_failed", "login", &error, ErrorClass::NonRetriable)
        })?;
    stream.set_mode(Mode::Passive);
    stream
        .transfer_type(FileType::Binary)
        .map_err(|error| remote_error("connect_failed", "type", &error, ErrorClass::Retriable))?;
    Ok(stream)
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let unresolved = || {
        ErrorEnvelope::expected_with_class(
            ErrorCode::new("remote", "connect_failed"),
            format!("could not resolve {host}:{port}"),
            ErrorClass::Retriable,
        )
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|_| unresolved())?
        .next()
        .ok_or_else(unresolved)
}

/// One logged-in FTP control connection.
pub struct FtpSession {
    stream: Option<FtpStream>,
}

impl FtpSession {
    const fn new(stream: FtpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    async fn with_stream<T, F>(&mut self, operation: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
    {
        let Some(mut stream) = self.stream.take() else {
            return Err(ErrorEnvelope::expected_with_class(
                ErrorCode::new("remote", "session_closed"),
                "ftp session is closed",
                ErrorClass::Retriable,
            )
            .with_metadata("operation", operation));
        };

        let joined = tokio::task::spawn_blocking(move || {
            let result = work(&mut stream);
            (stream, result)
        })
        .await;

        match joined {
            Ok((stream, result)) => {
                self.stream = Some(stream);
                result
            },
            Err(error) => Err(task_failed(operation, &error)),
        }
    }
}

impl RemoteSession for FtpSession {
    fn change_dir(
        &mut self,
        _ctx: &RequestContext,
        path: RemotePath,
    ) -> BoxFuture<'_, Result<ChangeDirOutcome>> {
        Box::pin(async move {
            self.with_stream("cwd", move |stream| match stream.cwd(path.as_str()) {
                Ok(()) => Ok(ChangeDirOutcome::Entered),
                Err(error) if is_permanent_rejection(&error) => Ok(ChangeDirOutcome::NotADirectory),
                Err(error) => Err(remote_error(
                    "change_dir_failed",
                    "cwd",
                    &error,
                    ErrorClass::Retriable,
                )
                .with_metadata("remotePath", path.as_str())),
            })
            .await
        })
    }

    fn list_names(&mut self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            self.with_stream("nlst", |stream| {
                stream.nlst(None).map_err(|error| {
                    remote_error("list_failed", "nlst", &error, ErrorClass::Retriable)
                })
            })
            .await
        })
    }

    fn modify_time(
        &mut self,
        _ctx: &RequestContext,
        path: RemotePath,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.with_stream("mdtm", move |stream| {
                let response = stream
                    .custom_command(format!("MDTM {}", path.as_str()), &[suppaftp::Status::File])
                    .map_err(|error| {
                        remote_error("mdtm_failed", "mdtm", &error, ErrorClass::NonRetriable)
                            .with_metadata("remotePath", path.as_str())
                    })?;
                Ok(String::from_utf8_lossy(&response.body).trim().to_owned())
            })
            .await
        })
    }

    fn retrieve(
        &mut self,
        _ctx: &RequestContext,
        path: RemotePath,
        sink: File,
    ) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            self.with_stream("retr", move |stream| {
                let retrieve_error = |error: &FtpError| {
                    remote_error("retrieve_failed", "retr", error, ErrorClass::Retriable)
                        .with_metadata("remotePath", path.as_str())
                };
                let mut data = stream
                    .retr_as_stream(path.as_str())
                    .map_err(|error| retrieve_error(&error))?;
                let mut sink = sink;
                let copied = copy_all(&mut data, &mut sink);
                stream
                    .finalize_retr_stream(data)
                    .map_err(|error| retrieve_error(&error))?;
                let bytes = copied.map_err(|error| {
                    ErrorEnvelope::from(error)
                        .with_code(ErrorCode::new("remote", "retrieve_failed"))
                        .with_metadata("remotePath", path.as_str())
                })?;
                sink.sync_all().map_err(ErrorEnvelope::from)?;
                Ok(bytes)
            })
            .await
        })
    }

    fn close(&mut self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.stream.is_none() {
                return Ok(());
            }
            let result = self
                .with_stream("quit", |stream| {
                    stream.quit().map_err(|error| {
                        remote_error("quit_failed", "quit", &error, ErrorClass::NonRetriable)
                    })
                })
                .await;
            // The connection is gone either way once QUIT was attempted.
            self.stream = None;
            result
        })
    }
}

fn copy_all(reader: &mut impl Read, writer: &mut File) -> std::io::Result<u64> {
    let bytes = std::io::copy(reader, writer)?;
    writer.flush()?;
    Ok(bytes)
}

/// 5xx replies are permanent rejections; `CWD` uses them for "not a directory".
fn is_permanent_rejection(error: &FtpError) -> bool {
    match error {
        FtpError::UnexpectedResponse(response) => (500..600).contains(&response.status.code()),
        _ => false,
    }
}

fn remote_error(
    code: &'static str,
    operation: &'static str,
    error: &FtpError,
    class: ErrorClass,
) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_class(
        ErrorCode::new("remote", code),
        format!("ftp {operation} failed: {error}"),
        class,
    )
    .with_metadata("operation", operation)
}

fn task_failed(operation: &'static str, error: &tokio::task::JoinError) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("remote", "task_failed"),
        format!("ftp {operation} task failed: {error}"),
        ErrorClass::NonRetriable,
    )
    .with_metadata("operation", operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn connector_reports_endpoint() {
        let connector = FtpConnector::new(FtpSettings {
            host: "192.168.0.20".into(),
            port: 5000,
            user: "root".into(),
            password: SecretString::default(),
            connect_timeout: Duration::from_secs(1),
        });
        assert_eq!(connector.endpoint(), "192.168.0.20:5000");
    }

    #[tokio::test]
    async fn unreachable_server_fails_without_panicking() -> Result<(), Box<dyn Error>> {
        let connector = FtpConnector::new(FtpSettings {
            host: "127.0.0.1".into(),
            port: 1,
            user: "root".into(),
            password: SecretString::default(),
            connect_timeout: Duration::from_millis(500),
        });
        let ctx = RequestContext::new_run();
        let error = connector
            .connect(&ctx)
            .await
            .err()
            .ok_or("expected connect failure")?;
        assert_eq!(error.code.namespace(), "remote");
        assert_eq!(
            error.metadata.get("endpoint").map(String::as_str),
            Some("127.0.0.1:1")
        );
        Ok(())
    }

    #[tokio::test]
    async fn closed_session_reports_session_closed() -> Result<(), Box<dyn Error>> {
        let mut session = FtpSession { stream: None };
        let ctx = RequestContext::new_run();
        session.close(&ctx).await?;
        let error = session
            .list_names(&ctx)
            .await
            .err()
            .ok_or("expected closed session error")?;
        assert!(error.has_code("remote", "session_closed"));
        Ok(())
    }
}
