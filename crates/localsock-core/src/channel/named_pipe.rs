//! Windows named pipe channel.

use std::io;

use crate::BoxFuture;

use super::{ChannelAddress, LocalChannel, LocalStream};

/// Win32 `ERROR_PIPE_BUSY`: every instance of the pipe is in use.
const ERROR_PIPE_BUSY: i32 = 231;

/// Opens a named pipe client to a pipe name such as `\\.\pipe\docker_engine`.
///
/// A busy pipe (`ERROR_PIPE_BUSY`) is reported as the raw OS error; the
/// channel itself does not wait for an instance to free up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedPipeChannel;

impl LocalChannel for NamedPipeChannel {
    fn name(&self) -> &str {
        "named-pipe"
    }

    fn available(&self) -> bool {
        cfg!(windows)
    }

    fn connect<'a>(
        &'a self,
        address: &'a ChannelAddress,
    ) -> BoxFuture<'a, io::Result<LocalStream>> {
        Box::pin(open_named_pipe(address))
    }

    fn is_busy(&self, err: &io::Error) -> bool {
        err.raw_os_error() == Some(ERROR_PIPE_BUSY)
    }
}

#[cfg(windows)]
async fn open_named_pipe(address: &ChannelAddress) -> io::Result<LocalStream> {
    use tokio::net::windows::named_pipe::ClientOptions;

    tracing::debug!(channel = "named-pipe", address = %address, "Connecting");
    let client = ClientOptions::new().open(address.as_str())?;
    Ok(LocalStream::NamedPipe(client))
}

#[cfg(not(windows))]
async fn open_named_pipe(_address: &ChannelAddress) -> io::Result<LocalStream> {
    Err(super::unsupported("named-pipe"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_busy_is_retryable() {
        assert!(NamedPipeChannel.is_busy(&io::Error::from_raw_os_error(ERROR_PIPE_BUSY)));
        assert!(!NamedPipeChannel.is_busy(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(!NamedPipeChannel.is_busy(&io::Error::from(io::ErrorKind::WouldBlock)));
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_named_pipe_unsupported_off_windows() {
        let address = ChannelAddress::new(r"\\.\pipe\docker_engine");
        let err = NamedPipeChannel.connect(&address).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(!NamedPipeChannel.available());
    }

    #[cfg(windows)]
    #[tokio::test]
    async fn test_missing_pipe_is_not_found() {
        let address = ChannelAddress::new(r"\\.\pipe\localsock-test-absent");
        let err = NamedPipeChannel.connect(&address).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(windows)]
    #[tokio::test]
    async fn test_connects_to_pipe_server() {
        use tokio::net::windows::named_pipe::ServerOptions;

        let name = format!(r"\\.\pipe\localsock-test-{}", std::process::id());
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&name)
            .unwrap();

        let stream = NamedPipeChannel
            .connect(&ChannelAddress::new(name))
            .await
            .unwrap();
        assert_eq!(stream.platform(), crate::channel::Platform::Windows);
        server.connect().await.unwrap();
    }
}
