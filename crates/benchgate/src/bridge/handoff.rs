//! Connection hand-off between the gate and the workbench process.
//!
//! Accepted network connections are transferred as raw descriptors over a
//! dedicated Unix socket using SCM_RIGHTS, one sentinel byte per
//! descriptor. Each `socket` control frame pairs FIFO with the next
//! descriptor on this channel.
//!
//! The parent binds a listener and exports its path in
//! [`HANDOFF_SOCKET_ENV`]; the workbench child connects at startup.

use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};
use tokio::io::Interest;
use tokio::net::{TcpStream, UnixListener, UnixStream};

/// Environment variable naming the Unix socket path for descriptor
/// hand-off. Set by the parent when spawning the workbench process.
pub const HANDOFF_SOCKET_ENV: &str = "BENCHGATE_HANDOFF_SOCKET";

fn send_fd_raw(channel: RawFd, fd: RawFd) -> io::Result<()> {
    let payload = [0u8];
    let iov = [IoSlice::new(&payload)];
    let fds = [fd];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    sendmsg::<()>(channel, &iov, &cmsg, MsgFlags::empty(), None).map_err(io::Error::from)?;
    Ok(())
}

fn recv_fd_raw(channel: RawFd) -> io::Result<OwnedFd> {
    let mut payload = [0u8];
    let mut iov = [IoSliceMut::new(&mut payload)];
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; 1]);

    let msg = recvmsg::<()>(channel, &mut iov, Some(&mut cmsg_buffer), MsgFlags::empty())
        .map_err(io::Error::from)?;
    if msg.bytes == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "handoff channel closed",
        ));
    }

    for cmsg in msg.cmsgs().map_err(io::Error::from)? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg
            && let Some(&fd) = fds.first()
        {
            // SAFETY: the kernel just installed this descriptor into our
            // process for exactly this message; nothing else owns it.
            return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
        }
    }

    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "handoff message carried no descriptor",
    ))
}

/// Parent-side listener the workbench child connects to once at startup.
pub struct HandoffListener {
    listener: UnixListener,
}

impl HandoffListener {
    pub fn bind(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        tracing::debug!(path = %path.display(), "Bound handoff socket");
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> io::Result<HandoffSender> {
        let (stream, _) = self.listener.accept().await?;
        tracing::debug!("Workbench connected to handoff socket");
        Ok(HandoffSender { stream })
    }
}

/// Parent-side sending end. Transfers ownership of one connection per
/// call; the local copy of the descriptor closes on return.
pub struct HandoffSender {
    stream: UnixStream,
}

impl HandoffSender {
    pub async fn send_connection(&self, conn: impl AsFd) -> io::Result<()> {
        let fd = conn.as_fd().as_raw_fd();
        loop {
            self.stream.writable().await?;
            match self
                .stream
                .try_io(Interest::WRITABLE, || send_fd_raw(self.stream.as_raw_fd(), fd))
            {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Workbench-side receiving end.
pub struct HandoffReceiver {
    stream: UnixStream,
}

impl HandoffReceiver {
    pub async fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Ok(Self { stream })
    }

    /// Connect using the path from [`HANDOFF_SOCKET_ENV`]. Absent
    /// variable means the parent does not hand connections to us.
    pub async fn connect_from_env() -> io::Result<Option<Self>> {
        match std::env::var(HANDOFF_SOCKET_ENV) {
            Ok(path) => Ok(Some(Self::connect(path).await?)),
            Err(_) => Ok(None),
        }
    }

    /// Receive the next transferred connection. Resolves once the parent
    /// has passed a descriptor; ownership lands here.
    pub async fn recv_connection(&self) -> io::Result<TcpStream> {
        let fd = loop {
            self.stream.readable().await?;
            match self
                .stream
                .try_io(Interest::READABLE, || recv_fd_raw(self.stream.as_raw_fd()))
            {
                Ok(fd) => break fd,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        };

        let std_stream = std::net::TcpStream::from(fd);
        std_stream.set_nonblocking(true)?;
        TcpStream::from_std(std_stream)
    }
}

/// Connected sender/receiver pair over an anonymous socket, for tests
/// and single-process embeddings.
pub fn pair() -> io::Result<(HandoffSender, HandoffReceiver)> {
    let (a, b) = UnixStream::pair()?;
    Ok((HandoffSender { stream: a }, HandoffReceiver { stream: b }))
}
