//! Server side of the protocol: one session per accepted connection.
//!
//! A session authenticates, then processes exactly one command at a time
//! until the peer exits or the connection fails. Path problems are reply
//! messages and leave the session in the Ready state; framing problems and
//! state-machine violations terminate the session (and only this session).

use std::fs::File;
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::CredentialStore;
use crate::error::{Error, Result};
use crate::frame::{read_block, FrameCodec};
use crate::listing;
use crate::protocol::{ClientMessage, ProtocolConfig, ServerMessage};

pub struct Session {
    codec: FrameCodec<TcpStream>,
    config: ProtocolConfig,
    users: Arc<CredentialStore>,
    cwd: PathBuf,
    user: Option<String>,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        users: Arc<CredentialStore>,
        home: PathBuf,
        config: ProtocolConfig,
    ) -> Self {
        let codec = FrameCodec::new(stream, &config);
        Self {
            codec,
            config,
            users,
            cwd: home,
            user: None,
        }
    }

    /// Drives the session to completion. Never panics on protocol errors;
    /// whatever happens here takes down only this session.
    pub fn run(mut self) {
        match self.authenticate().and_then(|()| self.command_loop()) {
            Err(Error::Closed) => tracing::info!("session closed by peer"),
            Err(Error::Disconnected) => tracing::info!("peer disconnected"),
            Err(err) => tracing::warn!(%err, "session terminated"),
            Ok(()) => {}
        }
    }

    /// Greeting, identity, then an unbounded secret-retry loop against the
    /// credential table.
    fn authenticate(&mut self) -> Result<()> {
        let (msg, _) = self.recv()?;
        if msg != ClientMessage::Hello {
            return Err(Error::Unexpected {
                expected: "hello",
                got: msg.code(),
            });
        }
        self.send(ServerMessage::AuthProceed, b"hello+back")?;

        let (msg, ident) = self.recv()?;
        if msg != ClientMessage::AuthId {
            return Err(Error::Unexpected {
                expected: "identity",
                got: msg.code(),
            });
        }
        let ident = String::from_utf8_lossy(&ident).into_owned();
        self.send(ServerMessage::AuthProceed, b"givemepw")?;

        loop {
            let (msg, secret) = self.recv()?;
            if msg != ClientMessage::AuthSecret {
                return Err(Error::Unexpected {
                    expected: "secret",
                    got: msg.code(),
                });
            }
            // looked up on every attempt; the table is never cached
            if self.users.verify(&ident, &String::from_utf8_lossy(&secret)) {
                break;
            }
            self.send(ServerMessage::AuthFailure, b"passwderror")?;
        }
        self.send(ServerMessage::AuthSuccess, b"auth ok")?;
        tracing::info!(user = %ident, "authenticated");
        self.user = Some(ident);
        Ok(())
    }

    /// One command to completion before the next is accepted. Idle waits
    /// carry no deadline (the peer's user is at a prompt); everything
    /// inside a command runs under the configured read timeout.
    fn command_loop(&mut self) -> Result<()> {
        loop {
            self.codec.set_deadline(None)?;
            let (msg, args) = self.recv()?;
            self.codec.set_deadline(Some(self.config.read_timeout))?;
            tracing::debug!(user = self.user.as_deref(), command = ?msg, "dispatch");
            match msg {
                ClientMessage::Alive => {}
                ClientMessage::Cd => self.cmd_cd(&args)?,
                ClientMessage::Pwd => self.cmd_pwd()?,
                ClientMessage::Ls => self.cmd_ls(&args)?,
                ClientMessage::Get => self.cmd_get(&args)?,
                ClientMessage::Put => self.cmd_put(&args)?,
                other => {
                    return Err(Error::Unexpected {
                        expected: "command",
                        got: other.code(),
                    })
                }
            }
        }
    }

    /// The extra proceed/ack round trip lets the client prepare local
    /// state before the new directory is committed; the ordering is part
    /// of the protocol.
    fn cmd_cd(&mut self, args: &[u8]) -> Result<()> {
        let target = String::from_utf8_lossy(args).into_owned();
        let dir = match self.absolutify(&target).canonicalize() {
            Ok(dir) if dir.is_dir() => dir,
            _ => {
                self.send(ServerMessage::CdPathError, b"")?;
                return Ok(());
            }
        };
        self.send(ServerMessage::CdProceed, b"")?;
        let (msg, _) = self.recv()?;
        if msg != ClientMessage::CdProceed {
            return Err(Error::Unexpected {
                expected: "cd ack",
                got: msg.code(),
            });
        }
        self.cwd = dir;
        self.send(ServerMessage::CdSuccess, b"")?;
        Ok(())
    }

    fn cmd_pwd(&mut self) -> Result<()> {
        let cwd = self.cwd.display().to_string();
        self.send(ServerMessage::PwdSuccess, cwd.as_bytes())
    }

    fn cmd_ls(&mut self, args: &[u8]) -> Result<()> {
        let target = String::from_utf8_lossy(args).into_owned();
        let dir = if target.is_empty() {
            self.cwd.clone()
        } else {
            self.absolutify(&target)
        };
        if !target.is_empty() && !dir.is_dir() {
            self.send(ServerMessage::LsPathError, b"")?;
            return Ok(());
        }
        self.send(ServerMessage::LsProceed, b"")?;
        let (msg, _) = self.recv()?;
        if msg != ClientMessage::LsProceed {
            return Err(Error::Unexpected {
                expected: "ls ack",
                got: msg.code(),
            });
        }

        let text = match listing::read_entries(&dir) {
            Ok(names) => listing::render(&names),
            Err(err) => {
                tracing::debug!(%err, dir = %dir.display(), "listing failed");
                self.send(ServerMessage::LsFailure, b"")?;
                return Ok(());
            }
        };
        self.stream_listing(text.as_bytes())?;
        self.send(ServerMessage::LsSuccess, b"")
    }

    /// Pre-buffered text, one acked block at a time; the empty terminator
    /// is not acknowledged.
    fn stream_listing(&mut self, bytes: &[u8]) -> Result<()> {
        for chunk in bytes.chunks(self.config.block_size) {
            self.send(ServerMessage::LsData, chunk)?;
            let (msg, _) = self.recv()?;
            if msg != ClientMessage::LsProceed {
                return Err(Error::Unexpected {
                    expected: "ls block ack",
                    got: msg.code(),
                });
            }
        }
        self.send(ServerMessage::LsData, b"")
    }

    fn cmd_get(&mut self, args: &[u8]) -> Result<()> {
        let target = String::from_utf8_lossy(args).into_owned();
        let abs = self.absolutify(&target);
        let abs_str = abs.display().to_string();
        if !abs.is_file() {
            // the attempted path goes back for display
            self.send(ServerMessage::GetPathError, abs_str.as_bytes())?;
            return Ok(());
        }
        self.send(ServerMessage::GetProceed, abs_str.as_bytes())?;
        let (msg, _) = self.recv()?;
        if msg != ClientMessage::GetProceed {
            self.send(ServerMessage::GetFailure, b"")?;
            return Ok(());
        }

        let mut file = match File::open(&abs) {
            Ok(file) => file,
            Err(err) => {
                tracing::debug!(%err, path = %abs_str, "open for download failed");
                self.send(ServerMessage::GetFailure, b"")?;
                return Ok(());
            }
        };
        // eager send, then wait for the block ack or a stop; the empty
        // end-of-file block needs no acknowledgment
        let mut buf = vec![0u8; self.config.block_size];
        loop {
            let n = match read_block(&mut file, &mut buf) {
                Ok(n) => n,
                Err(err) => {
                    tracing::debug!(%err, path = %abs_str, "read for download failed");
                    self.send(ServerMessage::GetFailure, b"")?;
                    return Ok(());
                }
            };
            self.send(ServerMessage::GetData, &buf[..n])?;
            if n == 0 {
                return Ok(());
            }
            let (msg, _) = self.recv()?;
            match msg {
                ClientMessage::GetProceed => {}
                ClientMessage::GetStop => {
                    // the client drains this reply to resynchronize
                    self.send(ServerMessage::GetFailure, b"")?;
                    return Ok(());
                }
                other => {
                    return Err(Error::Unexpected {
                        expected: "get block ack",
                        got: other.code(),
                    })
                }
            }
        }
    }

    fn cmd_put(&mut self, args: &[u8]) -> Result<()> {
        let target = String::from_utf8_lossy(args).into_owned();
        let dir = if target.is_empty() {
            self.cwd.clone()
        } else {
            self.absolutify(&target)
        };
        if !target.is_empty() && !dir.is_dir() {
            self.send(ServerMessage::PutPathError, b"")?;
            return Ok(());
        }
        let dir_str = dir.display().to_string();
        self.send(ServerMessage::PutProceed, dir_str.as_bytes())?;
        let (msg, name) = self.recv()?;
        if msg != ClientMessage::PutProceed {
            return Err(Error::Unexpected {
                expected: "put filename",
                got: msg.code(),
            });
        }
        let file_name = String::from_utf8_lossy(&name).into_owned();
        if file_name.is_empty() || file_name.contains('/') || file_name == ".." {
            tracing::warn!(name = %file_name, "rejected upload filename");
            self.send(ServerMessage::PutFailure, b"")?;
            return Ok(());
        }

        // hidden staging file in the destination directory; renamed into
        // place only after the empty terminator, deleted on every other
        // path out of this loop
        let mut tmp = match tempfile::Builder::new().prefix(".").tempfile_in(&dir) {
            Ok(tmp) => tmp,
            Err(err) => {
                tracing::debug!(%err, dir = %dir_str, "upload staging failed");
                self.send(ServerMessage::PutFailure, b"")?;
                return Ok(());
            }
        };
        loop {
            self.send(ServerMessage::PutProceed, b"")?;
            let (msg, block) = self.recv()?;
            match msg {
                ClientMessage::PutData if block.is_empty() => {
                    if let Err(err) = tmp.persist(dir.join(&file_name)) {
                        tracing::warn!(err = %err.error, name = %file_name, "upload rename failed");
                    }
                    return Ok(());
                }
                ClientMessage::PutData => {
                    if let Err(err) = tmp.write_all(&block) {
                        tracing::debug!(%err, "upload write failed");
                        self.send(ServerMessage::PutFailure, b"")?;
                        return Ok(());
                    }
                }
                ClientMessage::PutStop => {
                    // exactly one stop is honored; the failure reply is
                    // what the client's drain consumes
                    self.send(ServerMessage::PutFailure, b"")?;
                    return Ok(());
                }
                other => {
                    return Err(Error::Unexpected {
                        expected: "put block",
                        got: other.code(),
                    })
                }
            }
        }
    }

    fn absolutify(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }

    /// An exit command short-circuits the state machine from any receive
    /// point: acknowledge best-effort and unwind.
    fn recv(&mut self) -> Result<(ClientMessage, Vec<u8>)> {
        let (code, payload) = self.codec.recv_raw()?;
        let msg = ClientMessage::from_code(code)?;
        if msg == ClientMessage::Exit {
            let _ = self.send(ServerMessage::ExitSuccess, b"");
            return Err(Error::Closed);
        }
        Ok((msg, payload))
    }

    fn send(&mut self, msg: ServerMessage, payload: &[u8]) -> Result<()> {
        self.codec.send(msg.code(), payload)
    }
}
