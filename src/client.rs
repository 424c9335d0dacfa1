//! Client side of the protocol: one session per process.
//!
//! Every command is a synchronous round trip; nothing is pipelined. Path
//! and authentication refusals come back as outcome enums so the session
//! stays usable after any of them. Transfers stage into hidden temp files
//! and persist only on a complete stream; a cancellation sends exactly one
//! stop signal and drains exactly one reply so framing never desyncs.

use std::fs::File;
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::frame::{read_block, FrameCodec};
use crate::protocol::{ClientMessage, ProtocolConfig, ServerMessage};

/// Shared flag flipped by the Ctrl-C handler; transfer loops check it
/// between chunks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CdOutcome {
    Changed,
    NoSuchDirectory,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LsOutcome {
    Listing(String),
    NoSuchDirectory,
    Failed,
}

#[derive(Debug)]
pub enum GetOutcome {
    /// File persisted at `path` after a complete stream.
    Fetched { path: PathBuf, bytes: u64 },
    /// Server-side path error; the payload names the attempted path.
    NoSuchFile(String),
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub enum PutOutcome {
    /// Upload accepted in full; `remote_dir` is where the server put it.
    Stored { remote_dir: String, bytes: u64 },
    NoSuchDirectory,
    Failed,
    Cancelled,
}

pub struct ClientSession {
    codec: FrameCodec<TcpStream>,
    config: ProtocolConfig,
    cancel: CancelToken,
}

impl ClientSession {
    /// Connects and performs the greeting handshake (hello out, any
    /// acknowledgment back). Failure here is fatal to startup.
    pub fn connect(
        host: &str,
        port: u16,
        config: ProtocolConfig,
        cancel: CancelToken,
    ) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        let _ = stream.set_nodelay(true);
        let codec = FrameCodec::new(stream, &config);
        let mut session = Self {
            codec,
            config,
            cancel,
        };
        session.send(ClientMessage::Hello, b"hi")?;
        session.with_deadline(|s| s.recv().map(|_| ()))?;
        Ok(session)
    }

    /// Sends the identity once; the secret may then be retried
    /// indefinitely via [`Self::try_secret`].
    pub fn send_identity(&mut self, identity: &str) -> Result<()> {
        self.send(ClientMessage::AuthId, identity.as_bytes())?;
        self.with_deadline(|s| s.recv().map(|_| ()))
    }

    pub fn try_secret(&mut self, secret: &str) -> Result<bool> {
        self.send(ClientMessage::AuthSecret, secret.as_bytes())?;
        self.with_deadline(|s| {
            let (msg, _) = s.recv()?;
            match msg {
                ServerMessage::AuthSuccess => Ok(true),
                ServerMessage::AuthFailure => Ok(false),
                other => Err(Error::Unexpected {
                    expected: "auth outcome",
                    got: other.code(),
                }),
            }
        })
    }

    pub fn cd(&mut self, path: &str) -> Result<CdOutcome> {
        self.send(ClientMessage::Cd, path.as_bytes())?;
        self.with_deadline(|s| {
            let (msg, _) = s.recv()?;
            match msg {
                ServerMessage::CdPathError => Ok(CdOutcome::NoSuchDirectory),
                ServerMessage::CdProceed => {
                    // nothing to prepare locally, but the ack leg is part
                    // of the protocol and must come before the commit
                    s.send(ClientMessage::CdProceed, b"")?;
                    let (msg, _) = s.recv()?;
                    if msg == ServerMessage::CdSuccess {
                        Ok(CdOutcome::Changed)
                    } else {
                        Err(Error::Unexpected {
                            expected: "cd success",
                            got: msg.code(),
                        })
                    }
                }
                other => Err(Error::Unexpected {
                    expected: "cd outcome",
                    got: other.code(),
                }),
            }
        })
    }

    pub fn pwd(&mut self) -> Result<String> {
        self.send(ClientMessage::Pwd, b"")?;
        self.with_deadline(|s| {
            let (msg, payload) = s.recv()?;
            if msg == ServerMessage::PwdSuccess {
                Ok(String::from_utf8_lossy(&payload).into_owned())
            } else {
                Err(Error::Unexpected {
                    expected: "pwd reply",
                    got: msg.code(),
                })
            }
        })
    }

    pub fn ls(&mut self, path: Option<&str>) -> Result<LsOutcome> {
        self.send(ClientMessage::Ls, path.unwrap_or("").as_bytes())?;
        self.with_deadline(|s| {
            let (msg, _) = s.recv()?;
            match msg {
                ServerMessage::LsPathError => return Ok(LsOutcome::NoSuchDirectory),
                ServerMessage::LsProceed => {}
                other => {
                    return Err(Error::Unexpected {
                        expected: "ls outcome",
                        got: other.code(),
                    })
                }
            }
            s.send(ClientMessage::LsProceed, b"")?;
            let mut text = Vec::new();
            loop {
                let (msg, block) = s.recv()?;
                match msg {
                    ServerMessage::LsFailure => return Ok(LsOutcome::Failed),
                    ServerMessage::LsData if block.is_empty() => break,
                    ServerMessage::LsData => {
                        text.extend_from_slice(&block);
                        s.send(ClientMessage::LsProceed, b"")?;
                    }
                    other => {
                        return Err(Error::Unexpected {
                            expected: "ls block",
                            got: other.code(),
                        })
                    }
                }
            }
            // status follows the unacknowledged terminator
            let (msg, _) = s.recv()?;
            match msg {
                ServerMessage::LsSuccess => {
                    Ok(LsOutcome::Listing(String::from_utf8_lossy(&text).into_owned()))
                }
                ServerMessage::LsFailure => Ok(LsOutcome::Failed),
                other => Err(Error::Unexpected {
                    expected: "ls status",
                    got: other.code(),
                }),
            }
        })
    }

    /// Downloads `remote` into `dest_dir` under its base name. `progress`
    /// is called with the cumulative byte count after each block.
    pub fn get(
        &mut self,
        remote: &str,
        dest_dir: &Path,
        mut progress: impl FnMut(u64),
    ) -> Result<GetOutcome> {
        self.send(ClientMessage::Get, remote.as_bytes())?;
        self.with_deadline(|s| {
            let (msg, payload) = s.recv()?;
            let remote_abs = String::from_utf8_lossy(&payload).into_owned();
            match msg {
                ServerMessage::GetPathError => return Ok(GetOutcome::NoSuchFile(remote_abs)),
                ServerMessage::GetProceed => {}
                other => {
                    return Err(Error::Unexpected {
                        expected: "get outcome",
                        got: other.code(),
                    })
                }
            }

            let mut tmp = match tempfile::Builder::new().prefix(".").tempfile_in(dest_dir) {
                Ok(tmp) => tmp,
                Err(err) => {
                    // can't stage locally: refuse the transfer and drain
                    // the server's failure reply to stay in sync
                    s.send(ClientMessage::GetStop, b"")?;
                    s.recv()?;
                    return Err(err.into());
                }
            };
            s.send(ClientMessage::GetProceed, b"")?;

            let mut bytes = 0u64;
            loop {
                let (msg, block) = s.recv()?;
                match msg {
                    ServerMessage::GetFailure => return Ok(GetOutcome::Failed),
                    ServerMessage::GetData if block.is_empty() => break,
                    ServerMessage::GetData => {
                        if let Err(err) = tmp.write_all(&block) {
                            s.send(ClientMessage::GetStop, b"")?;
                            s.recv()?;
                            return Err(err.into());
                        }
                        bytes += block.len() as u64;
                        progress(bytes);
                        if s.cancel.is_cancelled() {
                            s.send(ClientMessage::GetStop, b"")?;
                            s.recv()?;
                            return Ok(GetOutcome::Cancelled);
                        }
                        s.send(ClientMessage::GetProceed, b"")?;
                    }
                    other => {
                        return Err(Error::Unexpected {
                            expected: "get block",
                            got: other.code(),
                        })
                    }
                }
            }

            let name = remote.rsplit('/').next().unwrap_or(remote);
            let path = dest_dir.join(name);
            tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
            Ok(GetOutcome::Fetched { path, bytes })
        })
    }

    /// Uploads `local` into the remote directory (the session's remote
    /// working directory when `None`).
    pub fn put(
        &mut self,
        local: &Path,
        remote_dir: Option<&str>,
        mut progress: impl FnMut(u64),
    ) -> Result<PutOutcome> {
        // opened before any wire traffic so a local failure is harmless
        let mut file = File::open(local)?;
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.send(ClientMessage::Put, remote_dir.unwrap_or("").as_bytes())?;
        self.with_deadline(|s| {
            let (msg, payload) = s.recv()?;
            match msg {
                ServerMessage::PutPathError => return Ok(PutOutcome::NoSuchDirectory),
                ServerMessage::PutProceed => {}
                other => {
                    return Err(Error::Unexpected {
                        expected: "put outcome",
                        got: other.code(),
                    })
                }
            }
            let remote_dir = String::from_utf8_lossy(&payload).into_owned();
            s.send(ClientMessage::PutProceed, name.as_bytes())?;

            let mut buf = vec![0u8; s.config.block_size];
            let mut bytes = 0u64;
            loop {
                // the server requests every block explicitly
                let (msg, _) = s.recv()?;
                match msg {
                    ServerMessage::PutProceed => {}
                    ServerMessage::PutFailure => return Ok(PutOutcome::Failed),
                    other => {
                        return Err(Error::Unexpected {
                            expected: "put block request",
                            got: other.code(),
                        })
                    }
                }
                if s.cancel.is_cancelled() {
                    s.send(ClientMessage::PutStop, b"")?;
                    s.recv()?;
                    return Ok(PutOutcome::Cancelled);
                }
                let n = match read_block(&mut file, &mut buf) {
                    Ok(n) => n,
                    Err(err) => {
                        s.send(ClientMessage::PutStop, b"")?;
                        s.recv()?;
                        return Err(err.into());
                    }
                };
                s.send(ClientMessage::PutData, &buf[..n])?;
                if n == 0 {
                    break;
                }
                bytes += n as u64;
                progress(bytes);
            }
            Ok(PutOutcome::Stored { remote_dir, bytes })
        })
    }

    /// Best-effort exit notice; the connection closes either way.
    pub fn exit(mut self) {
        let _ = self.send(ClientMessage::Exit, b"");
    }

    fn recv(&mut self) -> Result<(ServerMessage, Vec<u8>)> {
        let (code, payload) = self.codec.recv_raw()?;
        Ok((ServerMessage::from_code(code)?, payload))
    }

    fn send(&mut self, msg: ClientMessage, payload: &[u8]) -> Result<()> {
        self.codec.send(msg.code(), payload)
    }

    fn with_deadline<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.codec.set_deadline(Some(self.config.read_timeout))?;
        let out = f(self);
        let _ = self.codec.set_deadline(None);
        out
    }
}
