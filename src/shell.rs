//! Interactive command shell for the client binary.
//!
//! Pure presentation over [`ClientSession`]: prompt loop, tokenizer,
//! local-side commands (`lcd`, `lpwd`, `lls`) and one human-readable line
//! per failure. No protocol logic lives here.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::client::{
    CancelToken, CdOutcome, ClientSession, GetOutcome, LsOutcome, PutOutcome,
};
use crate::listing;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Cd(String),
    Lcd(String),
    Pwd,
    Lpwd,
    Ls(Option<String>),
    Lls(Option<String>),
    Get { remote: String, dest: Option<String> },
    Put { local: String, dest: Option<String> },
    Exit,
}

impl Command {
    fn parse(tokens: &[String]) -> Option<Self> {
        let rest = &tokens[1..];
        match (tokens.first()?.as_str(), rest.len()) {
            ("cd", 1) => Some(Self::Cd(rest[0].clone())),
            ("lcd", 1) => Some(Self::Lcd(rest[0].clone())),
            ("pwd", 0) => Some(Self::Pwd),
            ("lpwd", 0) => Some(Self::Lpwd),
            ("ls", 0) => Some(Self::Ls(None)),
            ("ls", 1) => Some(Self::Ls(Some(rest[0].clone()))),
            ("lls", 0) => Some(Self::Lls(None)),
            ("lls", 1) => Some(Self::Lls(Some(rest[0].clone()))),
            ("get", 1 | 2) => Some(Self::Get {
                remote: rest[0].clone(),
                dest: rest.get(1).cloned(),
            }),
            ("put", 1 | 2) => Some(Self::Put {
                local: rest[0].clone(),
                dest: rest.get(1).cloned(),
            }),
            ("exit", 0) => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Splits a command line on spaces, honouring backslash-escaped spaces
/// inside path arguments. Runs of spaces are collapsed.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            ' ' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if escaped {
        current.push('\\');
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

pub struct Shell {
    session: ClientSession,
    cancel: CancelToken,
    local_cwd: PathBuf,
}

impl Shell {
    pub fn new(session: ClientSession, cancel: CancelToken) -> Result<Self> {
        let local_cwd = std::env::current_dir().context("resolve current directory")?;
        Ok(Self {
            session,
            cancel,
            local_cwd,
        })
    }

    /// Prompt loop. Returns cleanly on `exit` or end of input; protocol
    /// failures that kill the connection propagate as errors.
    pub fn run(mut self) -> Result<()> {
        let stdin = io::stdin();
        loop {
            print!("skiff> ");
            io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            let tokens = tokenize(line.trim());
            if tokens.is_empty() {
                continue;
            }
            let Some(command) = Command::parse(&tokens) else {
                println!("Invalid command.");
                continue;
            };
            if matches!(command, Command::Exit) {
                break;
            }
            self.cancel.reset();
            self.dispatch(command)?;
        }
        self.session.exit();
        println!("Connection closed.");
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Cd(path) => match self.session.cd(&path)? {
                CdOutcome::Changed => {}
                CdOutcome::NoSuchDirectory => {
                    println!("Couldn't stat remote directory: No such file or directory");
                }
            },
            Command::Lcd(path) => self.lcd(&path),
            Command::Pwd => {
                println!("Remote working directory: {}", self.session.pwd()?);
            }
            Command::Lpwd => {
                println!("Local working directory: {}", self.local_cwd.display());
            }
            Command::Ls(path) => match self.session.ls(path.as_deref())? {
                LsOutcome::Listing(text) => print!("{text}"),
                LsOutcome::NoSuchDirectory => {
                    println!("Couldn't stat remote directory: No such file or directory");
                }
                LsOutcome::Failed => println!("Remote listing failed."),
            },
            Command::Lls(path) => self.lls(path.as_deref()),
            Command::Get { remote, dest } => self.get(&remote, dest.as_deref())?,
            Command::Put { local, dest } => self.put(&local, dest.as_deref())?,
            Command::Exit => unreachable!("exit is handled by the prompt loop"),
        }
        Ok(())
    }

    fn lcd(&mut self, path: &str) {
        let target = self.local_path(path);
        match target.canonicalize() {
            Ok(dir) if dir.is_dir() => self.local_cwd = dir,
            _ => println!(
                "Couldn't change local directory to \"{path}\": No such file or directory"
            ),
        }
    }

    fn lls(&self, path: Option<&str>) {
        let dir = match path {
            Some(p) => self.local_path(p),
            None => self.local_cwd.clone(),
        };
        match listing::read_entries(&dir) {
            Ok(names) => print!("{}", listing::render(&names)),
            Err(_) => println!(
                "Couldn't stat local directory \"{}\": No such file or directory",
                dir.display()
            ),
        }
    }

    fn get(&mut self, remote: &str, dest: Option<&str>) -> Result<()> {
        let dest_dir = match dest {
            Some(d) => self.local_path(d),
            None => self.local_cwd.clone(),
        };
        if !dest_dir.is_dir() {
            println!(
                "Couldn't get to local directory \"{}\": No such file or directory",
                dest_dir.display()
            );
            return Ok(());
        }
        let bar = transfer_bar(remote);
        let outcome = self
            .session
            .get(remote, &dest_dir, |bytes| bar.set_position(bytes))?;
        bar.finish_and_clear();
        match outcome {
            GetOutcome::Fetched { path, bytes } => {
                println!("Fetched {remote} to {} ({bytes} bytes)", path.display());
            }
            GetOutcome::NoSuchFile(attempted) => {
                println!("File \"{attempted}\" not found.");
            }
            GetOutcome::Failed => println!("Transfer failed."),
            GetOutcome::Cancelled => println!("Transfer cancelled."),
        }
        Ok(())
    }

    fn put(&mut self, local: &str, dest: Option<&str>) -> Result<()> {
        let local_path = self.local_path(local);
        if !local_path.is_file() {
            println!(
                "Couldn't stat local file \"{}\": No such file",
                local_path.display()
            );
            return Ok(());
        }
        let bar = transfer_bar(local);
        let outcome = self
            .session
            .put(&local_path, dest, |bytes| bar.set_position(bytes))?;
        bar.finish_and_clear();
        match outcome {
            PutOutcome::Stored { remote_dir, bytes } => {
                println!("Uploaded {local} to {remote_dir} ({bytes} bytes)");
            }
            PutOutcome::NoSuchDirectory => {
                println!("Directory \"{}\" not found.", dest.unwrap_or_default());
            }
            PutOutcome::Failed => println!("Transfer failed."),
            PutOutcome::Cancelled => println!("Transfer cancelled."),
        }
        Ok(())
    }

    fn local_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.local_cwd.join(p)
        }
    }
}

fn transfer_bar(label: &str) -> ProgressBar {
    // total size is not carried by the protocol, so show moving byte counts
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}  {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(label.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(line: &str) -> Vec<String> {
        tokenize(line)
    }

    #[test]
    fn tokenize_collapses_spaces() {
        assert_eq!(toks("ls   docs"), vec!["ls", "docs"]);
        assert!(toks("   ").is_empty());
    }

    #[test]
    fn tokenize_honours_escaped_spaces() {
        assert_eq!(toks(r"get my\ file.txt"), vec!["get", "my file.txt"]);
        assert_eq!(toks(r"cd a\ b\ c"), vec!["cd", "a b c"]);
    }

    #[test]
    fn parse_checks_arity() {
        assert_eq!(Command::parse(&toks("pwd")), Some(Command::Pwd));
        assert_eq!(Command::parse(&toks("cd")), None);
        assert_eq!(Command::parse(&toks("cd a b")), None);
        assert_eq!(Command::parse(&toks("ls")), Some(Command::Ls(None)));
        assert_eq!(
            Command::parse(&toks("get a b")),
            Some(Command::Get {
                remote: "a".to_string(),
                dest: Some("b".to_string())
            })
        );
        assert_eq!(Command::parse(&toks("get")), None);
        assert_eq!(Command::parse(&toks("frobnicate")), None);
    }
}
