//! Blocking IMAP-over-TLS session.
//!
//! Hand-rolled tagged command/response exchange over rustls, with the
//! Gmail extensions this deployment relies on (`X-GM-RAW` search) and
//! IDLE for server-push change notification.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::MailboxError;
use crate::mailbox::{FetchedMessage, MailEvent, MailboxSession};

/// Read timeout applied to ordinary command exchanges.
const COMMAND_READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One live IMAP connection.
pub struct ImapSession {
    tls: TlsStream,
    tag_counter: u32,
    /// Tag of the in-flight IDLE command, if push mode is active.
    idle_tag: Option<String>,
}

impl ImapSession {
    /// Connect and read the server greeting. Does not log in.
    pub fn connect(host: &str, port: u16) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((host, port))
            .map_err(|e| MailboxError::Connect(format!("{host}:{port}: {e}")))?;
        tcp.set_read_timeout(Some(COMMAND_READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let mut tls = rustls::StreamOwned::new(conn, tcp);

        let greeting = read_line(&mut tls)?;
        trace!(greeting = greeting.trim_end(), "IMAP connected");

        Ok(Self {
            tls,
            tag_counter: 0,
            idle_tag: None,
        })
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    /// Send one tagged command and collect all response lines up to and
    /// including the tagged completion line.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MailboxError> {
        let tag = self.next_tag();
        self.tls.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.tls.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = read_line(&mut self.tls)?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }

    /// Run a command and require an `OK` completion.
    fn command_ok(&mut self, cmd: &str) -> Result<Vec<String>, MailboxError> {
        let lines = self.command(cmd)?;
        let completion = lines.last().cloned().unwrap_or_default();
        if tagged_ok(&completion) {
            Ok(lines)
        } else {
            // Do not echo the full command; LOGIN carries the secret.
            let verb = cmd.split_whitespace().next().unwrap_or(cmd).to_string();
            Err(MailboxError::CommandFailed {
                command: verb,
                response: completion.trim_end().to_string(),
            })
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), MailboxError> {
        self.tls.sock.set_read_timeout(Some(timeout))?;
        Ok(())
    }
}

impl MailboxSession for ImapSession {
    fn login(&mut self, user: &str, secret: &str) -> Result<(), MailboxError> {
        let cmd = format!("LOGIN {} {}", quote(user), quote(secret));
        self.command_ok(&cmd).map_err(|_| MailboxError::LoginFailed {
            user: user.to_string(),
        })?;
        debug!(user, "IMAP login ok");
        Ok(())
    }

    fn select_folder(&mut self, name: &str) -> Result<(), MailboxError> {
        self.command_ok(&format!("SELECT {}", quote(name)))?;
        Ok(())
    }

    fn folder_exists(&mut self, name: &str) -> Result<bool, MailboxError> {
        let lines = self.command_ok(&format!("LIST \"\" {}", quote(name)))?;
        Ok(lines.iter().any(|l| l.starts_with("* LIST")))
    }

    fn create_folder(&mut self, name: &str) -> Result<(), MailboxError> {
        self.command_ok(&format!("CREATE {}", quote(name)))?;
        Ok(())
    }

    fn search(&mut self, query: &str) -> Result<Vec<u32>, MailboxError> {
        let lines = self.command_ok(&format!("UID SEARCH X-GM-RAW {}", quote(query)))?;
        let mut uids = Vec::new();
        for line in &lines {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                for field in rest.split_whitespace() {
                    let uid = field.parse().map_err(|_| {
                        MailboxError::UnexpectedResponse(line.trim_end().to_string())
                    })?;
                    uids.push(uid);
                }
            }
        }
        Ok(uids)
    }

    fn fetch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>, MailboxError> {
        let mut messages = Vec::with_capacity(uids.len());
        for &uid in uids {
            let tag = self.next_tag();
            self.tls
                .write_all(format!("{tag} UID FETCH {uid} (RFC822)\r\n").as_bytes())?;
            self.tls.flush()?;

            let mut raw: Option<Vec<u8>> = None;
            loop {
                let line = read_line(&mut self.tls)?;
                if line.starts_with(&tag) {
                    if !tagged_ok(&line) {
                        return Err(MailboxError::CommandFailed {
                            command: "UID FETCH".into(),
                            response: line.trim_end().to_string(),
                        });
                    }
                    break;
                }
                if line.starts_with('*')
                    && line.contains("FETCH")
                    && let Some(size) = literal_size(&line)
                {
                    raw = Some(read_exact_bytes(&mut self.tls, size)?);
                }
            }

            match raw {
                Some(raw) => messages.push(FetchedMessage { uid, raw }),
                // Message vanished between search and fetch (moved or
                // deleted by another client). Not our problem.
                None => debug!(uid, "UID FETCH returned no body, skipping"),
            }
        }
        Ok(messages)
    }

    fn move_messages(&mut self, uids: &[u32], dest: &str) -> Result<(), MailboxError> {
        if uids.is_empty() {
            return Ok(());
        }
        let set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.command_ok(&format!("UID MOVE {set} {}", quote(dest)))?;
        Ok(())
    }

    fn idle_start(&mut self) -> Result<(), MailboxError> {
        let tag = self.next_tag();
        self.tls.write_all(format!("{tag} IDLE\r\n").as_bytes())?;
        self.tls.flush()?;

        let line = read_line(&mut self.tls)?;
        if !line.starts_with('+') {
            return Err(MailboxError::CommandFailed {
                command: "IDLE".into(),
                response: line.trim_end().to_string(),
            });
        }
        self.idle_tag = Some(tag);
        Ok(())
    }

    fn idle_poll(&mut self, timeout: Duration) -> Result<Option<MailEvent>, MailboxError> {
        self.set_read_timeout(timeout)?;
        let result = match read_line(&mut self.tls) {
            Ok(line) if line.starts_with('*') => Ok(Some(MailEvent {
                raw: line.trim_end().to_string(),
            })),
            Ok(_) => Ok(None),
            Err(MailboxError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        };
        self.set_read_timeout(COMMAND_READ_TIMEOUT)?;
        result
    }

    fn idle_done(&mut self) -> Result<(), MailboxError> {
        let Some(tag) = self.idle_tag.take() else {
            return Ok(());
        };
        self.tls.write_all(b"DONE\r\n")?;
        self.tls.flush()?;
        // Drain any queued untagged responses until the IDLE completion.
        loop {
            let line = read_line(&mut self.tls)?;
            if line.starts_with(&tag) {
                return Ok(());
            }
        }
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        self.command("LOGOUT")?;
        Ok(())
    }
}

/// Read one CRLF-terminated line.
fn read_line(tls: &mut TlsStream) -> Result<String, MailboxError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match tls.read(&mut byte) {
            Ok(0) => return Err(MailboxError::ConnectionClosed),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read exactly `size` bytes (an IMAP literal body).
fn read_exact_bytes(tls: &mut TlsStream, size: usize) -> Result<Vec<u8>, MailboxError> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        match tls.read(&mut buf[filled..]) {
            Ok(0) => return Err(MailboxError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(buf)
}

/// Extract the byte count from a trailing `{nnn}` literal marker.
fn literal_size(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let open = trimmed.rfind('{')?;
    let close = trimmed.rfind('}')?;
    trimmed.get(open + 1..close)?.parse().ok()
}

fn tagged_ok(completion: &str) -> bool {
    completion
        .split_whitespace()
        .nth(1)
        .is_some_and(|status| status == "OK")
}

/// Quote an IMAP string argument, escaping backslash and double quote.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_size_parses_fetch_line() {
        assert_eq!(
            literal_size("* 12 FETCH (UID 457 RFC822 {20155}\r\n"),
            Some(20155)
        );
    }

    #[test]
    fn literal_size_none_without_marker() {
        assert_eq!(literal_size("* 12 EXISTS\r\n"), None);
    }

    #[test]
    fn tagged_ok_accepts_ok_completion() {
        assert!(tagged_ok("A3 OK SEARCH completed\r\n"));
        assert!(!tagged_ok("A3 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n"));
        assert!(!tagged_ok("A3 BAD Could not parse command\r\n"));
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("pa\"ss"), "\"pa\\\"ss\"");
        assert_eq!(quote("back\\slash"), "\"back\\\\slash\"");
    }
}
