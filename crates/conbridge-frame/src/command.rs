use std::fmt;

/// A console command extracted from the inbound stream, terminator removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    /// Build a command from raw payload bytes (invalid UTF-8 is replaced).
    pub fn from_payload(payload: &[u8]) -> Self {
        Self(String::from_utf8_lossy(payload).into_owned())
    }

    /// The payload exactly as received.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The payload in the form handed to a command executor.
    pub fn normalized(&self) -> String {
        normalize_command(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PartialEq<&str> for Command {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Make `raw` end in exactly one `\n`.
///
/// A single trailing newline is kept as is, a missing one is appended and
/// extra trailing newlines are collapsed. Idempotent.
pub fn normalize_command(raw: &str) -> String {
    let body = raw.trim_end_matches('\n');
    let mut out = String::with_capacity(body.len() + 1);
    out.push_str(body);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_missing_newline() {
        assert_eq!(normalize_command("status"), "status\n");
    }

    #[test]
    fn keeps_existing_newline() {
        assert_eq!(normalize_command("status\n"), "status\n");
        assert_eq!(normalize_command("status\r\n"), "status\r\n");
    }

    #[test]
    fn collapses_repeated_newlines() {
        assert_eq!(normalize_command("status\n\n\n"), "status\n");
    }

    #[test]
    fn empty_payload_becomes_bare_newline() {
        assert_eq!(normalize_command(""), "\n");
    }

    #[test]
    fn command_lossy_utf8() {
        let cmd = Command::from_payload(b"say \xFFhi");
        assert_eq!(cmd.as_str(), "say \u{FFFD}hi");
        assert_eq!(cmd.normalized(), "say \u{FFFD}hi\n");
    }
}
