use std::path::PathBuf;

use crate::error::{Result, TransportError};

/// Default endpoint name shared by host and reader.
pub const DEFAULT_ENDPOINT_NAME: &str = "conbridge_console";

/// Suffix of the inbound (reader → host) FIFO on unix.
pub const INBOUND_SUFFIX: &str = "_in";

/// Default directory FIFOs are rooted in on unix.
pub const DEFAULT_FIFO_DIR: &str = "/tmp";

/// Default permission mode for created FIFOs.
pub const DEFAULT_FIFO_MODE: u32 = 0o600;

/// Windows pipe namespace prefix.
pub const PIPE_NAMESPACE: &str = r"\\.\pipe\";

/// Where the bridge endpoint lives and how it is created.
///
/// On unix the endpoint is a pair of FIFOs, `<dir>/<name>` carrying log
/// records out and `<dir>/<name>_in` carrying commands in. On Windows it is a
/// single duplex pipe `\\.\pipe\<name>` and `dir`/`mode` are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Well-known endpoint name.
    pub name: String,
    /// Directory the FIFOs are created in (unix only).
    pub dir: PathBuf,
    /// Permission bits applied to created FIFOs (unix only).
    pub mode: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_ENDPOINT_NAME.to_string(),
            dir: PathBuf::from(DEFAULT_FIFO_DIR),
            mode: DEFAULT_FIFO_MODE,
        }
    }
}

impl EndpointConfig {
    /// Endpoint with the given name in the default location.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Override the FIFO directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Override the FIFO permission bits.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Path of the outbound FIFO (host writes log records here).
    pub fn outbound_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Path of the inbound FIFO (reader writes commands here).
    pub fn inbound_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", self.name, INBOUND_SUFFIX))
    }

    /// Full Windows pipe name.
    pub fn pipe_name(&self) -> String {
        format!("{PIPE_NAMESPACE}{}", self.name)
    }

    /// Reject names that would escape the endpoint directory or namespace.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.name.is_empty() {
            Some("name must not be empty")
        } else if self.name.contains(['/', '\\']) {
            Some("name must not contain path separators")
        } else if self.name.contains('\0') {
            Some("name must not contain NUL")
        } else if self.name == "." || self.name == ".." {
            Some("name must not be a relative path component")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(TransportError::InvalidName {
                name: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_are_rooted_in_tmp() {
        let cfg = EndpointConfig::default();
        assert_eq!(cfg.outbound_path(), PathBuf::from("/tmp/conbridge_console"));
        assert_eq!(cfg.inbound_path(), PathBuf::from("/tmp/conbridge_console_in"));
        assert_eq!(cfg.pipe_name(), r"\\.\pipe\conbridge_console");
    }

    #[test]
    fn builder_overrides() {
        let cfg = EndpointConfig::named("game").with_dir("/run/user/1000").with_mode(0o660);
        assert_eq!(cfg.outbound_path(), PathBuf::from("/run/user/1000/game"));
        assert_eq!(cfg.inbound_path(), PathBuf::from("/run/user/1000/game_in"));
        assert_eq!(cfg.mode, 0o660);
    }

    #[test]
    fn validate_rejects_bad_names() {
        for bad in ["", "a/b", r"a\b", "..", "nul\0"] {
            let result = EndpointConfig::named(bad).validate();
            assert!(
                matches!(result, Err(TransportError::InvalidName { .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(EndpointConfig::named("console-1").validate().is_ok());
    }
}
