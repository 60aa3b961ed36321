//! Device control port - named shortcut commands sent to the switcher

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::DeviceConfig;
use crate::error::{SwitcherError, SwitcherResult};

/// Switcher bus row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    /// Program bus
    A,
    /// Preview bus
    B,
}

/// Command understood by the switcher's shortcut API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    SetNamedInput { row: Row, source: String },
    Take,
    AutoTransition,
}

impl DeviceCommand {
    pub fn shortcut(&self) -> &'static str {
        match self {
            DeviceCommand::SetNamedInput { row: Row::A, .. } => "main_a_row_named_input",
            DeviceCommand::SetNamedInput { row: Row::B, .. } => "main_b_row_named_input",
            DeviceCommand::Take => "main_take",
            DeviceCommand::AutoTransition => "main_auto",
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            DeviceCommand::SetNamedInput { source, .. } => Some(source),
            DeviceCommand::Take | DeviceCommand::AutoTransition => None,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(value) => write!(f, "{}={}", self.shortcut(), value),
            None => write!(f, "{}", self.shortcut()),
        }
    }
}

/// Write-only port to the switcher. Implementations must return within a
/// bounded time; failures are reported, never retried here.
pub trait DeviceControl: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, command: &DeviceCommand) -> SwitcherResult<()>;
}

/// Sends shortcuts as `GET <base_url>?name=<shortcut>&value=<source>`
pub struct HttpShortcutPort {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpShortcutPort {
    pub fn new(config: &DeviceConfig) -> SwitcherResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| SwitcherError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

impl DeviceControl for HttpShortcutPort {
    fn name(&self) -> &str {
        "http"
    }

    fn send(&self, command: &DeviceCommand) -> SwitcherResult<()> {
        let mut params = vec![("name", command.shortcut())];
        if let Some(value) = command.value() {
            params.push(("value", value));
        }

        let response = self.client.get(&self.base_url).query(&params).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SwitcherError::Dispatch(format!(
                "{} answered {}",
                command.shortcut(),
                status
            )));
        }
        Ok(())
    }
}

/// Dry-run port: logs instead of sending
pub struct LogOnlyPort;

impl DeviceControl for LogOnlyPort {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn send(&self, command: &DeviceCommand) -> SwitcherResult<()> {
        info!(command = %command, "dry run, not sent");
        Ok(())
    }
}

/// Build the port selected by config
pub fn create_port(config: &DeviceConfig) -> SwitcherResult<Arc<dyn DeviceControl>> {
    if config.dry_run {
        return Ok(Arc::new(LogOnlyPort));
    }
    Ok(Arc::new(HttpShortcutPort::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortcut_names() {
        let preview = DeviceCommand::SetNamedInput {
            row: Row::B,
            source: "input2".into(),
        };
        assert_eq!(preview.shortcut(), "main_b_row_named_input");
        assert_eq!(preview.value(), Some("input2"));
        assert_eq!(preview.to_string(), "main_b_row_named_input=input2");

        let program = DeviceCommand::SetNamedInput {
            row: Row::A,
            source: "ddr1".into(),
        };
        assert_eq!(program.shortcut(), "main_a_row_named_input");

        assert_eq!(DeviceCommand::Take.shortcut(), "main_take");
        assert_eq!(DeviceCommand::Take.value(), None);
        assert_eq!(DeviceCommand::AutoTransition.to_string(), "main_auto");
    }

    #[test]
    fn test_dry_run_port() {
        let config = DeviceConfig {
            dry_run: true,
            ..DeviceConfig::default()
        };
        let port = create_port(&config).unwrap();
        assert_eq!(port.name(), "dry-run");
        assert!(port.send(&DeviceCommand::Take).is_ok());
    }

    #[test]
    fn test_unreachable_switcher_is_dispatch_error() {
        let config = DeviceConfig {
            base_url: "http://127.0.0.1:9/v1/shortcut".into(),
            timeout_ms: 300,
            dry_run: false,
        };
        let port = create_port(&config).unwrap();
        assert_eq!(port.name(), "http");
        let result = port.send(&DeviceCommand::Take);
        assert!(matches!(result, Err(SwitcherError::Dispatch(_))));
    }
}
