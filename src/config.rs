use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{SwitcherError, SwitcherResult};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub switcher: SwitcherConfig,
    #[serde(default)]
    pub phonetic: PhoneticConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

// ============================================================================
// Switcher Config
// ============================================================================

/// One spoken source key and the switcher input it names
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct InputEntry {
    pub key: String,
    pub source: String,
}

impl InputEntry {
    fn new(key: &str, source: &str) -> Self {
        Self {
            key: key.to_string(),
            source: source.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SwitcherConfig {
    /// Ordered source table. The first entry starts on program, the second on preview.
    #[serde(default = "default_inputs")]
    pub inputs: Vec<InputEntry>,

    /// Copy the first previewed source to program as well
    #[serde(default = "default_bootstrap_program")]
    pub bootstrap_program: bool,

    /// Pause between setting the A row and taking it during a direct cut
    #[serde(default = "default_direct_cut_settle_ms")]
    pub direct_cut_settle_ms: u64,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            inputs: default_inputs(),
            bootstrap_program: default_bootstrap_program(),
            direct_cut_settle_ms: default_direct_cut_settle_ms(),
        }
    }
}

impl SwitcherConfig {
    pub fn direct_cut_settle(&self) -> Duration {
        Duration::from_millis(self.direct_cut_settle_ms)
    }
}

fn default_inputs() -> Vec<InputEntry> {
    vec![
        InputEntry::new("1", "input1"),
        InputEntry::new("2", "input2"),
        InputEntry::new("3", "input3"),
        InputEntry::new("4", "input4"),
        InputEntry::new("5", "input5"),
        InputEntry::new("6", "input6"),
        InputEntry::new("7", "input7"),
        InputEntry::new("8", "input8"),
        InputEntry::new("p1", "ddr1"),
        InputEntry::new("p2", "ddr2"),
        InputEntry::new("m1", "V1"),
        InputEntry::new("m2", "V2"),
    ]
}

fn default_bootstrap_program() -> bool {
    true
}

fn default_direct_cut_settle_ms() -> u64 {
    200
}

// ============================================================================
// Phonetic Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PhoneticConfig {
    /// Start from the built-in correction table
    #[serde(default = "default_include_builtin")]
    pub include_builtin: bool,

    /// Extra corrections, applied over the built-in ones
    #[serde(default)]
    pub entries: HashMap<String, String>,
}

impl Default for PhoneticConfig {
    fn default() -> Self {
        Self {
            include_builtin: default_include_builtin(),
            entries: HashMap::new(),
        }
    }
}

impl PhoneticConfig {
    /// Merged correction table: built-ins (if enabled) overridden by `entries`
    pub fn table(&self) -> HashMap<String, String> {
        let mut table = if self.include_builtin {
            builtin_phonetic_table()
        } else {
            HashMap::new()
        };
        for (heard, canonical) in &self.entries {
            table.insert(heard.to_lowercase(), canonical.to_lowercase());
        }
        table
    }
}

fn default_include_builtin() -> bool {
    true
}

/// Corrections collected from live tuning sessions with the recognizer
pub fn builtin_phonetic_table() -> HashMap<String, String> {
    [
        ("one", "1"),
        ("two", "2"),
        ("too", "2"),
        ("three", "3"),
        ("tree", "3"),
        ("four", "4"),
        ("fo", "4"),
        ("five", "5"),
        ("six", "6"),
        ("seven", "7"),
        ("eight", "8"),
        ("nine", "9"),
        ("p one", "p1"),
        ("p 1", "p1"),
        ("pone", "p1"),
        ("p two", "p2"),
        ("p 2", "p2"),
        ("ptwo", "p2"),
        ("m one", "m1"),
        ("m 1", "m1"),
        ("m-one", "m1"),
        ("mone", "m1"),
        ("m two", "m2"),
        ("m 2", "m2"),
        ("m-two", "m2"),
        ("mtwo", "m2"),
        ("cut cut", "cut"),
        ("cut mix", "cut"),
        ("cup", "cut"),
        ("c", "cut"),
        ("quart", "cut"),
        ("court", "cut"),
        ("1 cup", "1 cut"),
        ("to cut", "2 cut"),
        ("for cut", "4 cut"),
        ("pit 2 cut", "p2 cut"),
        ("pick 2 cut", "p2 cut"),
        ("p to cut", "p2 cut"),
    ]
    .into_iter()
    .map(|(heard, canonical)| (heard.to_string(), canonical.to_string()))
    .collect()
}

// ============================================================================
// Session Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Rotate the recognition session before the provider cuts it off
    #[serde(default = "default_max_session_secs")]
    pub max_session_secs: u64,

    /// Identical commands inside this window are dropped
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    #[serde(default = "default_max_command_words")]
    pub max_command_words: usize,

    /// Delay before exit so the last spoken feedback can finish
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Upper bound on a single transcript pull
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_reopen_attempts")]
    pub reopen_attempts: u32,

    #[serde(default = "default_reopen_delay_ms")]
    pub reopen_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_secs: default_max_session_secs(),
            dedup_window_ms: default_dedup_window_ms(),
            max_command_words: default_max_command_words(),
            grace_ms: default_grace_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            reopen_attempts: default_reopen_attempts(),
            reopen_delay_ms: default_reopen_delay_ms(),
        }
    }
}

impl SessionConfig {
    pub fn max_session(&self) -> Duration {
        Duration::from_secs(self.max_session_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_delay_ms)
    }
}

fn default_max_session_secs() -> u64 {
    290
}

fn default_dedup_window_ms() -> u64 {
    250
}

fn default_max_command_words() -> usize {
    3
}

fn default_grace_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_reopen_attempts() -> u32 {
    5
}

fn default_reopen_delay_ms() -> u64 {
    500
}

// ============================================================================
// Device Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Shortcut endpoint of the switcher's REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Log device commands instead of sending them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            dry_run: false,
        }
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1/v1/shortcut".into()
}

fn default_timeout_ms() -> u64 {
    1500
}

impl Config {
    /// Load from a TOML file. A missing file means defaults; a malformed one is an error.
    pub fn load(path: &Path) -> SwitcherResult<Self> {
        let config = if path.exists() {
            let text = fs::read_to_string(path)?;
            Self::from_toml_str(&text)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> SwitcherResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> SwitcherResult<()> {
        let inputs = &self.switcher.inputs;
        if inputs.len() < 2 {
            return Err(SwitcherError::Config(format!(
                "at least two inputs are required (program and preview), got {}",
                inputs.len()
            )));
        }

        let mut seen = HashSet::new();
        for entry in inputs {
            let key = entry.key.trim().to_lowercase();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(SwitcherError::Config(format!(
                    "input key '{}' must be a single word",
                    entry.key
                )));
            }
            if !seen.insert(key) {
                return Err(SwitcherError::Config(format!(
                    "duplicate input key '{}'",
                    entry.key
                )));
            }
        }

        if self.session.max_session_secs == 0 {
            return Err(SwitcherError::Config(
                "session.max_session_secs must be greater than zero".into(),
            ));
        }

        if self.session.poll_interval_ms == 0 {
            return Err(SwitcherError::Config(
                "session.poll_interval_ms must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
