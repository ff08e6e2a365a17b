/// Log tags identify the module a message originates from.
///
/// Each tag maps to a `--debug-<key>` command-line flag that enables
/// debug-level output for that module only.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTag {
    System,
    State,
    Audit,
    Session,
    Risk,
    Execution,
    Signals,
    Trader,
    Test,
    Other(String),
}

impl LogTag {
    /// Key used for the `--debug-<key>` flag.
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::State => "state".to_string(),
            LogTag::Audit => "audit".to_string(),
            LogTag::Session => "session".to_string(),
            LogTag::Risk => "risk".to_string(),
            LogTag::Execution => "execution".to_string(),
            LogTag::Signals => "signals".to_string(),
            LogTag::Trader => "trader".to_string(),
            LogTag::Test => "test".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Uppercase display name used in console and file output.
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::System => "SYSTEM".to_string(),
            LogTag::State => "STATE".to_string(),
            LogTag::Audit => "AUDIT".to_string(),
            LogTag::Session => "SESSION".to_string(),
            LogTag::Risk => "RISK".to_string(),
            LogTag::Execution => "EXEC".to_string(),
            LogTag::Signals => "SIGNALS".to_string(),
            LogTag::Trader => "TRADER".to_string(),
            LogTag::Test => "TEST".to_string(),
            LogTag::Other(s) => s.to_uppercase(),
        }
    }
}
