/// Fragments that mark a command as unsafe wherever they appear in it.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "rm", "shutdown", "reboot", "mkfs", "dd", "passwd",
    ":(){:|:&};:", "kill", "pkill", "halt", "init 0",
    "curl", "wget", "scp", "ftp",
];

/// Best-effort command guard based on case-insensitive substring matching.
///
/// This is a denylist, not a sandbox. A listed fragment is rejected anywhere in
/// the command, including inside arguments and quoted strings ("echo address"
/// contains "dd"). Synonyms, absolute paths, encoded payloads and environment
/// indirection all pass.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    denylist: Vec<String>,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().copied())
    }
}

impl CommandValidator {
    pub fn new<I, S>(denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let denylist = denylist
            .into_iter()
            .map(|entry| entry.as_ref().to_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect();
        Self { denylist }
    }

    pub fn is_safe(&self, command: &str) -> bool {
        if command.trim().is_empty() {
            return false;
        }
        self.matched_entry(command).is_none()
    }

    /// First denylist entry found in `command`, if any.
    pub fn matched_entry(&self, command: &str) -> Option<&str> {
        let lower = command.to_lowercase();
        self.denylist
            .iter()
            .find(|entry| lower.contains(entry.as_str()))
            .map(String::as_str)
    }
}
