//! Environment bridge.
//!
//! Values reach the interpreter as `export` statements at the top of the
//! staged script. Every value is single-quoted; an embedded single quote is
//! spliced in as `'"'"'` (close quote, a double-quoted quote, reopen quote).
//! Nothing is special inside single quotes, so `$`, backticks, double quotes
//! and newlines come through unchanged.

/// Quote a string so the shell reads it back byte-for-byte as one word.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str(r#"'"'"'"#);
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Encode an `export` statement for `name`.
///
/// `name` is assumed to be a valid identifier; see [`is_valid_name`].
pub fn encode(name: &str, value: &str) -> String {
    format!("export {}={}", name, quote(value))
}

/// Check whether `name` is a valid shell variable name.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Variables bash marks readonly at startup. Assigning one fails with a
/// "readonly variable" error.
const SHELL_READONLY: &[&str] = &[
    "BASHOPTS",
    "BASH_VERSINFO",
    "EUID",
    "PPID",
    "SHELLOPTS",
    "UID",
];

/// Check whether bash refuses assignments to `name`.
pub fn is_shell_readonly(name: &str) -> bool {
    SHELL_READONLY.contains(&name)
}

/// Variables exported into every interpreter a context spawns.
///
/// Insertion order is kept; exporting an existing name replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    vars: Vec<(String, String)>,
}

impl EnvOverrides {
    /// Create an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `name` with `value`.
    pub fn export(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> crate::error::ConfigResult<()> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(crate::error::ConfigError::InvalidVariableName(name));
        }

        let value = value.into();
        match self.vars.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name, value)),
        }
        Ok(())
    }

    /// Get the value exported for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterate over exported variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of exported variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if nothing is exported.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Render one `export` line per variable.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.vars {
            out.push_str(&encode(name, value));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("hello"), "'hello'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_single_quote() {
        assert_eq!(quote("Andy's"), r#"'Andy'"'"'s'"#);
    }

    #[test]
    fn test_quote_leaves_metacharacters() {
        let value = "say \"$X=1\" `date` \\n";
        assert_eq!(quote(value), format!("'{}'", value));
    }

    #[test]
    fn test_encode() {
        assert_eq!(
            encode("FOOBAR", "Andy's Laptop"),
            r#"export FOOBAR='Andy'"'"'s Laptop'"#
        );
    }

    #[test]
    fn test_is_shell_readonly() {
        assert!(is_shell_readonly("SHELLOPTS"));
        assert!(is_shell_readonly("EUID"));
        assert!(!is_shell_readonly("PATH"));
        assert!(!is_shell_readonly("uid"));
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("FOO"));
        assert!(is_valid_name("_foo_1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1FOO"));
        assert!(!is_valid_name("FOO-BAR"));
        assert!(!is_valid_name("FOO BAR"));
    }

    #[test]
    fn test_overrides_replace_in_place() {
        let mut env = EnvOverrides::new();
        env.export("A", "1").unwrap();
        env.export("B", "2").unwrap();
        env.export("A", "3").unwrap();

        assert_eq!(env.len(), 2);
        assert_eq!(env.get("A"), Some("3"));
        assert_eq!(env.render(), "export A='3'\nexport B='2'\n");
    }

    #[test]
    fn test_overrides_reject_bad_name() {
        let mut env = EnvOverrides::new();
        assert!(env.export("NOT VALID", "x").is_err());
        assert!(env.is_empty());
    }

    #[test]
    fn test_quote_round_trips_through_bash() {
        let values = [
            "Andy's Laptop says, \"$X=1\"",
            "line one\nline two\n",
            "`echo pwned` $(echo pwned) $HOME",
            "'''",
            "tab\there \\ backslash",
        ];

        for value in values {
            let script = format!("{}\nprintf '%s' \"$V\"", encode("V", value));
            let output = std::process::Command::new("/bin/bash")
                .arg("-c")
                .arg(&script)
                .output()
                .unwrap();
            assert!(output.status.success());
            assert_eq!(String::from_utf8(output.stdout).unwrap(), value);
        }
    }
}
