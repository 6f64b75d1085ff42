use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const MIN_CODE_LEN: usize = 2;
const MAX_CODE_LEN: usize = 16;

/// Configuration for a programming language
///
/// Descriptors are read-only once loaded; the runner only ever borrows them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "Python 3.12")
    pub name: String,

    /// Container image the submission runs in
    pub image: String,

    /// Name of the source file inside the scratch directory (e.g., "Main.java")
    pub file_name: FileName,

    /// Shell command compiling the source (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<String>,

    /// Shell command running the program
    pub run: String,

    /// Toolchain version, informational only
    #[serde(default)]
    pub version: Option<String>,

    /// Disabled languages are rejected before admission
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Language {
    /// Check if the language has a compile phase
    pub fn is_compiled(&self) -> bool {
        self.compile.as_deref().is_some_and(|cmd| !cmd.trim().is_empty())
    }

    /// The compile command, if the language has a compile phase
    pub fn compile_command(&self) -> Option<&str> {
        self.compile.as_deref().filter(|cmd| !cmd.trim().is_empty())
    }
}

fn default_enabled() -> bool {
    true
}

/// Bare file name with no path components
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileName(String);

impl FileName {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(ConfigError::InvalidFileName(name.to_owned()));
        }
        // The name is spliced into a shell script
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(ConfigError::InvalidFileName(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for FileName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileName::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a bare file name made of [A-Za-z0-9._-]",
            )
        })
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check a language code: 2 to 16 lowercase ASCII letters
pub fn is_valid_language_code(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python() -> Language {
        Language {
            name: "Python".to_owned(),
            image: "python:3.12-alpine".to_owned(),
            file_name: FileName::new("main.py").unwrap(),
            compile: None,
            run: "python3 main.py".to_owned(),
            version: None,
            enabled: true,
        }
    }

    #[test]
    fn file_name_valid() {
        assert_eq!(FileName::new("main.cpp").unwrap().as_str(), "main.cpp");
        assert_eq!(FileName::new("Main.java").unwrap().to_string(), "Main.java");
        assert!(FileName::new("solution_1-a.rs").is_ok());
    }

    #[test]
    fn file_name_rejects_paths() {
        assert!(FileName::new("").is_err());
        assert!(FileName::new(".").is_err());
        assert!(FileName::new("..").is_err());
        assert!(FileName::new("dir/main.py").is_err());
        assert!(FileName::new("/etc/passwd").is_err());
    }

    #[test]
    fn file_name_rejects_shell_metacharacters() {
        assert!(FileName::new("main.py;rm").is_err());
        assert!(FileName::new("a b").is_err());
        assert!(FileName::new("$(x)").is_err());
    }

    #[test]
    fn language_is_compiled_false() {
        assert!(!python().is_compiled());
        assert_eq!(python().compile_command(), None);
    }

    #[test]
    fn language_is_compiled_true() {
        let lang = Language {
            compile: Some("g++ -O2 -o main main.cpp".to_owned()),
            ..python()
        };
        assert!(lang.is_compiled());
        assert_eq!(lang.compile_command(), Some("g++ -O2 -o main main.cpp"));
    }

    #[test]
    fn blank_compile_command_means_no_compile_phase() {
        let lang = Language {
            compile: Some("   ".to_owned()),
            ..python()
        };
        assert!(!lang.is_compiled());
    }

    #[test]
    fn language_code_validation() {
        assert!(is_valid_language_code("python"));
        assert!(is_valid_language_code("cpp"));
        assert!(!is_valid_language_code("c"));
        assert!(!is_valid_language_code("Python"));
        assert!(!is_valid_language_code("python3"));
        assert!(!is_valid_language_code("abcdefghijklmnopq"));
    }
}
