use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::CString;
use std::path::PathBuf;

/// Variable exported to every child with the shell's working directory at launch time.
pub const PARENT_VAR: &str = "parent";

/// Variable exported to every child with the directory the shell was started from.
pub const SHELL_VAR: &str = "shell";

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: cached working directory, kept in sync with the process by `cd`.
/// - `startup_dir`: the working directory when the shell started.
/// - `should_exit`: set by `exit`; the interactive loop stops once it sees it.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    pub startup_dir: PathBuf,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`. The `should_exit` flag is initialized to `false`.
    pub fn new() -> Self {
        let vars: HashMap<String, String> = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut env = Self {
            vars,
            startup_dir: current_dir.clone(),
            current_dir,
            should_exit: false,
        };
        let startup = env.startup_dir.to_string_lossy().into_owned();
        env.set_var(SHELL_VAR, startup);
        env
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// The `KEY=VALUE` block handed to a launched program.
    ///
    /// `parent` always reflects the current directory. Entries that cannot be
    /// represented as C strings are skipped.
    pub fn exec_block(&self) -> Vec<CString> {
        let parent = self.current_dir.to_string_lossy();
        self.vars
            .iter()
            .filter(|(k, _)| k.as_str() != PARENT_VAR)
            .map(|(k, v)| format!("{k}={v}"))
            .chain(std::iter::once(format!("{PARENT_VAR}={parent}")))
            .filter_map(|entry| CString::new(entry).ok())
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use std::collections::HashMap;
    use std::env as stdenv;
    use std::path::PathBuf;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            startup_dir: stdenv::current_dir().unwrap(),
            should_exit: false,
        };

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
        assert!(env.get_var("shell").is_some());
    }

    #[test]
    fn test_exec_block_exports_parent_dir() {
        let mut env = Environment {
            vars: HashMap::new(),
            current_dir: PathBuf::from("/work/here"),
            startup_dir: PathBuf::from("/"),
            should_exit: false,
        };
        env.set_var("parent", "stale");
        env.set_var("A", "1");

        let mut block: Vec<String> = env
            .exec_block()
            .into_iter()
            .map(|c| c.into_string().unwrap())
            .collect();
        block.sort();

        assert_eq!(block, vec!["A=1", "parent=/work/here"]);
    }
}
