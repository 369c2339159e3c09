use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::BuiltinError;
use anyhow::Context;
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Commands implemented inside the shell process itself.
///
/// The set is closed: dispatch is an exhaustive `match`, so adding a variant forces
/// every caller to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ChangeDirectory,
    ShowHelp,
    Exit,
}

impl Builtin {
    /// Every built-in, in the order `help` lists them.
    pub const ALL: [Builtin; 3] = [Builtin::ChangeDirectory, Builtin::ShowHelp, Builtin::Exit];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::ChangeDirectory => Cd::NAME,
            Builtin::ShowHelp => Help::NAME,
            Builtin::Exit => Exit::NAME,
        }
    }

    /// Finds the built-in called `name`, if any.
    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    /// Runs the built-in in the caller's process.
    ///
    /// `args` excludes the command name. Output goes to `stdout`; state changes such as
    /// a new working directory or a request to exit are applied to `env`.
    pub fn run(
        self,
        args: &[String],
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        match self {
            Builtin::ChangeDirectory => invoke::<Cd>(args, stdout, env),
            Builtin::ShowHelp => invoke::<Help>(args, stdout, env),
            Builtin::Exit => invoke::<Exit>(args, stdout, env),
        }
    }
}

/// Built-in argument structs, parsed with [`argh`].
trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    const NAME: &'static str;

    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment)
    -> Result<ExitCode, BuiltinError>;
}

fn invoke<T: BuiltinCommand>(
    args: &[String],
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> Result<ExitCode, BuiltinError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match T::from_args(&[T::NAME], &args) {
        Ok(cmd) => cmd.execute(stdout, env),
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => {
            stdout
                .write_all(output.as_bytes())
                .context("writing usage")?;
            Ok(0)
        }
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => Err(BuiltinError::Usage(output.trim_end().to_string())),
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    target: Option<String>,
}

impl BuiltinCommand for Cd {
    const NAME: &'static str = "cd";

    fn execute(
        self,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        let requested = match self.target {
            Some(t) if !t.is_empty() => t,
            _ => env.get_var("HOME").ok_or(BuiltinError::NoHome)?,
        };

        let target = PathBuf::from(&requested);
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical =
            fs::canonicalize(&new_dir).map_err(|_| BuiltinError::NoSuchDirectory(requested))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Show how to use the shell and list the built-in commands.
struct Help {}

impl BuiltinCommand for Help {
    const NAME: &'static str = "help";

    fn execute(
        self,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        write_help(stdout).context("writing help")?;
        Ok(0)
    }
}

fn write_help(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "lsh - a small interactive shell")?;
    writeln!(out)?;
    writeln!(out, "Type a program name followed by its arguments and press enter.")?;
    writeln!(out, "Operators must be separated from words by whitespace:")?;
    writeln!(out, "  a | b | c          connect the output of each stage to the next")?;
    writeln!(out, "  cmd > FILE         write standard output to FILE")?;
    writeln!(out, "  cmd 2> FILE        write standard error to FILE")?;
    writeln!(out, "  cmd < IN > OUT     read IN and write OUT")?;
    writeln!(out, "  cmd &              run cmd in the background")?;
    writeln!(out)?;
    writeln!(out, "Built-in commands:")?;
    for builtin in Builtin::ALL {
        writeln!(out, "- {}", builtin.name())?;
    }
    writeln!(out)?;
    writeln!(out, "Use `man <program>` to learn about other programs.")?;
    Ok(())
}

#[derive(FromArgs)]
/// Exit the shell. Background jobs are left running.
struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    const NAME: &'static str = "exit";

    fn execute(
        self,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        env.should_exit = true;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::env as stdenv;

    fn test_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            startup_dir: stdenv::current_dir().unwrap(),
            should_exit: false,
        }
    }

    fn run(builtin: Builtin, args: &[&str], env: &mut Environment) -> (Result<ExitCode, BuiltinError>, String) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        let res = builtin.run(&args, &mut out, env);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn lookup_knows_every_builtin() {
        assert_eq!(Builtin::lookup("cd"), Some(Builtin::ChangeDirectory));
        assert_eq!(Builtin::lookup("help"), Some(Builtin::ShowHelp));
        assert_eq!(Builtin::lookup("exit"), Some(Builtin::Exit));
        assert_eq!(Builtin::lookup("ls"), None);
    }

    #[test]
    #[serial]
    fn test_cd_to_absolute_path() {
        let cwd_before = stdenv::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let mut env = test_env();

        let (res, _) = run(Builtin::ChangeDirectory, &[tmp.path().to_str().unwrap()], &mut env);
        let expected = fs::canonicalize(tmp.path()).unwrap();
        let actual = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&cwd_before).unwrap();

        assert_eq!(res.unwrap(), 0);
        assert_eq!(env.current_dir, expected);
        assert_eq!(actual, expected);
    }

    #[test]
    #[serial]
    fn test_cd_relative_to_current_dir() {
        let cwd_before = stdenv::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        let mut env = test_env();
        env.current_dir = fs::canonicalize(tmp.path()).unwrap();

        let (res, _) = run(Builtin::ChangeDirectory, &["nested"], &mut env);
        stdenv::set_current_dir(&cwd_before).unwrap();

        assert_eq!(res.unwrap(), 0);
        assert!(env.current_dir.ends_with("nested"));
    }

    #[test]
    #[serial]
    fn test_cd_to_home_when_none() {
        let cwd_before = stdenv::current_dir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let mut env = test_env();
        env.set_var("HOME", home.path().to_str().unwrap());

        let (res, _) = run(Builtin::ChangeDirectory, &[], &mut env);
        stdenv::set_current_dir(&cwd_before).unwrap();

        assert_eq!(res.unwrap(), 0);
        assert_eq!(env.current_dir, fs::canonicalize(home.path()).unwrap());
    }

    #[test]
    #[serial]
    fn test_cd_nonexistent_path_errors() {
        let cwd_before = stdenv::current_dir().unwrap();
        let mut env = test_env();
        let dir_before = env.current_dir.clone();

        let (res, _) = run(Builtin::ChangeDirectory, &["/definitely/not/here"], &mut env);

        match res {
            Err(e @ BuiltinError::NoSuchDirectory(_)) => assert_eq!(
                e.to_string(),
                "cd: /definitely/not/here: directory does not exist"
            ),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(env.current_dir, dir_before);
        assert_eq!(stdenv::current_dir().unwrap(), cwd_before);
    }

    #[test]
    fn test_cd_rejects_extra_arguments() {
        let mut env = test_env();
        let (res, _) = run(Builtin::ChangeDirectory, &["a", "b"], &mut env);
        assert!(matches!(res, Err(BuiltinError::Usage(_))));
    }

    #[test]
    fn test_help_lists_builtins() {
        let mut env = test_env();
        let (res, out) = run(Builtin::ShowHelp, &[], &mut env);
        assert_eq!(res.unwrap(), 0);
        for name in ["- cd\n", "- help\n", "- exit\n"] {
            assert!(out.contains(name), "help output misses {name:?}: {out}");
        }
    }

    #[test]
    fn test_builtin_usage_flag_prints_description() {
        let mut env = test_env();
        let (res, out) = run(Builtin::ChangeDirectory, &["--help"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert!(out.contains("Usage: cd"));
    }

    #[test]
    fn test_exit_requests_shutdown() {
        let mut env = test_env();
        let (res, _) = run(Builtin::Exit, &["3"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert!(env.should_exit);
    }
}
