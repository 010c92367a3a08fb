//! Shell command composition for exec sessions
//!
//! Joins an optional compile step and the run step with `&&`, so the run step
//! only starts when compilation succeeds, and redirects stdin from a file.

use std::borrow::Cow;

use crate::config::{LanguageProfile, STDIN_FILE_NAME};

/// Shell used to interpret the composed command
const SHELL: &str = "/bin/sh";

/// Builder for the command run inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    compile: Option<Vec<String>>,
    run: Vec<String>,
    stdin_file: Option<String>,
}

impl ShellCommand {
    /// Create a command with just a run step
    pub fn new(run: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            compile: None,
            run: run.into_iter().map(Into::into).collect(),
            stdin_file: None,
        }
    }

    /// Build the command for a language profile
    pub fn for_profile(profile: &LanguageProfile, has_stdin: bool) -> Self {
        let mut command = Self::new(profile.run_cmd.iter().cloned());
        if let Some(ref compile) = profile.compile_cmd {
            command = command.compile(compile.iter().cloned());
        }
        if has_stdin {
            command = command.stdin_file(STDIN_FILE_NAME);
        }
        command
    }

    /// Set the compile step
    pub fn compile(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.compile = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    /// Redirect the run step's stdin from a file in the working directory
    pub fn stdin_file(mut self, name: impl Into<String>) -> Self {
        self.stdin_file = Some(name.into());
        self
    }

    /// Render the shell script
    pub fn render(&self) -> String {
        let mut run = join_args(&self.run);
        if let Some(ref file) = self.stdin_file {
            run.push_str(" < ");
            run.push_str(&quote(file));
        }

        match self.compile {
            Some(ref compile) => format!("{} && {}", join_args(compile), run),
            None => run,
        }
    }

    /// Build the argv for the exec session
    pub fn build(self) -> Vec<String> {
        vec![SHELL.to_string(), "-c".to_string(), self.render()]
    }
}

fn join_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote an argument for POSIX sh
///
/// Words made only of safe characters pass through unchanged.
pub fn quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}
