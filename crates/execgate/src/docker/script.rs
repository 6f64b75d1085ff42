//! In-container driver script
//!
//! The container runs a POSIX `sh` script that decodes the submission from
//! the environment, optionally compiles it, then runs it under `timeout`.
//! Source and stdin never appear in the script text; they travel base64
//! encoded in `CODE_B64` and `STDIN_B64`.

use crate::docker::{COMPILE_FAILURE_EXIT_CODE, RUN_TIMEOUT_EXIT_CODE, SANDBOX_DIR};

/// 128 + SIGTERM
const BUSYBOX_TIMEOUT_EXIT_CODE: i32 = 143;

/// Environment variable carrying the base64 encoded source
pub const CODE_ENV: &str = "CODE_B64";

/// Environment variable carrying the base64 encoded stdin (absent when empty)
pub const STDIN_ENV: &str = "STDIN_B64";

/// Builder for the script executed by `sh -c` inside the container
#[derive(Debug, Clone)]
pub struct SandboxScript<'a> {
    file_name: &'a str,
    compile: Option<&'a str>,
    run: &'a str,
    timeout_seconds: u64,
}

impl<'a> SandboxScript<'a> {
    pub fn new(file_name: &'a str, run: &'a str, timeout_seconds: u64) -> Self {
        Self {
            file_name,
            compile: None,
            run,
            timeout_seconds,
        }
    }

    /// Set the compile command; blank commands are ignored
    pub fn compile(mut self, compile: Option<&'a str>) -> Self {
        self.compile = compile.filter(|cmd| !cmd.trim().is_empty());
        self
    }

    pub fn build(&self) -> String {
        let dir = SANDBOX_DIR;
        let mut script = String::new();

        // No pipefail in POSIX sh
        script.push_str("set -eu; ");
        script.push_str(&format!("cd {dir}; "));
        script.push_str(&format!(
            "printf %s \"${CODE_ENV}\" | base64 -d > {dir}/{}; ",
            self.file_name
        ));

        if let Some(compile) = self.compile {
            script.push_str(&format!(
                "{{ {compile} ; }} > {dir}/.compile.out 2> {dir}/.compile.err || \
                 {{ cat {dir}/.compile.out; cat {dir}/.compile.err 1>&2; exit {COMPILE_FAILURE_EXIT_CODE}; }}; "
            ));
        }

        script.push_str(&format!(
            "if command -v timeout >/dev/null 2>&1; then TOUT=\"timeout {}\"; else TOUT=; fi; ",
            self.timeout_seconds
        ));

        let run = shell_quote(self.run);
        script.push_str(&format!(
            "rc=0; if [ -n \"${{{STDIN_ENV}:-}}\" ]; then printf %s \"${STDIN_ENV}\" | base64 -d | $TOUT sh -c {run} || rc=$?; \
             else $TOUT sh -c {run} || rc=$?; fi; "
        ));

        // Busybox timeout reports the TERM it sent instead of 124
        script.push_str(&format!(
            "if [ -n \"$TOUT\" ] && [ \"$rc\" -eq {BUSYBOX_TIMEOUT_EXIT_CODE} ]; then exit {RUN_TIMEOUT_EXIT_CODE}; fi; exit \"$rc\""
        ));

        script
    }
}

/// Quote a string for POSIX sh as a single word
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
