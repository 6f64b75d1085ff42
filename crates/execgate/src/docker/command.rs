//! Command builder for `docker run`
//!
//! Builds command-line arguments that start one locked-down container.

use std::path::PathBuf;

use crate::types::SandboxLimits;

/// The single writable directory inside the container
pub const SANDBOX_DIR: &str = "/sandbox";

/// Builder for `docker run` command-line arguments
#[derive(Debug)]
pub struct DockerCommand {
    /// Path to docker binary
    docker_path: PathBuf,
    /// --name
    name: String,
    image: String,
    /// Resource limits
    limits: SandboxLimits,
    /// -e, --env (ordered)
    env: Vec<(String, String)>,
    command: Vec<String>,
}

impl DockerCommand {
    /// Create a new docker run command builder
    pub fn new(
        docker_path: impl Into<PathBuf>,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            docker_path: docker_path.into(),
            name: name.into(),
            image: image.into(),
            limits: SandboxLimits::default(),
            env: Vec::new(),
            command: Vec::new(),
        }
    }

    /// Set resource limits
    pub fn limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set an environment variable inside the container
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.env.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.env.push((key, value)),
        }
        self
    }

    /// Set the command to run
    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Build the command-line arguments
    ///
    /// Consumes self to avoid cloning the command vector.
    pub fn build(self) -> Vec<String> {
        let limits = &self.limits;
        let (uid, gid) = split_user(&limits.user);

        let mut args = vec![
            self.docker_path.to_string_lossy().into_owned(),
            "run".to_string(),
            "--rm".to_string(),
            format!("--name={}", self.name),
            "--network=none".to_string(),
            format!("--cpus={}", limits.cpus),
            format!("--memory={}", limits.memory),
            format!("--pids-limit={}", limits.pids_limit),
            "--read-only".to_string(),
            format!(
                "--tmpfs={SANDBOX_DIR}:rw,size={}m,exec,noatime,uid={uid},gid={gid},mode=0777",
                limits.tmpfs_size_mb
            ),
            "--security-opt=no-new-privileges".to_string(),
            "--cap-drop=ALL".to_string(),
            format!("--user={}", limits.user),
            format!("--workdir={SANDBOX_DIR}"),
        ];

        for (key, value) in &self.env {
            args.push(format!("--env={key}={value}"));
        }

        args.push(self.image);
        args.extend(self.command);
        args
    }
}

/// Split `uid:gid`, reusing the uid when no group is given
fn split_user(user: &str) -> (&str, &str) {
    match user.split_once(':') {
        Some((uid, gid)) => (uid, gid),
        None => (user, user),
    }
}
