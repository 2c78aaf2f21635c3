// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Scripted executor for meta-tests. Commands match against substring
//! rules in declaration order; anything unmatched succeeds with empty
//! output.

use gft_cmd::CmdOutput;
use gft_ssh::{RemoteExec, RemoteProcess, SshError};
use std::{path::Path, sync::Mutex};

pub(crate) struct MockExec {
    rules: Vec<(String, CmdOutput)>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockExec {
    /// An executor where every command exits zero.
    pub fn ok() -> Self {
        MockExec {
            rules: vec![],
            calls: Mutex::new(vec![]),
        }
    }

    /// Add a rule: commands containing `pattern` return this output.
    pub fn rule(mut self, pattern: &str, rc: i32, stdout: &str, stderr: &str) -> Self {
        self.rules.push((
            pattern.to_string(),
            CmdOutput {
                rc,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        ));

        self
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("mock call log poisoned")
            .iter()
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    fn respond(&self, host: &str, cmd: &str) -> CmdOutput {
        self.calls
            .lock()
            .expect("mock call log poisoned")
            .push((host.to_string(), cmd.to_string()));

        self.rules
            .iter()
            .find(|(pat, _)| cmd.contains(pat.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or(CmdOutput {
                rc: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
    }
}

#[async_trait::async_trait]
impl RemoteExec for MockExec {
    async fn run(&self, host: &str, cmd: &str) -> Result<CmdOutput, SshError> {
        Ok(self.respond(host, cmd))
    }

    async fn run_as(&self, host: &str, _user: &str, cmd: &str) -> Result<CmdOutput, SshError> {
        Ok(self.respond(host, cmd))
    }

    async fn spawn(&self, host: &str, cmd: &str) -> Result<RemoteProcess, SshError> {
        Ok(RemoteProcess::canned(self.respond(host, cmd)))
    }

    async fn push_file(&self, _host: &str, _from: &Path, _to: &Path) -> Result<(), SshError> {
        Ok(())
    }
}
