//! Test utilities for appup
//!
//! Shared by unit tests and the integration suite: a [`CommandRunner`] that
//! records invocations instead of touching the host, and builders for
//! artifact payloads that pass the format sniff.

use anyhow::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::installer::PackageFormat;
use crate::utils::process::{CommandOutcome, CommandRunner, CommandSpec};

/// Records every command and replies with scripted outcomes.
///
/// Outcomes are consumed in order; once the script runs out every command
/// succeeds.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<CommandSpec>>>,
    script: Arc<Mutex<VecDeque<CommandOutcome>>>,
}

impl RecordingRunner {
    /// A runner where every command succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner replying with `outcomes` in order.
    pub fn scripted(outcomes: impl IntoIterator<Item = CommandOutcome>) -> Self {
        Self {
            calls: Arc::default(),
            script: Arc::new(Mutex::new(outcomes.into_iter().collect())),
        }
    }

    /// Commands seen so far.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Rendered command lines seen so far.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }
        let outcome = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(CommandOutcome::SUCCESS);
        Ok(outcome)
    }
}

/// A payload of exactly `len` bytes whose header sniffs as `format`.
pub fn package_bytes(format: PackageFormat, len: usize) -> Vec<u8> {
    let header: &[u8] = match format {
        PackageFormat::Deb => b"!<arch>\ndebian-binary   1342943816  0     0     100644  4         `\n2.0\n",
        PackageFormat::Rpm => &[0xED, 0xAB, 0xEE, 0xDB, 0x03, 0x00, 0x00, 0x01],
    };
    let mut bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let n = header.len().min(len);
    bytes[..n].copy_from_slice(&header[..n]);
    bytes
}
