//! Lifecycle controller: accumulates configuration, then drives the
//! relay through `Configured -> Running -> Stopped`.

use std::path::Path;
use std::sync::Arc;

use crate::config::{AppConfig, Direction, PortConfig, SubstitutionTable};
use crate::checksum::ChecksumMethod;
use crate::endpoint::SerialEndpoint;
use crate::relay::RelayEngine;
use crate::replay::ReplayEngine;
use crate::tee::Tee;
use crate::Error;

/// Where the relay currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Configured,
    Running,
    Stopped,
}

/// Owns the configuration tree and, once started, the live `RelayEngine`.
/// Every CLI command that mutates configuration or drives lifecycle goes
/// through this type.
pub struct Supervisor {
    config: AppConfig,
    state: EngineState,
    tee: Arc<Tee>,
    relay: Option<RelayEngine>,
}

impl Supervisor {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            state: EngineState::Configured,
            tee: Arc::new(Tee::new(true)),
            relay: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn require_not_running(&self) -> Result<(), Error> {
        if self.state == EngineState::Running {
            Err(Error::Busy)
        } else {
            Ok(())
        }
    }

    pub fn set_port(&mut self, dir: Direction, port: PortConfig) -> Result<(), Error> {
        self.require_not_running()?;
        self.config.set_port(dir, port);
        Ok(())
    }

    /// Sets the start/end delimiter sets. Rejects any empty delimiter
    /// group without changing the current configuration: an empty group
    /// matches the tail of every rolling window, so framing would buffer
    /// forever and never flush.
    pub fn set_delimiters(&mut self, start: Vec<Vec<u8>>, end: Vec<Vec<u8>>) -> Result<(), Error> {
        self.require_not_running()?;
        if start.iter().chain(end.iter()).any(|d| d.is_empty()) {
            return Err(Error::Config("delimiters must be nonempty".to_string()));
        }
        self.config.start_delimiters = start;
        self.config.end_delimiters = end;
        Ok(())
    }

    /// Sets the substitution table for `dir`. Permitted while running: the
    /// relay only reads it at message-completion time.
    pub fn set_substitution_table(&mut self, dir: Direction, table: SubstitutionTable) {
        self.config.substitutions.insert(dir, table);
        if let Some(relay) = &self.relay {
            relay.set_substitution_table(dir, self.config.substitutions.get(&dir).cloned());
        }
    }

    /// Sets the checksum method for `dir`. Permitted while running.
    pub fn set_checksum_method(&mut self, dir: Direction, method: ChecksumMethod) {
        self.config.checksums.insert(dir, method);
        if let Some(relay) = &self.relay {
            relay.set_checksum_method(dir, Some(method));
        }
    }

    pub fn open_capture(&mut self, path: &Path) -> Result<(), Error> {
        self.tee.open_capture(path)?;
        self.config.capture_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn close_capture(&mut self) {
        self.tee.close_capture();
        self.config.capture_path = None;
    }

    pub fn set_display_enabled(&self, enabled: bool) {
        self.tee.set_display_enabled(enabled);
    }

    /// Opens both endpoints, clears per-direction runtime state by building
    /// a fresh `RelayEngine`, and spawns the two reader threads.
    pub fn start(&mut self) -> Result<(), Error> {
        self.require_not_running()?;
        let port_a = self
            .config
            .port(Direction::A)
            .cloned()
            .ok_or_else(|| Error::Config("port A is not configured".to_string()))?;
        let port_b = self
            .config
            .port(Direction::B)
            .cloned()
            .ok_or_else(|| Error::Config("port B is not configured".to_string()))?;

        log::info!("supervisor: opening {} and {}", port_a.device, port_b.device);
        let endpoint_a = SerialEndpoint::open(&port_a.device, port_a.baud)?;
        let endpoint_b = SerialEndpoint::open(&port_b.device, port_b.baud)?;

        let relay = RelayEngine::new(
            endpoint_a,
            endpoint_b,
            self.config.start_delimiters.clone(),
            self.config.end_delimiters.clone(),
            self.config.substitutions.clone(),
            self.config.checksums.clone(),
            Arc::clone(&self.tee),
        );

        self.relay = Some(relay);
        self.state = EngineState::Running;
        log::info!("supervisor: relay running (window capacity {})", self.config.window_capacity());
        Ok(())
    }

    /// Stops the relay, closing both endpoints and joining their reader
    /// threads. The capture file, if any, is left open.
    pub fn stop(&mut self) -> Result<(), Error> {
        if let Some(relay) = self.relay.take() {
            relay.stop()?;
        }
        self.state = EngineState::Stopped;
        log::info!("supervisor: relay stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running && self.relay.as_ref().is_some_and(|r| r.is_running())
    }

    pub fn relay(&self) -> Option<&RelayEngine> {
        self.relay.as_ref()
    }

    /// Replays `path` (optionally restricted to `selector`) through the
    /// live relay. Fails with `NotRunning` unless the relay is up.
    pub fn replay(&self, path: &Path, selector: Option<&str>) -> Result<(), Error> {
        let relay = self.relay.clone().ok_or(Error::NotRunning)?;
        ReplayEngine::new(relay).run(path, selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Supervisor {
        let mut config = AppConfig::default();
        config.set_port(Direction::A, PortConfig::new("/dev/null", 9600));
        config.set_port(Direction::B, PortConfig::new("/dev/null", 9600));
        Supervisor::new(config)
    }

    #[test]
    fn starts_in_configured_state() {
        let supervisor = Supervisor::new(AppConfig::default());
        assert_eq!(supervisor.state(), EngineState::Configured);
    }

    #[test]
    fn reconfiguring_ports_while_unconfigured_succeeds() {
        let mut supervisor = Supervisor::new(AppConfig::default());
        assert!(supervisor.set_port(Direction::A, PortConfig::new("/dev/ttyUSB0", 115_200)).is_ok());
    }

    #[test]
    fn setting_an_empty_delimiter_group_fails_without_changing_configuration() {
        let mut supervisor = configured();
        supervisor.set_delimiters(vec![vec![0xAA]], vec![vec![0x0A]]).unwrap();
        assert!(supervisor.set_delimiters(vec![vec![]], vec![]).is_err());
        assert_eq!(supervisor.config().start_delimiters, vec![vec![0xAA]]);
        assert_eq!(supervisor.config().end_delimiters, vec![vec![0x0A]]);
    }

    #[test]
    fn starting_without_both_ports_fails() {
        let mut supervisor = Supervisor::new(AppConfig::default());
        assert!(supervisor.start().is_err());
    }

    #[test]
    fn replay_before_start_fails_with_not_running() {
        let supervisor = configured();
        let path = std::env::temp_dir().join("does-not-matter.cap");
        assert!(matches!(supervisor.replay(&path, None), Err(Error::NotRunning)));
    }

    #[test]
    fn opening_a_second_capture_fails() {
        let mut supervisor = configured();
        let path = std::env::temp_dir().join(format!("uart-proxy-supervisor-test-{}.cap", uuid::Uuid::new_v4()));
        supervisor.open_capture(&path).unwrap();
        assert!(supervisor.open_capture(&path).is_err());
        supervisor.close_capture();
        let _ = std::fs::remove_file(&path);
    }
}
