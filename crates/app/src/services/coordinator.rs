//! Device coordinator — owns one client and the status mirrored from it.
//!
//! All device IO for a unit goes through its coordinator, one request at a
//! time. The mirrored [`DeviceStatus`] only ever changes after a successful
//! read or an acknowledged command; failures leave it untouched.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gree_amber_domain::climate::{DeviceCommand, DeviceStatus};
use gree_amber_domain::error::{CommandError, HubError};
use gree_amber_domain::time::{Timestamp, now};

use crate::ports::{ClientError, ClimateClient, DeviceIdentity};

/// Consecutive missed polls tolerated before a unit is reported unavailable.
pub const DEFAULT_MAX_ERRORS: u32 = 2;

/// Silence after which a successful poll still counts as a missed one.
pub const DEFAULT_MAX_RESPONSE_AGE: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct Mirror {
    status: DeviceStatus,
    available: bool,
    error_count: u32,
    last_response: Timestamp,
}

/// Serializes IO to one unit and mirrors its last known status.
pub struct DeviceCoordinator<C> {
    name: String,
    identity: DeviceIdentity,
    client: tokio::sync::Mutex<Option<C>>,
    mirror: Mutex<Mirror>,
    max_errors: u32,
    max_response_age: Duration,
}

impl<C: ClimateClient> DeviceCoordinator<C> {
    /// Wrap a connected client whose first read returned `initial`.
    pub fn new(name: impl Into<String>, client: C, initial: DeviceStatus, max_errors: u32) -> Self {
        let identity = client.identity();
        Self {
            name: name.into(),
            identity,
            client: tokio::sync::Mutex::new(Some(client)),
            mirror: Mutex::new(Mirror {
                status: initial,
                available: true,
                error_count: 0,
                last_response: now(),
            }),
            max_errors: max_errors.max(1),
            max_response_age: DEFAULT_MAX_RESPONSE_AGE,
        }
    }

    /// Count a successful poll as an error when the unit had not answered
    /// for `age` before it.
    #[must_use]
    pub fn with_max_response_age(mut self, age: Duration) -> Self {
        self.max_response_age = age;
        self
    }

    /// Display name of the unit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity reported by the client when it connected. The host is the
    /// one it connected to, even after a relocation.
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Last mirrored status.
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        self.lock_mirror().status.clone()
    }

    /// Whether the unit is currently considered reachable.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.lock_mirror().available
    }

    /// Time of the last successful read or acknowledged command.
    #[must_use]
    pub fn last_response(&self) -> Timestamp {
        self.lock_mirror().last_response
    }

    /// Poll the unit and replace the mirrored status.
    ///
    /// A failed poll keeps the previous status. The unit is reported
    /// unavailable once `max_errors` polls in a row time out, or at once when
    /// it is no longer bound. A poll answering after more than the maximum
    /// response age is mirrored but counted as an error.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Command`] when the read fails or the client is closed.
    #[tracing::instrument(skip(self), fields(device = %self.name))]
    pub async fn refresh(&self) -> Result<DeviceStatus, HubError> {
        let mut guard = self.client.lock().await;
        let Some(client) = guard.as_mut() else {
            return Err(self.command_error(ClientError::Closed));
        };

        match client.update_state().await {
            Ok(status) => {
                self.record_poll(&status);
                Ok(status)
            }
            Err(err) => {
                self.record_failure(&err);
                Err(self.command_error(err))
            }
        }
    }

    /// Send `commands` to the unit in one request.
    ///
    /// The mirrored status is updated only when the unit acknowledges, and
    /// the acknowledgement marks the unit reachable again.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Command`] when the write fails or the client is
    /// closed; the mirrored status is unchanged in that case.
    #[tracing::instrument(skip(self), fields(device = %self.name))]
    pub async fn push(&self, commands: &[DeviceCommand]) -> Result<DeviceStatus, HubError> {
        if commands.is_empty() {
            return Ok(self.status());
        }

        let mut guard = self.client.lock().await;
        let Some(client) = guard.as_mut() else {
            return Err(self.command_error(ClientError::Closed));
        };

        if let Err(err) = client.push_state(commands).await {
            tracing::warn!(error = %err, "sending state update failed");
            return Err(self.command_error(err));
        }

        let mut mirror = self.lock_mirror();
        mirror.status = mirror.status.applied(commands);
        self.mark_reachable(&mut mirror);
        Ok(mirror.status.clone())
    }

    /// Point the client at `host:port` and read the unit there.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Command`] when the client cannot move, is closed,
    /// or the read at the new address fails.
    #[tracing::instrument(skip(self), fields(device = %self.name))]
    pub async fn relocate(&self, host: &str, port: u16) -> Result<DeviceStatus, HubError> {
        {
            let mut guard = self.client.lock().await;
            let Some(client) = guard.as_mut() else {
                return Err(self.command_error(ClientError::Closed));
            };
            client
                .relocate(host, port)
                .await
                .map_err(|err| self.command_error(err))?;
        }
        tracing::info!(host, port, "device moved");
        self.refresh().await
    }

    /// Close the client. Only the first call reaches the client; later calls
    /// return `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Command`] if the client fails to close. The client
    /// is dropped either way.
    pub async fn shutdown(&self) -> Result<bool, HubError> {
        let client = self.client.lock().await.take();
        let Some(mut client) = client else {
            return Ok(false);
        };
        client.close().await.map_err(|err| self.command_error(err))?;
        tracing::debug!(device = %self.name, "client closed");
        Ok(true)
    }

    fn record_poll(&self, status: &DeviceStatus) {
        let mut mirror = self.lock_mirror();
        mirror.status = status.clone();
        let silence = (now() - mirror.last_response).to_std().unwrap_or_default();
        if silence < self.max_response_age {
            self.mark_reachable(&mut mirror);
            return;
        }

        mirror.error_count += 1;
        mirror.last_response = now();
        tracing::warn!(
            device = %self.name,
            silence_secs = silence.as_secs(),
            errors = mirror.error_count,
            "device took unusually long to respond"
        );
        if mirror.available && mirror.error_count >= self.max_errors {
            mirror.available = false;
            tracing::warn!(device = %self.name, "device stopped responding");
        }
    }

    fn mark_reachable(&self, mirror: &mut Mirror) {
        if !mirror.available {
            tracing::info!(device = %self.name, "device is reachable again");
        }
        mirror.available = true;
        mirror.error_count = 0;
        mirror.last_response = now();
    }

    fn record_failure(&self, err: &ClientError) {
        let mut mirror = self.lock_mirror();
        match err {
            ClientError::NotBound | ClientError::Closed => {
                mirror.available = false;
                tracing::warn!(device = %self.name, error = %err, "device unavailable");
            }
            ClientError::Timeout | ClientError::Transport(_) => {
                mirror.error_count += 1;
                if mirror.available && mirror.error_count >= self.max_errors {
                    mirror.available = false;
                    tracing::warn!(
                        device = %self.name,
                        errors = mirror.error_count,
                        "device stopped responding"
                    );
                } else {
                    tracing::debug!(
                        device = %self.name,
                        errors = mirror.error_count,
                        error = %err,
                        "poll failed, keeping last state"
                    );
                }
            }
        }
    }

    fn command_error(&self, err: ClientError) -> HubError {
        CommandError {
            device: self.name.clone(),
            source: Box::new(err),
        }
        .into()
    }

    fn lock_mirror(&self) -> MutexGuard<'_, Mirror> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gree_amber_domain::climate::OperationMode;

    #[derive(Default)]
    struct Script {
        reads: VecDeque<Result<DeviceStatus, ClientError>>,
        push_fails: bool,
        pushed: Vec<Vec<DeviceCommand>>,
        moves: Vec<(String, u16)>,
    }

    struct FakeClient {
        script: Arc<Mutex<Script>>,
        closes: Arc<AtomicUsize>,
    }

    impl ClimateClient for FakeClient {
        fn identity(&self) -> DeviceIdentity {
            DeviceIdentity {
                mac: "f4911e7aca59".to_string(),
                name: "1e7aca59".to_string(),
                host: "192.168.1.40".to_string(),
                firmware: None,
            }
        }

        async fn update_state(&mut self) -> Result<DeviceStatus, ClientError> {
            self.script
                .lock()
                .unwrap()
                .reads
                .pop_front()
                .unwrap_or(Err(ClientError::Timeout))
        }

        async fn push_state(&mut self, commands: &[DeviceCommand]) -> Result<(), ClientError> {
            let mut script = self.script.lock().unwrap();
            script.pushed.push(commands.to_vec());
            if script.push_fails {
                Err(ClientError::Timeout)
            } else {
                Ok(())
            }
        }

        async fn relocate(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
            self.script.lock().unwrap().moves.push((host.to_string(), port));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ClientError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn coordinator(script: Script) -> (DeviceCoordinator<FakeClient>, Arc<Mutex<Script>>, Arc<AtomicUsize>) {
        let script = Arc::new(Mutex::new(script));
        let closes = Arc::new(AtomicUsize::new(0));
        let client = FakeClient {
            script: Arc::clone(&script),
            closes: Arc::clone(&closes),
        };
        let initial = DeviceStatus {
            power: true,
            mode: Some(OperationMode::Cool),
            target_temperature: Some(24),
            ..DeviceStatus::default()
        };
        (
            DeviceCoordinator::new("Bedroom AC", client, initial, DEFAULT_MAX_ERRORS),
            script,
            closes,
        )
    }

    #[tokio::test]
    async fn should_replace_status_on_successful_poll() {
        let fresh = DeviceStatus {
            power: false,
            ..DeviceStatus::default()
        };
        let (coordinator, _, _) = coordinator(Script {
            reads: VecDeque::from([Ok(fresh.clone())]),
            ..Script::default()
        });

        let status = coordinator.refresh().await.unwrap();
        assert_eq!(status, fresh);
        assert_eq!(coordinator.status(), fresh);
        assert!(coordinator.is_available());
    }

    #[tokio::test]
    async fn should_keep_status_when_poll_fails() {
        let (coordinator, _, _) = coordinator(Script::default());
        let before = coordinator.status();

        let result = coordinator.refresh().await;
        assert!(matches!(result, Err(HubError::Command(_))));
        assert_eq!(coordinator.status(), before);
        assert!(coordinator.is_available());
    }

    #[tokio::test]
    async fn should_become_unavailable_after_max_errors() {
        let (coordinator, _, _) = coordinator(Script::default());

        let _ = coordinator.refresh().await;
        assert!(coordinator.is_available());
        let _ = coordinator.refresh().await;
        assert!(!coordinator.is_available());
    }

    #[tokio::test]
    async fn should_become_unavailable_at_once_when_not_bound() {
        let (coordinator, _, _) = coordinator(Script {
            reads: VecDeque::from([Err(ClientError::NotBound)]),
            ..Script::default()
        });

        let _ = coordinator.refresh().await;
        assert!(!coordinator.is_available());
    }

    #[tokio::test]
    async fn should_recover_after_successful_poll() {
        let (coordinator, _, _) = coordinator(Script {
            reads: VecDeque::from([
                Err(ClientError::Timeout),
                Err(ClientError::Timeout),
                Ok(DeviceStatus::default()),
            ]),
            ..Script::default()
        });

        let _ = coordinator.refresh().await;
        let _ = coordinator.refresh().await;
        assert!(!coordinator.is_available());
        coordinator.refresh().await.unwrap();
        assert!(coordinator.is_available());
    }

    #[tokio::test]
    async fn should_count_stale_answers_as_errors() {
        let (coordinator, _, _) = coordinator(Script {
            reads: VecDeque::from([Ok(DeviceStatus::default()), Ok(DeviceStatus::default())]),
            ..Script::default()
        });
        let coordinator = coordinator.with_max_response_age(Duration::ZERO);

        let status = coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.status(), status);
        assert!(coordinator.is_available());
        coordinator.refresh().await.unwrap();
        assert!(!coordinator.is_available());
    }

    #[tokio::test]
    async fn should_reset_errors_on_timely_answer() {
        let (coordinator, _, _) = coordinator(Script {
            reads: VecDeque::from([
                Err(ClientError::Timeout),
                Ok(DeviceStatus::default()),
                Err(ClientError::Timeout),
            ]),
            ..Script::default()
        });

        let _ = coordinator.refresh().await;
        coordinator.refresh().await.unwrap();
        let _ = coordinator.refresh().await;
        assert!(coordinator.is_available());
    }

    #[tokio::test]
    async fn should_become_available_when_unit_acknowledges_command() {
        let (coordinator, _, _) = coordinator(Script::default());
        let _ = coordinator.refresh().await;
        let _ = coordinator.refresh().await;
        assert!(!coordinator.is_available());

        let status = coordinator.push(&[DeviceCommand::Power(false)]).await.unwrap();

        assert!(!status.power);
        assert!(coordinator.is_available());
        let _ = coordinator.refresh().await;
        assert!(coordinator.is_available());
    }

    #[tokio::test]
    async fn should_read_unit_at_new_address_after_relocation() {
        let moved = DeviceStatus {
            target_temperature: Some(19),
            ..DeviceStatus::default()
        };
        let (coordinator, script, _) = coordinator(Script {
            reads: VecDeque::from([Ok(moved.clone())]),
            ..Script::default()
        });

        let status = coordinator.relocate("192.168.1.77", 7000).await.unwrap();

        assert_eq!(status, moved);
        assert_eq!(coordinator.status(), moved);
        assert_eq!(script.lock().unwrap().moves, vec![("192.168.1.77".to_string(), 7000)]);
    }

    #[tokio::test]
    async fn should_forward_commands_exactly() {
        let (coordinator, script, _) = coordinator(Script::default());
        let commands = [
            DeviceCommand::Mode(OperationMode::Heat),
            DeviceCommand::TargetTemperature(21),
        ];

        let status = coordinator.push(&commands).await.unwrap();
        assert_eq!(script.lock().unwrap().pushed, vec![commands.to_vec()]);
        assert_eq!(status.mode, Some(OperationMode::Heat));
        assert_eq!(status.target_temperature, Some(21));
    }

    #[tokio::test]
    async fn should_leave_status_unchanged_when_push_fails() {
        let (coordinator, _, _) = coordinator(Script {
            push_fails: true,
            ..Script::default()
        });
        let before = coordinator.status();

        let result = coordinator.push(&[DeviceCommand::Power(false)]).await;
        assert!(matches!(result, Err(HubError::Command(_))));
        assert_eq!(coordinator.status(), before);
    }

    #[tokio::test]
    async fn should_skip_io_for_empty_command_list() {
        let (coordinator, script, _) = coordinator(Script::default());
        coordinator.push(&[]).await.unwrap();
        assert!(script.lock().unwrap().pushed.is_empty());
    }

    #[tokio::test]
    async fn should_close_client_exactly_once() {
        let (coordinator, _, closes) = coordinator(Script::default());

        assert!(coordinator.shutdown().await.unwrap());
        assert!(!coordinator.shutdown().await.unwrap());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_refuse_io_after_shutdown() {
        let (coordinator, _, _) = coordinator(Script::default());
        coordinator.shutdown().await.unwrap();

        assert!(coordinator.refresh().await.is_err());
        assert!(coordinator.push(&[DeviceCommand::Power(true)]).await.is_err());
        assert!(coordinator.relocate("192.168.1.77", 7000).await.is_err());
    }
}
