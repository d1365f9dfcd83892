//! Failed-login bookkeeping with a timed lockout.
//!
//! All state lives in the device's key-value store, so clearing that store
//! resets the counter and lifts any lockout. This is a deterrent for the
//! login form, not an access control.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::StorageError;
use crate::models::AuthAttemptState;
use crate::storage::KeyValueStore;

pub const ATTEMPTS_KEY: &str = "loginAttempts";
pub const COOLDOWN_KEY: &str = "loginCooldownUntil";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub max_attempts: u32,
    pub cooldown: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            cooldown: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOutcome {
    Open { attempts_remaining: u32 },
    Locked { until: DateTime<Utc> },
}

pub struct AuthThrottle {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    policy: ThrottlePolicy,
}

impl AuthThrottle {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        policy: ThrottlePolicy,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Reads the persisted state. Values that fail to parse are treated as
    /// absent.
    pub fn state(&self) -> Result<AuthAttemptState, StorageError> {
        let attempt_count = self
            .store
            .get(ATTEMPTS_KEY)?
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(0);
        let cooldown_until = self
            .store
            .get(COOLDOWN_KEY)?
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
            .map(|at| at.with_timezone(&Utc));
        Ok(AuthAttemptState {
            attempt_count,
            cooldown_until,
        })
    }

    pub fn record_failure(&self) -> Result<ThrottleOutcome, StorageError> {
        let now = self.clock.now();
        self.tick(now)?;

        let state = self.state()?;
        if let Some(until) = state.cooldown_until.filter(|until| now < *until) {
            return Ok(ThrottleOutcome::Locked { until });
        }

        let attempt_count = state.attempt_count.saturating_add(1);
        self.store.set(ATTEMPTS_KEY, &attempt_count.to_string())?;

        if attempt_count >= self.policy.max_attempts {
            let until = now + self.policy.cooldown;
            self.store.set(COOLDOWN_KEY, &until.to_rfc3339())?;
            tracing::warn!(
                "Login locked after {} failed attempts until {}",
                attempt_count,
                until
            );
            return Ok(ThrottleOutcome::Locked { until });
        }

        tracing::debug!("Failed login attempt {} recorded", attempt_count);
        Ok(ThrottleOutcome::Open {
            attempts_remaining: self.policy.max_attempts - attempt_count,
        })
    }

    pub fn record_success(&self) -> Result<(), StorageError> {
        self.store.remove(ATTEMPTS_KEY)?;
        self.store.remove(COOLDOWN_KEY)?;
        Ok(())
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> Result<bool, StorageError> {
        Ok(self
            .state()?
            .cooldown_until
            .map(|until| now < until)
            .unwrap_or(false))
    }

    /// Time left on the lockout as `MM:SS`, or `None` once it has lapsed.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Result<Option<String>, StorageError> {
        Ok(self
            .state()?
            .cooldown_until
            .filter(|until| now < *until)
            .map(|until| format_remaining(until - now)))
    }

    /// Lifts a lapsed lockout and resets the counter. Returns true when a
    /// lockout was lifted.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<bool, StorageError> {
        match self.state()?.cooldown_until {
            Some(until) if now >= until => {
                self.store.remove(COOLDOWN_KEY)?;
                self.store.remove(ATTEMPTS_KEY)?;
                tracing::info!("Login cooldown lapsed, attempts reset");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

pub fn format_remaining(remaining: Duration) -> String {
    let seconds = remaining.num_seconds().max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownExit {
    Lapsed,
    Stopped,
}

/// One-second countdown that lifts the lockout once it lapses.
pub struct CountdownTask;

impl CountdownTask {
    pub fn start<F>(throttle: Arc<AuthThrottle>, mut on_tick: F) -> CountdownHandle
    where
        F: FnMut(Option<String>) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return CountdownExit::Stopped,
                    _ = interval.tick() => {}
                }

                let now = throttle.now();
                match throttle.tick(now) {
                    Ok(true) => {
                        on_tick(None);
                        return CountdownExit::Lapsed;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!("Countdown stopped, throttle state unreadable: {}", e);
                        return CountdownExit::Stopped;
                    }
                }

                match throttle.remaining_time(now) {
                    Ok(Some(remaining)) => on_tick(Some(remaining)),
                    Ok(None) => {
                        on_tick(None);
                        return CountdownExit::Lapsed;
                    }
                    Err(e) => {
                        tracing::warn!("Countdown stopped, throttle state unreadable: {}", e);
                        return CountdownExit::Stopped;
                    }
                }
            }
        });

        CountdownHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Dropping the handle aborts the countdown.
pub struct CountdownHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<CountdownExit>>,
}

impl CountdownHandle {
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Waits for the countdown to end. Safe to call again if a previous
    /// wait was abandoned.
    pub async fn finished(&mut self) -> CountdownExit {
        let exit = match self.task.as_mut() {
            Some(task) => task.await.unwrap_or(CountdownExit::Stopped),
            None => return CountdownExit::Stopped,
        };
        self.task = None;
        exit
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use std::sync::Mutex;

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }
    }

    fn fixture() -> (Arc<MemoryStore>, Arc<ManualClock>, AuthThrottle) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let throttle = AuthThrottle::new(store.clone(), clock.clone(), ThrottlePolicy::default());
        (store, clock, throttle)
    }

    #[test]
    fn locks_on_fifth_failure() {
        let (_, clock, throttle) = fixture();
        for expected_remaining in (1..=4).rev() {
            assert_eq!(
                throttle.record_failure().unwrap(),
                ThrottleOutcome::Open {
                    attempts_remaining: expected_remaining
                }
            );
        }
        assert!(!throttle.is_locked(clock.now()).unwrap());

        let now = clock.now();
        let outcome = throttle.record_failure().unwrap();
        assert_eq!(
            outcome,
            ThrottleOutcome::Locked {
                until: now + Duration::minutes(15)
            }
        );
        assert!(throttle.is_locked(now).unwrap());

        let state = throttle.state().unwrap();
        assert_eq!(state.attempt_count, 5);
        let until = state.cooldown_until.unwrap();
        assert!((until - (now + Duration::minutes(15))).num_seconds().abs() <= 1);
    }

    #[test]
    fn remaining_time_counts_down_and_lapses() {
        let (_, clock, throttle) = fixture();
        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }
        assert_eq!(throttle.remaining_time(clock.now()).unwrap().as_deref(), Some("15:00"));

        clock.advance(Duration::seconds(1));
        assert_eq!(throttle.remaining_time(clock.now()).unwrap().as_deref(), Some("14:59"));

        clock.advance(Duration::milliseconds(500));
        assert_eq!(throttle.remaining_time(clock.now()).unwrap().as_deref(), Some("14:58"));

        let mut previous = throttle.remaining_time(clock.now()).unwrap().unwrap();
        for _ in 0..10 {
            clock.advance(Duration::seconds(1));
            let current = throttle.remaining_time(clock.now()).unwrap().unwrap();
            assert!(current < previous);
            previous = current;
        }

        clock.advance(Duration::minutes(15));
        assert_eq!(throttle.remaining_time(clock.now()).unwrap(), None);
    }

    #[test]
    fn tick_unlocks_exactly_at_expiry() {
        let (_, clock, throttle) = fixture();
        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }
        let until = throttle.state().unwrap().cooldown_until.unwrap();

        clock.set(until - Duration::milliseconds(1));
        assert!(!throttle.tick(clock.now()).unwrap());
        assert!(throttle.is_locked(clock.now()).unwrap());

        clock.set(until);
        assert!(!throttle.is_locked(clock.now()).unwrap());
        assert!(throttle.tick(clock.now()).unwrap());
        assert_eq!(throttle.state().unwrap(), AuthAttemptState::default());
    }

    #[test]
    fn success_clears_counter_and_cooldown() {
        let (store, clock, throttle) = fixture();
        throttle.record_failure().unwrap();
        throttle.record_failure().unwrap();
        throttle.record_success().unwrap();
        assert_eq!(throttle.state().unwrap().attempt_count, 0);

        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }
        assert!(throttle.is_locked(clock.now()).unwrap());
        throttle.record_success().unwrap();
        assert!(!throttle.is_locked(clock.now()).unwrap());
        assert_eq!(store.get(ATTEMPTS_KEY).unwrap(), None);
        assert_eq!(store.get(COOLDOWN_KEY).unwrap(), None);
    }

    #[test]
    fn failures_while_locked_do_not_extend_cooldown() {
        let (_, clock, throttle) = fixture();
        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }
        let until = throttle.state().unwrap().cooldown_until.unwrap();
        clock.advance(Duration::minutes(3));
        assert_eq!(
            throttle.record_failure().unwrap(),
            ThrottleOutcome::Locked { until }
        );
        assert_eq!(throttle.state().unwrap().attempt_count, 5);
    }

    #[test]
    fn clearing_storage_resets_throttle() {
        let (store, clock, throttle) = fixture();
        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }
        store.remove(ATTEMPTS_KEY).unwrap();
        store.remove(COOLDOWN_KEY).unwrap();
        assert!(!throttle.is_locked(clock.now()).unwrap());
    }

    #[test]
    fn garbage_values_read_as_absent() {
        let (store, clock, throttle) = fixture();
        store.set(ATTEMPTS_KEY, "many").unwrap();
        store.set(COOLDOWN_KEY, "tomorrow").unwrap();
        assert_eq!(throttle.state().unwrap(), AuthAttemptState::default());
        assert!(!throttle.is_locked(clock.now()).unwrap());
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_remaining(Duration::seconds(899)), "14:59");
        assert_eq!(format_remaining(Duration::seconds(61)), "01:01");
        assert_eq!(format_remaining(Duration::milliseconds(1999)), "00:01");
        assert_eq!(format_remaining(Duration::seconds(-3)), "00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_lifts_lapsed_lockout() {
        let (_, clock, throttle) = fixture();
        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }
        clock.advance(Duration::minutes(15));

        let throttle = Arc::new(throttle);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handle = CountdownTask::start(throttle.clone(), move |remaining| {
            sink.lock().unwrap().push(remaining);
        });

        assert_eq!(handle.finished().await, CountdownExit::Lapsed);
        assert_eq!(throttle.state().unwrap(), AuthAttemptState::default());
        assert_eq!(seen.lock().unwrap().last(), Some(&None));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_while_locked_then_opens() {
        let (_, clock, throttle) = fixture();
        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }
        let until = throttle.state().unwrap().cooldown_until.unwrap();

        let throttle = Arc::new(throttle);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handle = CountdownTask::start(throttle.clone(), move |remaining| {
            sink.lock().unwrap().push(remaining);
        });

        // Stay half a second off the one-second ticks so each tick sees a
        // settled clock.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        for _ in 0..3 {
            clock.advance(Duration::seconds(1));
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }

        let ticks: Vec<String> = {
            let seen = seen.lock().unwrap();
            assert!(seen.iter().all(Option::is_some));
            seen.iter().flatten().cloned().collect()
        };
        assert_eq!(ticks, vec!["15:00", "14:59", "14:58", "14:57"]);
        assert!(ticks.windows(2).all(|pair| pair[1] < pair[0]));
        assert!(throttle.is_locked(clock.now()).unwrap());

        clock.set(until);
        assert_eq!(handle.finished().await, CountdownExit::Lapsed);
        assert_eq!(seen.lock().unwrap().last(), Some(&None));
        assert_eq!(throttle.state().unwrap().attempt_count, 0);
        assert!(!throttle.is_locked(clock.now()).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_stops_when_storage_fails() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let throttle = Arc::new(AuthThrottle::new(
            Arc::new(FailingStore),
            clock,
            ThrottlePolicy::default(),
        ));
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let mut handle = CountdownTask::start(throttle, move |_| {
            *sink.lock().unwrap() += 1;
        });

        assert_eq!(handle.finished().await, CountdownExit::Stopped);
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_can_be_stopped() {
        let (_, _clock, throttle) = fixture();
        for _ in 0..5 {
            throttle.record_failure().unwrap();
        }

        let throttle = Arc::new(throttle);
        let mut handle = CountdownTask::start(throttle.clone(), |_| {});
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        handle.stop();

        assert_eq!(handle.finished().await, CountdownExit::Stopped);
        assert!(throttle.is_locked(throttle.now()).unwrap());
    }
}
