use crate::domain::ProviderHandle;
use crate::poller::{PollTurn, Poller};
use crate::ports::{EngineError, HostPort, HostProfile};

/// Detects an injected wallet provider without blocking the caller.
/// A single check is [`ProviderProbe::probe_once`]; the watch loop repeats
/// it on a fixed interval until a provider appears or attempts run out.
pub struct ProviderProbe<H: HostPort> {
    host: H,
    watch: Option<Poller>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTurn {
    NotDue,
    Found(ProviderHandle),
    /// An attempt ran and found nothing; the value is the attempt number.
    StillSearching(u32),
    TimedOut,
}

impl<H: HostPort> ProviderProbe<H> {
    pub fn new(host: H) -> Self {
        Self { host, watch: None }
    }

    /// One synchronous check of the host's provider slots. Idempotent:
    /// repeated misses have no effect beyond the returned value.
    pub fn probe_once(&self) -> Result<Option<ProviderHandle>, EngineError> {
        self.host.probe_once()
    }

    pub fn profile(&self) -> Result<HostProfile, EngineError> {
        self.host.profile()
    }

    pub fn begin_watch(&mut self, now_ms: u64, interval_ms: u64, max_attempts: u32) {
        self.watch = Some(Poller::starting_now(now_ms, interval_ms, max_attempts));
    }

    pub fn watching(&self) -> bool {
        self.watch.as_ref().is_some_and(|w| !w.is_cancelled())
    }

    /// Advances the watch loop. The watch ends on the first hit, on
    /// exhaustion, or when [`ProviderProbe::cancel_watch`] is called;
    /// after any of those no further attempts run.
    pub fn poll_watch(&mut self, now_ms: u64) -> Result<WatchTurn, EngineError> {
        let Some(watch) = self.watch.as_mut() else {
            return Ok(WatchTurn::NotDue);
        };
        match watch.poll(now_ms) {
            PollTurn::NotDue => {
                if watch.exhausted() {
                    self.watch = None;
                    return Ok(WatchTurn::TimedOut);
                }
                Ok(WatchTurn::NotDue)
            }
            PollTurn::Due(attempt) => match self.host.probe_once()? {
                Some(handle) => {
                    self.watch = None;
                    Ok(WatchTurn::Found(handle))
                }
                None => {
                    if self.watch.as_ref().is_some_and(|w| w.exhausted()) {
                        self.watch = None;
                        return Ok(WatchTurn::TimedOut);
                    }
                    Ok(WatchTurn::StillSearching(attempt))
                }
            },
        }
    }

    pub fn cancel_watch(&mut self) {
        if let Some(watch) = self.watch.as_mut() {
            watch.cancel();
        }
        self.watch = None;
    }
}
