use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::save::SaveReceipt;

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum WorkoutEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    /// A background save finished; errors arrive already rendered for the status line.
    SaveFinished(Result<SaveReceipt, String>),
}

/// Source of app events (keyboard, resize, background work)
pub trait WorkoutEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<WorkoutEvent, RecvTimeoutError>;

    /// Block until an event arrives. `None` once every sender is gone.
    fn recv(&self) -> Option<WorkoutEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<WorkoutEvent>,
    rx: Receiver<WorkoutEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let input_tx = tx.clone();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) => input_tx.send(WorkoutEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => input_tx.send(WorkoutEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { tx, rx }
    }

    /// Handle background workers use to post their results into the loop.
    pub fn notifier(&self) -> Sender<WorkoutEvent> {
        self.tx.clone()
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkoutEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<WorkoutEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn recv(&self) -> Option<WorkoutEvent> {
        self.rx.recv().ok()
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms.max(1)))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<WorkoutEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<WorkoutEvent>) -> Self {
        Self { rx }
    }
}

impl WorkoutEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<WorkoutEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn recv(&self) -> Option<WorkoutEvent> {
        self.rx.recv().ok()
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: WorkoutEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Cell<Option<Instant>>,
}

impl<E: WorkoutEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
            next_tick: Cell::new(None),
        }
    }

    pub fn event_source(&self) -> &E {
        &self.event_source
    }

    /// While `ticking`, waits for an event until the next tick deadline and yields
    /// Tick once it has passed, so ticks keep their cadence under steady input.
    /// Otherwise waits for a real event; no Tick is ever produced.
    /// `None` means the event source has shut down.
    pub fn step(&self, ticking: bool) -> Option<WorkoutEvent> {
        if !ticking {
            self.next_tick.set(None);
            return self.event_source.recv();
        }

        let interval = self.ticker.interval();
        let now = Instant::now();
        let deadline = self.next_tick.get().unwrap_or(now + interval);
        self.next_tick.set(Some(deadline));

        if now >= deadline {
            self.schedule_after(deadline, interval);
            return Some(WorkoutEvent::Tick);
        }
        match self.event_source.recv_timeout(deadline - now) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) => {
                self.schedule_after(deadline, interval);
                Some(WorkoutEvent::Tick)
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    // Skips missed deadlines instead of replaying them as a burst of ticks.
    fn schedule_after(&self, deadline: Instant, interval: Duration) {
        let now = Instant::now();
        let mut next = deadline + interval;
        if next <= now {
            next = now + interval;
        }
        self.next_tick.set(Some(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::mpsc;

    #[test]
    fn step_returns_tick_on_timeout_while_ticking() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        assert_matches!(runner.step(true), Some(WorkoutEvent::Tick));
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(WorkoutEvent::Resize).unwrap();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(10));
        let runner = Runner::new(es, ticker);

        assert_matches!(runner.step(true), Some(WorkoutEvent::Resize));
    }

    #[test]
    fn idle_step_waits_for_a_real_event() {
        let (tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::from_millis(1));
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(WorkoutEvent::SaveFinished(Err("offline".into())))
                .unwrap();
        });

        assert_matches!(
            runner.step(false),
            Some(WorkoutEvent::SaveFinished(Err(msg))) if msg == "offline"
        );
        sender.join().unwrap();
    }

    #[test]
    fn steady_input_does_not_starve_ticks() {
        let (tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::from_millis(50));
        let typist = std::thread::spawn(move || {
            for _ in 0..40 {
                if tx.send(WorkoutEvent::Resize).is_err() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
        });

        let mut keys = 0;
        let mut ticks = 0;
        while let Some(event) = runner.step(true) {
            match event {
                WorkoutEvent::Tick => ticks += 1,
                _ => keys += 1,
            }
        }
        typist.join().unwrap();

        assert_eq!(keys, 40);
        assert!(ticks >= 5, "only {ticks} ticks during ~1s of input");
    }

    #[test]
    fn tick_is_due_right_after_an_event_past_the_deadline() {
        let (tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::from_millis(20));

        assert_matches!(runner.step(true), Some(WorkoutEvent::Tick));
        std::thread::sleep(Duration::from_millis(30));
        tx.send(WorkoutEvent::Resize).unwrap();
        assert_matches!(runner.step(true), Some(WorkoutEvent::Tick));
        assert_matches!(runner.step(true), Some(WorkoutEvent::Resize));
    }

    #[test]
    fn closed_source_ends_the_loop() {
        let (tx, rx) = mpsc::channel::<WorkoutEvent>();
        drop(tx);
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::from_millis(1));
        assert!(runner.step(true).is_none());
        assert!(runner.step(false).is_none());
    }
}
