//! Shared helpers for refill cache integration tests

use parking_lot::Mutex;
use refillcache::{Arg, Producer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// One scripted producer response
pub enum Step {
    /// Return these values right away
    Values(Vec<i64>),
    /// Block until the paired `Sender` fires, then return these values
    Gated(Receiver<()>, Vec<i64>),
    /// Fail with an error
    Fail,
    /// Return an empty batch
    Empty,
    /// Panic inside the producer
    Panic,
}

/// Producer that replays a script and counts its invocations
pub struct ScriptedProducer {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProducer {
    pub fn new(name: &str, steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let producer = Self {
            name: name.to_string(),
            steps: Mutex::new(steps.into()),
            calls: Arc::clone(&calls),
        };
        (producer, calls)
    }
}

impl Producer for ScriptedProducer {
    type Value = i64;

    fn name(&self) -> &str {
        &self.name
    }

    fn produce(&self, _args: &[Arg]) -> anyhow::Result<Vec<i64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();

        match step {
            Some(Step::Values(values)) => Ok(values),
            Some(Step::Gated(gate, values)) => {
                gate.recv()?;
                Ok(values)
            }
            Some(Step::Fail) => anyhow::bail!("scripted failure"),
            Some(Step::Empty) => Ok(Vec::new()),
            Some(Step::Panic) => panic!("scripted panic"),
            None => anyhow::bail!("script exhausted"),
        }
    }
}

/// A closed gate and the handle that opens it
pub fn gate() -> (Sender<()>, Receiver<()>) {
    mpsc::channel()
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
