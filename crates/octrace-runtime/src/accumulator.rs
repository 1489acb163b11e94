use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorConfig {
    /// Flush as soon as this many distinct paths are pending
    pub max_items: usize,
    /// Flush when the oldest pending path has waited this long
    pub window: Duration,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            window: Duration::from_millis(200),
        }
    }
}

type FlushFn = dyn Fn(Vec<PathBuf>) + Send + Sync;

#[derive(Default)]
struct Pending {
    items: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    oldest: Option<Instant>,
    /// Buffer only; nothing is dispatched until `release`.
    held: bool,
    stopped: bool,
}

impl Pending {
    fn drain(&mut self) -> Vec<PathBuf> {
        self.seen.clear();
        self.oldest = None;
        std::mem::take(&mut self.items)
    }
}

struct Shared {
    config: AccumulatorConfig,
    // Pending set and timer deadline live under this one lock
    pending: Mutex<Pending>,
    wake: Condvar,
    on_flush: Arc<FlushFn>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Pending>> {
        self.pending
            .lock()
            .map_err(|_| Error::Poisoned("accumulator"))
    }

    /// Run the flush callback on a short-lived worker.
    fn dispatch(&self, batch: Vec<PathBuf>) {
        if batch.is_empty() {
            return;
        }

        let on_flush = Arc::clone(&self.on_flush);
        let (tx, rx) = std::sync::mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("batch-flush".to_string())
            .spawn(move || {
                if let Ok(batch) = rx.recv() {
                    on_flush(batch);
                }
            });

        match spawned {
            Ok(handle) => {
                let _ = tx.send(batch);
                if let Ok(mut workers) = self.workers.lock() {
                    workers.retain(|h| !h.is_finished());
                    workers.push(handle);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "flush worker spawn failed, flushing inline");
                (self.on_flush)(batch);
            }
        }
    }

    fn run_timer(&self) {
        let Ok(mut pending) = self.lock() else {
            return;
        };

        loop {
            if pending.stopped {
                return;
            }

            if pending.held {
                pending = match self.wake.wait(pending) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                continue;
            }

            let Some(oldest) = pending.oldest else {
                pending = match self.wake.wait(pending) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                continue;
            };

            let deadline = oldest + self.config.window;
            let now = Instant::now();
            if now < deadline {
                pending = match self.wake.wait_timeout(pending, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(_) => return,
                };
                continue;
            }

            let batch = pending.drain();
            drop(pending);
            tracing::trace!(items = batch.len(), "window elapsed, flushing");
            self.dispatch(batch);

            pending = match self.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }

    /// Join every dispatched worker; returns how many there were.
    fn join_workers(&self) -> usize {
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return 0,
        };
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("flush worker panicked");
            }
        }
        count
    }
}

/// Collects changed paths into micro-batches.
///
/// A batch is handed to the flush callback when `max_items` distinct paths are
/// pending or `window` has passed since the oldest one arrived. Producers never
/// wait on the callback: it runs on a separate worker, outside the lock.
///
/// An accumulator started with [`BatchAccumulator::start_held`] only buffers
/// (still deduplicating) until [`BatchAccumulator::release`] is called.
pub struct BatchAccumulator {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl BatchAccumulator {
    pub fn start<F>(config: AccumulatorConfig, on_flush: F) -> Result<Self>
    where
        F: Fn(Vec<PathBuf>) + Send + Sync + 'static,
    {
        Self::spawn(config, false, on_flush)
    }

    /// Start in buffering mode; no flush runs until `release`.
    pub fn start_held<F>(config: AccumulatorConfig, on_flush: F) -> Result<Self>
    where
        F: Fn(Vec<PathBuf>) + Send + Sync + 'static,
    {
        Self::spawn(config, true, on_flush)
    }

    fn spawn<F>(config: AccumulatorConfig, held: bool, on_flush: F) -> Result<Self>
    where
        F: Fn(Vec<PathBuf>) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            config,
            pending: Mutex::new(Pending {
                held,
                ..Pending::default()
            }),
            wake: Condvar::new(),
            on_flush: Arc::new(on_flush),
            workers: Mutex::new(Vec::new()),
        });

        let timer_shared = Arc::clone(&shared);
        let timer = std::thread::Builder::new()
            .name("batch-timer".to_string())
            .spawn(move || timer_shared.run_timer())?;

        Ok(Self {
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Queue one path. Returns false if it was already pending or the
    /// accumulator has stopped.
    pub fn add(&self, path: PathBuf) -> Result<bool> {
        let full = {
            let mut pending = self.shared.lock()?;
            if pending.stopped {
                tracing::debug!(path = %path.display(), "accumulator stopped, dropping path");
                return Ok(false);
            }
            if !pending.seen.insert(path.clone()) {
                return Ok(false);
            }

            pending.items.push(path);
            if pending.oldest.is_none() {
                pending.oldest = Some(Instant::now());
                self.shared.wake.notify_one();
            }

            if !pending.held && pending.items.len() >= self.shared.config.max_items {
                Some(pending.drain())
            } else {
                None
            }
        };

        if let Some(batch) = full {
            self.shared.dispatch(batch);
        }
        Ok(true)
    }

    /// Queue many paths; returns how many were newly queued.
    pub fn add_many<I>(&self, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut added = 0;
        for path in paths {
            if self.add(path)? {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().map(|p| p.items.len()).unwrap_or(0)
    }

    pub fn is_held(&self) -> bool {
        self.shared.lock().map(|p| p.held).unwrap_or(false)
    }

    /// Leave buffering mode. Everything buffered so far goes out as one
    /// batch; returns its size.
    pub fn release(&self) -> Result<usize> {
        let batch = {
            let mut pending = self.shared.lock()?;
            if !pending.held {
                return Ok(0);
            }
            pending.held = false;
            self.shared.wake.notify_all();
            pending.drain()
        };

        let count = batch.len();
        tracing::debug!(buffered = count, "accumulator released");
        self.shared.dispatch(batch);
        Ok(count)
    }

    /// Drain now and run the callback on the calling thread.
    pub fn force_flush(&self) -> Result<usize> {
        let batch = self.shared.lock()?.drain();
        let count = batch.len();
        if count > 0 {
            (self.shared.on_flush)(batch);
        }
        Ok(count)
    }

    /// Flush on the calling thread and wait until every dispatched batch has
    /// finished. Returns how many paths the calling thread flushed.
    pub fn drain(&self) -> Result<usize> {
        let mut flushed = 0;
        loop {
            let now = self.force_flush()?;
            flushed += now;
            // The timer may dispatch while we join; go round until quiet.
            if self.shared.join_workers() == 0 && now == 0 {
                return Ok(flushed);
            }
        }
    }

    /// Stop the timer, flush what is left and wait for in-flight flushes.
    /// Returns the size of the final flush.
    pub fn stop(&self) -> Result<usize> {
        {
            let mut pending = self.shared.lock()?;
            pending.stopped = true;
            self.shared.wake.notify_all();
        }

        let timer = self
            .timer
            .lock()
            .map_err(|_| Error::Poisoned("accumulator timer"))?
            .take();
        if let Some(handle) = timer
            && handle.join().is_err()
        {
            tracing::error!("batch timer panicked");
        }

        let flushed = self.force_flush()?;
        self.shared.join_workers();
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Seen = Arc<Mutex<Vec<Vec<PathBuf>>>>;

    fn collecting(config: AccumulatorConfig) -> (BatchAccumulator, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let acc = BatchAccumulator::start(config, move |batch| {
            sink.lock().unwrap().push(batch);
        })
        .unwrap();
        (acc, seen)
    }

    fn wait_for(seen: &Seen, batches: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if seen.lock().unwrap().len() >= batches {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/s/part/m/{}.json", name))
    }

    #[test]
    fn test_count_trigger_flushes_full_batch() {
        let (acc, seen) = collecting(AccumulatorConfig {
            max_items: 3,
            window: Duration::from_secs(60),
        });

        acc.add_many([p("a"), p("b"), p("c"), p("d")]).unwrap();
        assert!(wait_for(&seen, 1));

        assert_eq!(seen.lock().unwrap()[0], vec![p("a"), p("b"), p("c")]);
        assert_eq!(acc.pending(), 1);
        acc.stop().unwrap();
    }

    #[test]
    fn test_window_trigger_flushes_partial_batch() {
        let (acc, seen) = collecting(AccumulatorConfig {
            max_items: 100,
            window: Duration::from_millis(40),
        });

        let started = Instant::now();
        acc.add(p("a")).unwrap();
        acc.add(p("b")).unwrap();
        assert!(wait_for(&seen, 1));

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(seen.lock().unwrap()[0].len(), 2);
        assert_eq!(acc.pending(), 0);
        acc.stop().unwrap();
    }

    #[test]
    fn test_duplicates_collapse_while_pending() {
        let (acc, seen) = collecting(AccumulatorConfig {
            max_items: 100,
            window: Duration::from_secs(60),
        });

        assert!(acc.add(p("a")).unwrap());
        assert!(!acc.add(p("a")).unwrap());
        assert_eq!(acc.add_many([p("a"), p("b")]).unwrap(), 1);

        assert_eq!(acc.force_flush().unwrap(), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);

        // Flushed paths can be queued again
        assert!(acc.add(p("a")).unwrap());
        acc.stop().unwrap();
    }

    #[test]
    fn test_force_flush_on_empty_is_zero() {
        let (acc, seen) = collecting(AccumulatorConfig::default());
        assert_eq!(acc.force_flush().unwrap(), 0);
        assert!(seen.lock().unwrap().is_empty());
        acc.stop().unwrap();
    }

    #[test]
    fn test_stop_flushes_remaining_and_rejects_new_paths() {
        let (acc, seen) = collecting(AccumulatorConfig {
            max_items: 100,
            window: Duration::from_secs(60),
        });

        acc.add(p("a")).unwrap();
        acc.add(p("b")).unwrap();
        assert_eq!(acc.stop().unwrap(), 2);
        assert_eq!(seen.lock().unwrap().concat(), vec![p("a"), p("b")]);

        assert!(!acc.add(p("c")).unwrap());
        assert_eq!(acc.stop().unwrap(), 0);
    }

    #[test]
    fn test_held_accumulator_buffers_without_dispatching() {
        let (acc, seen) = {
            let seen: Seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let acc = BatchAccumulator::start_held(
                AccumulatorConfig {
                    max_items: 10,
                    window: Duration::from_millis(5),
                },
                move |batch| sink.lock().unwrap().push(batch),
            )
            .unwrap();
            (acc, seen)
        };
        assert!(acc.is_held());

        for round in 0..2 {
            for i in 0..2000 {
                let added = acc.add(p(&i.to_string())).unwrap();
                assert_eq!(added, round == 0);
            }
        }
        std::thread::sleep(Duration::from_millis(50));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(acc.pending(), 2000);
        assert!(acc.shared.workers.lock().unwrap().is_empty());

        assert_eq!(acc.release().unwrap(), 2000);
        assert!(wait_for(&seen, 1));
        assert_eq!(seen.lock().unwrap()[0].len(), 2000);
        assert!(!acc.is_held());

        // Released: the count trigger works again
        acc.add_many((0..10).map(|i| p(&format!("after{}", i)))).unwrap();
        assert!(wait_for(&seen, 2));
        acc.stop().unwrap();
    }

    #[test]
    fn test_drain_waits_for_dispatched_batches() {
        let done = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&done);
        let acc = BatchAccumulator::start(
            AccumulatorConfig {
                max_items: 2,
                window: Duration::from_secs(60),
            },
            move |batch| {
                std::thread::sleep(Duration::from_millis(30));
                *sink.lock().unwrap() += batch.len();
            },
        )
        .unwrap();

        acc.add_many((0..5).map(|i| p(&i.to_string()))).unwrap();
        assert_eq!(acc.drain().unwrap(), 1);
        assert_eq!(*done.lock().unwrap(), 5);
        acc.stop().unwrap();
    }

    #[test]
    fn test_slow_callback_does_not_block_producers() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let gate = Mutex::new(rx);
        let acc = BatchAccumulator::start(
            AccumulatorConfig {
                max_items: 1,
                window: Duration::from_secs(60),
            },
            move |_| {
                // Block until the test releases us
                let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
            },
        )
        .unwrap();

        let started = Instant::now();
        for i in 0..5 {
            acc.add(p(&i.to_string())).unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        for _ in 0..5 {
            let _ = tx.send(());
        }
        acc.stop().unwrap();
    }
}
