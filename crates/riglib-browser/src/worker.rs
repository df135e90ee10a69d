use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use riglib_db::{CancelToken, RigMap};

use crate::filter::SearchFilter;

/// Visible names produced by one search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub generation: u64,
    pub names: Vec<String>,
}

#[derive(Debug)]
struct RunningSearch {
    generation: u64,
    cancel: CancelToken,
    worker: JoinHandle<()>,
}

/// Runs searches either inline or on a worker thread, keeping at most one
/// worker alive. Every request bumps the generation; results from older
/// generations are dropped on arrival.
#[derive(Debug)]
pub struct SearchDispatcher {
    generation: u64,
    sender: Sender<SearchResult>,
    results: Receiver<SearchResult>,
    running: Option<RunningSearch>,
}

impl Default for SearchDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchDispatcher {
    pub fn new() -> Self {
        let (sender, results) = crossbeam_channel::unbounded();
        Self {
            generation: 0,
            sender,
            results,
            running: None,
        }
    }

    /// Generation of the most recent request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.worker.is_finished())
    }

    /// Cancels the running worker, if any, and waits for it to exit.
    pub fn cancel(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if running.worker.join().is_err() {
                log::error!("search worker {} panicked", running.generation);
            }
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;
        self.generation
    }

    /// Filters on the calling thread. Used at startup so the first frame is
    /// already filtered.
    pub fn run_sync(&mut self, records: &RigMap, filter: &SearchFilter) -> SearchResult {
        let generation = self.next_generation();
        let names = filter
            .run(records, &CancelToken::new())
            .unwrap_or_default();
        SearchResult { generation, names }
    }

    /// Starts a worker over a snapshot of the records and returns its
    /// generation.
    pub fn spawn(&mut self, records: Arc<RigMap>, filter: SearchFilter) -> io::Result<u64> {
        let generation = self.next_generation();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let sender = self.sender.clone();
        let worker = thread::Builder::new()
            .name(format!("riglib-search-{generation}"))
            .spawn(move || {
                if let Some(names) = filter.run(&records, &token) {
                    let _ = sender.send(SearchResult { generation, names });
                }
            })?;
        self.running = Some(RunningSearch {
            generation,
            cancel,
            worker,
        });
        Ok(generation)
    }

    /// Latest-generation result if one has arrived, without blocking.
    pub fn poll(&mut self) -> Option<SearchResult> {
        let mut latest = None;
        for result in self.results.try_iter() {
            if result.generation == self.generation {
                latest = Some(result);
            } else {
                log::trace!("discarding stale search result {}", result.generation);
            }
        }
        if latest.is_some() {
            self.reap();
        }
        latest
    }

    /// Blocks until the current worker is done and returns its result.
    pub fn wait(&mut self) -> Option<SearchResult> {
        if let Some(running) = self.running.take() {
            if running.worker.join().is_err() {
                log::error!("search worker {} panicked", running.generation);
            }
        }
        self.poll()
    }

    fn reap(&mut self) {
        if self
            .running
            .as_ref()
            .is_some_and(|running| running.worker.is_finished())
        {
            self.running = None;
        }
    }
}

impl Drop for SearchDispatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}
