//! Background layout queue.
//!
//! Layout is CPU bound and synchronous, so callers that must stay responsive
//! hand graphs to a [`LayoutWorker`]. The worker owns one thread and one FIFO
//! channel: jobs run strictly in submission order, one at a time, and a job
//! cannot be cancelled once queued.

use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::graph::Graph;
use crate::layout::layout_graph;
use futures::FutureExt;
use futures::channel::oneshot;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::mpsc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct LayoutWorker {
    sender: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    config: LayoutConfig,
}

/// Resolves with the result of one queued job.
#[must_use = "a ticket does nothing unless awaited or waited on"]
pub struct Ticket<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

pub type LayoutTicket<N, E> = Ticket<Graph<N, E>>;

impl LayoutWorker {
    pub fn spawn(config: LayoutConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("layout-worker".to_string())
            .spawn(move || {
                debug!("layout worker started");
                while let Ok(job) = receiver.recv() {
                    // A panicking job drops its reply sender; its ticket then
                    // reports the worker as unavailable while the queue keeps going.
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!("layout job panicked");
                    }
                }
                debug!("layout worker stopped");
            })
            .map_err(|err| LayoutError::WorkerUnavailable(err.to_string()))?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            config,
        })
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.sender.is_some() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Queues a layout of `graph` with the worker's configuration.
    pub fn submit<N, E>(&self, graph: Graph<N, E>) -> LayoutTicket<N, E>
    where
        N: Send + 'static,
        E: Send + 'static,
    {
        self.submit_with_config(graph, self.config.clone())
    }

    pub fn submit_with_config<N, E>(&self, graph: Graph<N, E>, config: LayoutConfig) -> LayoutTicket<N, E>
    where
        N: Send + 'static,
        E: Send + 'static,
    {
        self.submit_task(move || layout_graph(graph, &config))
    }

    /// Queues an arbitrary task behind the jobs already submitted.
    pub fn submit_task<T, F>(&self, task: F) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = reply.send(task());
        });
        match &self.sender {
            Some(sender) => {
                if sender.send(job).is_err() {
                    warn!("layout worker queue is closed");
                }
            }
            None => warn!("layout worker has been shut down"),
        }
        Ticket { receiver }
    }

    /// Closes the queue and waits for every already queued job to finish.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("layout worker thread panicked");
        }
    }
}

impl Drop for LayoutWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T> Ticket<T> {
    /// Blocks the current thread until the job completes.
    pub fn wait(self) -> Result<T> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for Ticket<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver.poll_unpin(cx).map(|outcome| match outcome {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(LayoutError::WorkerUnavailable(
                "job was dropped before completing".to_string(),
            )),
        })
    }
}

static GLOBAL_WORKER: OnceCell<LayoutWorker> = OnceCell::new();

/// Process-wide worker with the default configuration, started on first use
/// and kept for the lifetime of the process.
pub fn global() -> Result<&'static LayoutWorker> {
    GLOBAL_WORKER.get_or_try_init(|| LayoutWorker::spawn(LayoutConfig::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn tasks_complete_in_submission_order() {
        let worker = LayoutWorker::spawn(LayoutConfig::default()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tickets = Vec::new();
        for (name, delay) in [("A", 30), ("B", 0), ("C", 10)] {
            let log = Arc::clone(&log);
            tickets.push(worker.submit_task(move || {
                thread::sleep(Duration::from_millis(delay));
                log.lock().unwrap().push(name);
                Ok(name)
            }));
        }
        let results: Vec<&str> = tickets.into_iter().rev().map(|t| t.wait().unwrap()).collect();
        assert_eq!(results, ["C", "B", "A"]);
        assert_eq!(*log.lock().unwrap(), ["A", "B", "C"]);
    }

    #[test]
    fn layout_jobs_return_their_own_graph() {
        let worker = LayoutWorker::spawn(LayoutConfig::default()).unwrap();
        let tickets: Vec<_> = ["x", "y", "z"]
            .iter()
            .map(|prefix| {
                let mut graph: Graph<(), ()> = Graph::new();
                graph.nodes = vec![Node::new(format!("{prefix}1")), Node::new(format!("{prefix}2"))];
                graph.edges = vec![Edge::new(format!("{prefix}1"), format!("{prefix}2"))];
                worker.submit(graph)
            })
            .collect();
        for (ticket, prefix) in tickets.into_iter().zip(["x", "y", "z"]) {
            let graph = futures::executor::block_on(ticket).unwrap();
            assert_eq!(graph.nodes[0].id, format!("{prefix}1"));
            assert!(graph.nodes[1].y > graph.nodes[0].y);
        }
    }

    #[test]
    fn nested_graph_lays_out_on_the_worker() {
        let worker = LayoutWorker::spawn(LayoutConfig::default()).unwrap();
        let mut graph: Graph<(), ()> = Graph::new();
        graph.nodes = vec![
            Node::new("g").with_children(vec![Node::new("a"), Node::new("b")]),
            Node::new("c"),
        ];
        graph.edges = vec![Edge::new("a", "b"), Edge::new("g", "c")];
        let graph = worker.submit(graph).wait().unwrap();
        let group = &graph.nodes[0];
        assert!(group.width > 0.0 && group.height > 0.0);
        for member in &group.nodes {
            assert!(member.x >= 0.0 && member.x + member.width <= group.width + 1e-3);
        }
    }

    #[test]
    fn malformed_graph_error_reaches_the_caller() {
        let worker = LayoutWorker::spawn(LayoutConfig::default()).unwrap();
        let mut graph: Graph<(), ()> = Graph::new();
        graph.nodes.push(Node::new("a"));
        graph.edges.push(Edge::new("a", "nowhere"));
        let err = worker.submit(graph).wait().unwrap_err();
        assert!(matches!(err, LayoutError::MalformedGraph(_)));
    }

    #[test]
    fn shutdown_drains_queue_and_rejects_new_jobs() {
        let mut worker = LayoutWorker::spawn(LayoutConfig::default()).unwrap();
        let queued = worker.submit_task(|| {
            thread::sleep(Duration::from_millis(10));
            Ok(1)
        });
        worker.shutdown();
        assert!(!worker.is_running());
        assert_eq!(queued.wait(), Ok(1));
        let late = worker.submit_task(|| Ok(2));
        assert!(matches!(late.wait(), Err(LayoutError::WorkerUnavailable(_))));
    }

    #[test]
    fn panicking_task_does_not_stop_the_queue() {
        let worker = LayoutWorker::spawn(LayoutConfig::default()).unwrap();
        let failed = worker.submit_task::<(), _>(|| panic!("boom"));
        let next = worker.submit_task(|| Ok("still running"));
        assert!(matches!(failed.wait(), Err(LayoutError::WorkerUnavailable(_))));
        assert_eq!(next.wait(), Ok("still running"));
    }

    #[test]
    fn global_worker_is_shared() {
        let first = global().unwrap() as *const LayoutWorker;
        let second = global().unwrap() as *const LayoutWorker;
        assert_eq!(first, second);
    }
}
