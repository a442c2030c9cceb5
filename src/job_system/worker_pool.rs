use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use log::debug;

use super::task_queue::{Shared, TaskId};

pub enum WorkerMessage {
    Run(TaskId),
    Shutdown,
}

/// Worker ids start at 1, 0 is the thread owning the queue
fn worker_loop(id: usize, rx: Receiver<WorkerMessage>, tx: Sender<WorkerMessage>, shared: Arc<Shared>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMessage::Run(task) => {
                // successors made ready by this task go back through the channel
                for next in shared.execute(task, id) {
                    if tx.send(WorkerMessage::Run(next)).is_err() {
                        return;
                    }
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }
    debug!("worker {} stopped", id);
}

pub struct WorkerPool {
    workers: Vec<std::thread::JoinHandle<()>>,
    tx: Sender<WorkerMessage>,
}

impl WorkerPool {
    pub(crate) fn init(count: usize, shared: Arc<Shared>) -> Self {
        let (tx, rx) = crossbeam::channel::unbounded::<WorkerMessage>();

        let workers = (1..=count)
            .filter_map(|id| {
                let rx = rx.clone();
                let tx = tx.clone();
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("skinning-worker-{}", id))
                    .spawn(move || worker_loop(id, rx, tx, shared))
                    .map_err(|err| log::error!("could not spawn worker {}: {}", id, err))
                    .ok()
            })
            .collect();

        Self { workers, tx }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn dispatch(&self, task: TaskId) {
        // the receiving side lives as long as the pool
        let _ = self.tx.send(WorkerMessage::Run(task));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.tx.send(WorkerMessage::Shutdown);
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}
