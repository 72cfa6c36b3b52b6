use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tokio::runtime::Handle;

#[derive(Debug, Clone)]
pub struct JobProgress {
    pub message: String,
    pub percent: u8,
}

#[derive(Debug)]
pub enum JobEvent<T> {
    Progress(JobProgress),
    Finished(T),
    /// The job panicked; carries the panic message.
    Failed(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "background job panicked".to_string())
}

/// Cloneable progress callback handed to a running job.
pub struct ProgressSender<T> {
    tx: Sender<JobEvent<T>>,
}

impl<T> Clone for ProgressSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> ProgressSender<T> {
    pub fn report(&self, message: &str, percent: u8) {
        let _ = self.tx.send(JobEvent::Progress(JobProgress { message: message.to_string(), percent }));
    }

    /// Adapter for the `FnMut(&str, u8)` callbacks the core operations take.
    pub fn callback(&self) -> impl FnMut(&str, u8) + '_ {
        move |message, percent| self.report(message, percent)
    }
}

pub struct JobHandle<T> {
    pub join: JoinHandle<()>,
    pub rx: Receiver<JobEvent<T>>,
}

/// Runs async core operations off the UI thread. Jobs execute on their own OS thread but
/// drive their futures on the application's runtime, so tasks they spawn (such as the
/// deferred settings save) outlive the job.
#[derive(Clone)]
pub struct JobRunner {
    runtime: Handle,
}

impl JobRunner {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    pub fn spawn<T, F, Fut>(&self, op: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(ProgressSender<T>) -> Fut + Send + 'static,
        Fut: Future<Output = T>,
    {
        let (tx, rx): (Sender<JobEvent<T>>, Receiver<JobEvent<T>>) = mpsc::channel();
        let runtime = self.runtime.clone();
        let join = thread::spawn(move || {
            let progress = ProgressSender { tx: tx.clone() };
            let event = match panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(op(progress)))) {
                Ok(result) => JobEvent::Finished(result),
                Err(payload) => JobEvent::Failed(panic_message(payload.as_ref())),
            };
            let _ = tx.send(event);
        });
        JobHandle { join, rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn progress_arrives_before_the_result() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let runner = JobRunner::new(rt.handle().clone());
        let handle = runner.spawn(|progress| async move {
            let mut report = progress.callback();
            report("Downloading", 10);
            tokio::time::sleep(Duration::from_millis(5)).await;
            report("Extracting", 90);
            42u32
        });

        let events: Vec<JobEvent<u32>> = handle.rx.iter().collect();
        handle.join.join().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], JobEvent::Progress(p) if p.message == "Downloading" && p.percent == 10));
        assert!(matches!(&events[1], JobEvent::Progress(p) if p.percent == 90));
        assert!(matches!(events[2], JobEvent::Finished(42)));
    }

    #[test]
    fn panicking_job_still_reports_completion() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let runner = JobRunner::new(rt.handle().clone());
        let handle = runner.spawn(|progress| async move {
            progress.report("Starting", 0);
            let sizes: Vec<u32> = Vec::new();
            sizes[0]
        });

        let events: Vec<JobEvent<u32>> = handle.rx.iter().collect();
        handle.join.join().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], JobEvent::Failed(msg) if msg.contains("index out of bounds")));
    }
}
