use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::{Duration, Instant};

use crate::detect::oracle::DetectionOracle;
use crate::detect::result::DetectionResult;
use crate::frame::Frame;

type Job = (u64, Frame);
type Reply = (u64, Result<DetectionResult>);

/// Runs a backend on a dedicated thread behind a one-slot queue.
///
/// The caller still sees a synchronous `infer`, but the wait is bounded by
/// `timeout` and a busy worker is refused immediately instead of queued.
/// Both cases surface as errors, so the scheduler falls back to the raw
/// frame for that tick. Late replies are discarded by job id.
pub struct WorkerOracle {
    name: &'static str,
    jobs: SyncSender<Job>,
    replies: Receiver<Reply>,
    timeout: Duration,
    next_job: u64,
    in_flight: Option<u64>,
}

impl WorkerOracle {
    pub fn spawn(mut backend: Box<dyn DetectionOracle>, timeout: Duration) -> Result<Self> {
        let name = backend.name();
        let (jobs, job_rx) = mpsc::sync_channel::<Job>(1);
        let (reply_tx, replies) = mpsc::channel::<Reply>();
        std::thread::Builder::new()
            .name(format!("oracle-{}", name))
            .spawn(move || {
                while let Ok((id, frame)) = job_rx.recv() {
                    let result = backend.infer(&frame);
                    if reply_tx.send((id, result)).is_err() {
                        break;
                    }
                }
                log::debug!("oracle worker {} exiting", name);
            })?;
        Ok(Self {
            name,
            jobs,
            replies,
            timeout,
            next_job: 0,
            in_flight: None,
        })
    }

    fn collect_stale(&mut self) {
        while let Ok((id, _)) = self.replies.try_recv() {
            if self.in_flight == Some(id) {
                self.in_flight = None;
            }
        }
    }
}

impl DetectionOracle for WorkerOracle {
    fn name(&self) -> &'static str {
        self.name
    }

    fn infer(&mut self, frame: &Frame) -> Result<DetectionResult> {
        self.collect_stale();
        if let Some(id) = self.in_flight {
            return Err(anyhow!("oracle worker still busy with job {}", id));
        }

        let id = self.next_job;
        self.next_job += 1;
        match self.jobs.try_send((id, frame.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(anyhow!("oracle worker queue full")),
            Err(TrySendError::Disconnected(_)) => return Err(anyhow!("oracle worker stopped")),
        }
        self.in_flight = Some(id);

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok((reply_id, result)) if reply_id == id => {
                    self.in_flight = None;
                    return result;
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(anyhow!(
                        "inference exceeded {} ms",
                        self.timeout.as_millis()
                    ))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.in_flight = None;
                    return Err(anyhow!("oracle worker stopped"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubOracle;

    struct SlowOracle(Duration);

    impl DetectionOracle for SlowOracle {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn infer(&mut self, frame: &Frame) -> Result<DetectionResult> {
            std::thread::sleep(self.0);
            Ok(DetectionResult::empty(frame.width, frame.height))
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(vec![0u8; 12], 2, 2, 0).unwrap()
    }

    #[test]
    fn forwards_results_from_backend() -> Result<()> {
        let mut worker = WorkerOracle::spawn(Box::new(StubOracle::new()), Duration::from_secs(2))?;
        let result = worker.infer(&frame())?;
        assert_eq!(result.detections.len(), 1);
        assert_eq!(worker.name(), "stub");
        Ok(())
    }

    #[test]
    fn slow_backend_times_out_then_refuses_while_busy() -> Result<()> {
        let mut worker = WorkerOracle::spawn(
            Box::new(SlowOracle(Duration::from_millis(300))),
            Duration::from_millis(20),
        )?;
        assert!(worker.infer(&frame()).is_err());
        assert!(worker.infer(&frame()).is_err());

        std::thread::sleep(Duration::from_millis(400));
        worker.timeout = Duration::from_secs(2);
        assert!(worker.infer(&frame()).is_ok());
        Ok(())
    }
}
