use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::debug;

use super::GitHubError;

/// Cancellation signal shared by the pool coordinator and the fetcher.
#[derive(Clone)]
pub struct Interrupt {
    receiver: watch::Receiver<bool>,
}

impl Interrupt {
    /// An interrupt paired with the sender that triggers it.
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self { receiver })
    }

    /// Never fires.
    pub fn never() -> Self {
        Self::new().1
    }

    /// Fires on Ctrl-C. Must be called from inside the runtime.
    pub fn on_ctrl_c() -> Self {
        let (sender, interrupt) = Self::new();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = sender.send(true);
            }
        });
        interrupt
    }

    /// Resolves once the interrupt fires; pends forever if it never can.
    pub async fn triggered(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Drives `future` to completion unless the interrupt fires first.
    pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, GitHubError> {
        tokio::select! {
            biased;
            _ = self.triggered() => Err(GitHubError::Interrupted),
            output = future => Ok(output),
        }
    }
}

/// Completed-job counter with an optional progress bar of dots on stdout.
///
/// The bar is rebuilt for every pool run; the counter spans all of them.
pub struct Progress {
    completed: AtomicUsize,
    visible: bool,
    bar: Mutex<ProgressBar>,
}

impl Progress {
    pub fn dots() -> Self {
        Self {
            completed: AtomicUsize::new(0),
            visible: true,
            bar: Mutex::new(ProgressBar::hidden()),
        }
    }

    pub fn hidden() -> Self {
        Self {
            completed: AtomicUsize::new(0),
            visible: false,
            bar: Mutex::new(ProgressBar::hidden()),
        }
    }

    fn bar(&self) -> ProgressBar {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Starts a fresh bar sized for `jobs`.
    pub fn start(&self, jobs: usize) {
        let target = if self.visible {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(jobs as u64), target);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.green} {pos}/{len}")
                .map(|style| style.progress_chars(". "))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = bar;
    }

    pub fn tick(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.bar().inc(1);
    }

    /// Leaves the finished bar on screen.
    pub fn finish(&self) {
        self.bar().finish();
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Bounded pool of tokio tasks draining a shared FIFO of jobs.
///
/// Results come back in job order no matter which worker finishes first:
/// every job carries its index and lands in a pre-sized slot. The first
/// failing job aborts all other workers, and so does the interrupt.
#[derive(Clone)]
pub struct WorkerPool {
    workers: usize,
    interrupt: Interrupt,
    progress: Arc<Progress>,
}

impl WorkerPool {
    pub fn new(workers: usize, interrupt: Interrupt, progress: Arc<Progress>) -> Self {
        Self {
            workers: workers.max(1),
            interrupt,
            progress,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub async fn run<J, R, F, Fut>(&self, jobs: Vec<J>, work: F) -> Result<Vec<R>, GitHubError>
    where
        J: Send + 'static,
        R: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, GitHubError>> + Send + 'static,
    {
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        self.progress.start(total);

        let queue: Arc<Mutex<VecDeque<(usize, J)>>> =
            Arc::new(Mutex::new(jobs.into_iter().enumerate().collect()));
        let work = Arc::new(work);

        // Dropping the set on any early return aborts the remaining workers.
        let mut join_set = JoinSet::new();
        for _ in 0..self.workers.min(total) {
            let queue = Arc::clone(&queue);
            let work = Arc::clone(&work);
            let progress = Arc::clone(&self.progress);

            join_set.spawn(async move {
                let mut finished = Vec::new();
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, job)) = next else {
                        break;
                    };
                    let result = work(job).await?;
                    progress.tick();
                    finished.push((index, result));
                }
                Ok::<_, GitHubError>(finished)
            });
        }
        debug!(jobs = total, workers = join_set.len(), "worker pool started");

        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        loop {
            tokio::select! {
                biased;
                _ = self.interrupt.triggered() => return Err(GitHubError::Interrupted),
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(joined) => {
                        for (index, result) in joined?? {
                            slots[index] = Some(result);
                        }
                    }
                },
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
