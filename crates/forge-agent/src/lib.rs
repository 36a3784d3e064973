//! Agent-side client for the forge dispatch fabric.
//!
//! An [`Agent`] registers under its app id, keeps a health loop beating,
//! long-polls the coordinator for tasks, and runs each one through a
//! user-supplied [`TaskHandler`], reporting the result back.

mod backoff;
mod transport;

pub use backoff::fibonacci_backoff;
pub use forge_protocol::{Task, TaskStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use transport::Transport;

/// Ceiling for the health-check backoff interval in seconds.
pub const MAX_HEALTH_INTERVAL_SECS: u64 = 7_200;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned http status {0}")]
    HttpStatus(u16),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    /// Code-2 envelope: no task within the long poll or a contended
    /// delivery. The poll loop retries through this.
    #[error("retryable: {0}")]
    Retryable(String),
    #[error("server rejected request (code {code}): {message}")]
    Rejected { code: i32, message: String },
    #[error("agent deregistered after repeated health-check failures")]
    Deregistered,
    #[error("background task failed: {0}")]
    Background(String),
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Retryable(_))
    }
}

/// User-supplied task executor. The returned string becomes the task
/// result delivered back to the coordinator's caller.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> String;
}

#[async_trait::async_trait]
impl<F> TaskHandler for F
where
    F: Fn(&Task) -> String + Send + Sync,
{
    async fn handle(&self, task: &Task) -> String {
        self(task)
    }
}

/// Agent configuration, builder style. [`Agent::register`] consumes the
/// builder, performs the signed register call, and spawns the background
/// loops.
pub struct Agent {
    app_id: String,
    secret: String,
    server_addr: String,
    debug: bool,
    skip_tls_verify: bool,
    check_interval_secs: u64,
    task_interval: Duration,
    http_timeout: Duration,
    worker_limit: Option<usize>,
}

impl Agent {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Result<Self, AgentError> {
        let app_id = app_id.into();
        let secret = secret.into();
        if app_id.is_empty() || secret.is_empty() {
            return Err(AgentError::Config(
                "app_id and secret are required".to_string(),
            ));
        }
        Ok(Self {
            app_id,
            secret,
            server_addr: String::new(),
            debug: false,
            skip_tls_verify: false,
            check_interval_secs: 10,
            task_interval: Duration::from_secs(1),
            http_timeout: Duration::from_secs(60),
            worker_limit: None,
        })
    }

    pub fn with_server_addr(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = addr.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Skip TLS certificate verification; for lab setups only.
    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    /// Seed interval for the health loop in seconds.
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        if secs > 0 {
            self.check_interval_secs = secs;
        }
        self
    }

    /// Delay between task polls.
    pub fn with_task_interval(mut self, interval: Duration) -> Self {
        if interval > Duration::ZERO {
            self.task_interval = interval;
        }
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Bound concurrent handler invocations. Unset means one spawned
    /// worker per incoming task with no cap.
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = (limit > 0).then_some(limit);
        self
    }

    /// Register with the coordinator and start the health and poll loops.
    pub async fn register(
        self,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<AgentHandle, AgentError> {
        reqwest::Url::parse(&self.server_addr)
            .map_err(|err| AgentError::Config(format!("server addr invalid: {err}")))?;
        let mut builder = reqwest::Client::builder().timeout(self.http_timeout);
        if self.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;
        let transport = Arc::new(Transport::new(
            http,
            self.app_id.clone(),
            self.secret.clone(),
            self.server_addr.clone(),
            self.debug,
        ));

        transport.register().await?;
        info!(app_id = %self.app_id, server = %self.server_addr, "agent registered");

        let registered = Arc::new(AtomicBool::new(true));
        let limiter = self.worker_limit.map(|n| Arc::new(Semaphore::new(n)));

        let health = tokio::spawn(health_loop(
            transport.clone(),
            registered.clone(),
            self.check_interval_secs,
        ));
        let poll = tokio::spawn(poll_loop(
            transport,
            registered.clone(),
            handler,
            self.task_interval,
            limiter,
        ));

        Ok(AgentHandle {
            registered,
            health,
            poll,
        })
    }
}

/// Running agent: the registered flag shared with both loops plus their
/// join handles.
pub struct AgentHandle {
    registered: Arc<AtomicBool>,
    health: JoinHandle<()>,
    poll: JoinHandle<Result<(), AgentError>>,
}

impl AgentHandle {
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Ask the poll loop to wind down on its next iteration.
    pub fn shutdown(&self) {
        self.registered.store(false, Ordering::SeqCst);
    }

    /// Wait until the poll loop stops. A fatal transport error (anything
    /// but the benign code-2 response) surfaces here; supervisors restart
    /// the process on it.
    pub async fn join(self) -> Result<(), AgentError> {
        let outcome = self.poll.await;
        self.health.abort();
        match outcome {
            Ok(result) => result,
            Err(err) => Err(AgentError::Background(err.to_string())),
        }
    }
}

/// One health-loop transition: a successful ping resets both the error
/// count and the interval to the seed; a failure advances the Fibonacci
/// backoff.
fn health_step(err_cnt: u32, seed_secs: u64, ping_ok: bool) -> (u32, u64) {
    if ping_ok {
        (0, seed_secs)
    } else {
        let next = err_cnt + 1;
        (next, fibonacci_backoff(next, MAX_HEALTH_INTERVAL_SECS))
    }
}

async fn health_loop(transport: Arc<Transport>, registered: Arc<AtomicBool>, seed_secs: u64) {
    let mut err_cnt = 0u32;
    let mut interval_secs = seed_secs;
    loop {
        sleep(Duration::from_secs(interval_secs)).await;
        match transport.ping().await {
            Ok(()) => {
                if err_cnt > 0 {
                    info!("health check recovered");
                }
                (err_cnt, interval_secs) = health_step(err_cnt, seed_secs, true);
            }
            Err(err) => {
                (err_cnt, interval_secs) = health_step(err_cnt, seed_secs, false);
                if err_cnt > 3 {
                    warn!(%err, err_cnt, interval_secs, "health check failing, dropping registered flag");
                    registered.store(false, Ordering::SeqCst);
                } else {
                    debug!(%err, err_cnt, interval_secs, "health check failed");
                }
            }
        }
    }
}

async fn poll_loop(
    transport: Arc<Transport>,
    registered: Arc<AtomicBool>,
    handler: Arc<dyn TaskHandler>,
    task_interval: Duration,
    limiter: Option<Arc<Semaphore>>,
) -> Result<(), AgentError> {
    while registered.load(Ordering::SeqCst) {
        match transport.get_task().await {
            Ok(task) => {
                let permit = match &limiter {
                    Some(sem) => sem.clone().acquire_owned().await.ok(),
                    None => None,
                };
                let transport = transport.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let mut task = task;
                    task.result = handler.handle(&task).await;
                    task.do_status = TaskStatus::Success;
                    match transport.report_task(&task).await {
                        Ok(data) => {
                            debug!(task_id = %task.task_id, ?data, "task reported")
                        }
                        Err(err) => {
                            error!(task_id = %task.task_id, %err, "task report failed")
                        }
                    }
                });
            }
            Err(err) if err.is_retryable() => {
                debug!("no task within long poll");
            }
            Err(err) => {
                error!(%err, "task poll failed, stopping");
                return Err(err);
            }
        }
        sleep(task_interval).await;
    }
    Err(AgentError::Deregistered)
}
