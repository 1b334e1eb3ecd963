use std::sync::Arc;

use log::{debug, warn};
use reqwest::header::{ACCEPT, CONNECTION};
use reqwest::{Request, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::gate::{CapacityGate, GatePermit, DEFAULT_CONCURRENCY};
use super::transport::RetryingTransport;
use crate::auth::Credentials;
use crate::error::{Result, TcLensError};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Result of one request: the response body, or `None` when the server
/// answered 404.
pub type Outcome = Result<Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Maximum number of calls in flight. Zero selects the default.
    pub concurrency: usize,
    /// Submitted requests waiting for a worker before `submit` blocks.
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// One outbound call and the one-shot conduit its outcome goes to.
struct RequestUnit {
    url: Url,
    result_tx: oneshot::Sender<Outcome>,
}

/// Receiving end of a submitted request.
#[derive(Debug)]
pub struct ResultHandle {
    rx: oneshot::Receiver<Outcome>,
}

impl ResultHandle {
    pub async fn wait(self) -> Outcome {
        self.rx.await.map_err(|_| TcLensError::DispatcherClosed)?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    /// First attempt, sent without credentials.
    Unauthenticated,
    /// The server answered 401 and the request was resent with credentials.
    Authenticated,
}

/// Bounded worker pool multiplexing every HTTP call of one client.
///
/// A dispatch loop pulls units off the queue, waits for a gate slot and hands
/// the unit to a spawned worker, which delivers exactly one outcome. Must be
/// created inside a tokio runtime.
pub struct RequestDispatcher {
    queue: mpsc::Sender<RequestUnit>,
    gate: CapacityGate,
    shutdown: CancellationToken,
}

impl RequestDispatcher {
    pub fn spawn(
        transport: RetryingTransport,
        credentials: Credentials,
        settings: &DispatchSettings,
    ) -> Self {
        if settings.concurrency == 0 {
            warn!("No concurrency limit configured, using default of {DEFAULT_CONCURRENCY}");
        }
        let gate = CapacityGate::new(settings.concurrency);
        let (queue, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let shutdown = CancellationToken::new();

        let worker = Arc::new(Worker {
            transport,
            credentials,
        });
        tokio::spawn(dispatch_loop(rx, gate.clone(), worker, shutdown.clone()));

        debug!(
            "Request dispatcher started with {} concurrent slots",
            gate.ceiling()
        );

        Self {
            queue,
            gate,
            shutdown,
        }
    }

    /// Queues a GET request. Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `DispatcherClosed` if the dispatcher has shut down.
    pub async fn submit(&self, url: Url) -> Result<ResultHandle> {
        let (result_tx, rx) = oneshot::channel();
        self.queue
            .send(RequestUnit { url, result_tx })
            .await
            .map_err(|_| TcLensError::DispatcherClosed)?;
        Ok(ResultHandle { rx })
    }

    pub async fn fetch(&self, url: Url) -> Outcome {
        self.submit(url).await?.wait().await
    }

    pub fn gate(&self) -> &CapacityGate {
        &self.gate
    }

    /// Stops the dispatch loop. Queued and in-flight units resolve to
    /// `Cancelled`.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for RequestDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

async fn dispatch_loop(
    mut queue: mpsc::Receiver<RequestUnit>,
    gate: CapacityGate,
    worker: Arc<Worker>,
    shutdown: CancellationToken,
) {
    loop {
        let unit = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            unit = queue.recv() => match unit {
                Some(unit) => unit,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                let _ = unit.result_tx.send(Err(TcLensError::Cancelled));
                break;
            }
            permit = gate.acquire() => permit,
        };

        let permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                let _ = unit.result_tx.send(Err(e));
                break;
            }
        };

        debug!(
            "Dispatching {} ({}/{} slots in use)",
            unit.url,
            gate.in_flight(),
            gate.ceiling()
        );

        let worker = Arc::clone(&worker);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(unit, permit, shutdown).await });
    }

    queue.close();
    while let Ok(unit) = queue.try_recv() {
        let _ = unit.result_tx.send(Err(TcLensError::Cancelled));
    }
    gate.close();
    debug!("Request dispatcher stopped");
}

struct Worker {
    transport: RetryingTransport,
    credentials: Credentials,
}

impl Worker {
    async fn run(&self, unit: RequestUnit, _permit: GatePermit, shutdown: CancellationToken) {
        let RequestUnit { url, mut result_tx } = unit;

        let outcome = tokio::select! {
            biased;
            () = shutdown.cancelled() => Err(TcLensError::Cancelled),
            () = result_tx.closed() => {
                debug!("Request to {url} abandoned by caller");
                return;
            }
            outcome = self.execute(&url) => outcome,
        };

        if result_tx.send(outcome).is_err() {
            debug!("Outcome for {url} dropped, caller went away");
        }
    }

    async fn execute(&self, url: &Url) -> Outcome {
        let mut state = AuthState::Unauthenticated;
        loop {
            let request = self.build_request(url, state)?;
            let response = self.transport.execute(request).await?;
            let status = response.status();

            match (status, state) {
                (status, _) if status.is_success() => return Ok(Some(response.text().await?)),
                (StatusCode::NOT_FOUND, _) => {
                    debug!("{url} not found");
                    return Ok(None);
                }
                (StatusCode::UNAUTHORIZED, AuthState::Unauthenticated)
                    if !self.credentials.is_anonymous() =>
                {
                    debug!("{url} requires authentication, resending with credentials");
                    state = AuthState::Authenticated;
                }
                (StatusCode::UNAUTHORIZED, _) => {
                    return Err(TcLensError::Unauthorized {
                        url: url.to_string(),
                    })
                }
                _ => {
                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unable to read error response".to_string());
                    return Err(TcLensError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
            }
        }
    }

    fn build_request(&self, url: &Url, state: AuthState) -> Result<Request> {
        let request = self
            .transport
            .client()
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .header(CONNECTION, "close");

        let request = match state {
            AuthState::Unauthenticated => request,
            AuthState::Authenticated => self.credentials.apply(request),
        };

        Ok(request.build()?)
    }
}
