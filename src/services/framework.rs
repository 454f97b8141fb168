//! Background-service framework
//!
//! - `Service` trait for long-running maintenance tasks
//! - `ServiceManager` for coordinating lifecycle and graceful shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// ============================================================================
// Service Trait
// ============================================================================

/// Trait for implementing background services
///
/// Services are long-running background tasks performing periodic
/// maintenance. `start` runs the main loop and must respect the shutdown
/// signal for graceful termination.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Run the service main loop until shutdown is signalled
    async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError>;

    /// Service name for logging and identification
    fn name(&self) -> &'static str;

    /// Current status of the service
    fn status(&self) -> ServiceStatus;
}

// ============================================================================
// Service Status
// ============================================================================

/// Status of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Service is initializing
    Starting,

    /// Service is running normally
    Running,

    /// Service has stopped
    Stopped,

    /// Service failed with an error
    Failed(String),
}

impl ServiceStatus {
    /// Check if the service is in a healthy state
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }

    /// Check if the service has stopped (normally or due to failure)
    pub fn is_stopped(&self) -> bool {
        matches!(self, ServiceStatus::Stopped | ServiceStatus::Failed(_))
    }
}

// ============================================================================
// Service Error
// ============================================================================

/// Errors that can occur in services
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Service encountered an error during execution
    #[error("Service runtime error: {0}")]
    RuntimeError(String),

    /// Attempted to register or start a service that is already running
    #[error("Service already running")]
    AlreadyRunning,

    /// The requested service was not found in the registry
    #[error("Service not found: {0}")]
    NotFound(String),
}

// ============================================================================
// Service Manager
// ============================================================================

/// Handle for a running service
struct ServiceHandle {
    service: Arc<dyn Service>,
    task: Option<JoinHandle<Result<(), ServiceError>>>,
}

/// Manager for coordinating background services
///
/// Handles starting registered services, broadcasting the shutdown signal
/// and awaiting each service task within the shutdown timeout.
pub struct ServiceManager {
    shutdown_timeout: Duration,
    services: RwLock<HashMap<&'static str, ServiceHandle>>,
    shutdown_tx: broadcast::Sender<()>,
    running: RwLock<bool>,
}

impl ServiceManager {
    /// Create a new service manager
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_timeout,
            services: RwLock::new(HashMap::new()),
            shutdown_tx,
            running: RwLock::new(false),
        }
    }

    /// Create with the default 30s shutdown timeout
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(30))
    }

    /// Register a service with the manager
    pub fn register(&self, service: Arc<dyn Service>) -> Result<(), ServiceError> {
        let name = service.name();
        let mut services = self.services.write();

        if services.contains_key(name) {
            return Err(ServiceError::AlreadyRunning);
        }
        services.insert(
            name,
            ServiceHandle {
                service,
                task: None,
            },
        );

        tracing::debug!(service = name, "Service registered");
        Ok(())
    }

    /// Start all registered services
    pub fn start_all(&self) -> Result<(), ServiceError> {
        {
            let mut running = self.running.write();
            if *running {
                return Err(ServiceError::AlreadyRunning);
            }
            *running = true;
        }

        let mut services = self.services.write();
        for (name, handle) in services.iter_mut() {
            let service = handle.service.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            handle.task = Some(tokio::spawn(async move { service.start(shutdown_rx).await }));
            tracing::debug!(service = name, "Service started");
        }
        Ok(())
    }

    /// Stop all services gracefully
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        tracing::info!("Initiating graceful shutdown");

        let _ = self.shutdown_tx.send(());

        // Collect tasks to await (release lock before awaiting)
        let tasks: Vec<(&'static str, JoinHandle<Result<(), ServiceError>>)> = {
            let mut services = self.services.write();
            services
                .iter_mut()
                .filter_map(|(name, handle)| handle.task.take().map(|task| (*name, task)))
                .collect()
        };

        let deadline = Instant::now() + self.shutdown_timeout;
        for (name, task) in tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, task).await {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!(service = name, "Service stopped gracefully");
                },
                Ok(Ok(Err(e))) => {
                    tracing::warn!(service = name, error = %e, "Service stopped with error");
                },
                Ok(Err(e)) => {
                    tracing::error!(service = name, error = %e, "Service task panicked");
                },
                Err(_) => {
                    tracing::warn!(service = name, "Service shutdown timed out, aborting");
                },
            }
        }

        *self.running.write() = false;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Get the status of all services
    pub fn status(&self) -> HashMap<&'static str, ServiceStatus> {
        let services = self.services.read();
        services
            .iter()
            .map(|(name, handle)| (*name, handle.service.status()))
            .collect()
    }

    /// Get the status of a specific service
    pub fn service_status(&self, name: &str) -> Option<ServiceStatus> {
        self.services.read().get(name).map(|h| h.service.status())
    }

    /// Check if all services are healthy
    pub fn is_healthy(&self) -> bool {
        let services = self.services.read();
        services.values().all(|h| h.service.status().is_healthy())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TestService {
        name: &'static str,
        status: RwLock<ServiceStatus>,
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl TestService {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                status: RwLock::new(ServiceStatus::Stopped),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl Service for TestService {
        async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            *self.status.write() = ServiceStatus::Running;
            self.started.store(true, Ordering::SeqCst);

            let _ = shutdown.recv().await;

            *self.status.write() = ServiceStatus::Stopped;
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn status(&self) -> ServiceStatus {
            self.status.read().clone()
        }
    }

    #[tokio::test]
    async fn test_service_manager_lifecycle() {
        let manager = ServiceManager::with_defaults();

        let service = Arc::new(TestService::new("test"));
        manager.register(service.clone()).unwrap();

        manager.start_all().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(service.started.load(Ordering::SeqCst));
        assert!(matches!(service.status(), ServiceStatus::Running));
        assert!(manager.is_healthy());

        manager.shutdown().await.unwrap();
        assert!(service.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_service_status() {
        assert!(ServiceStatus::Running.is_healthy());
        assert!(!ServiceStatus::Starting.is_healthy());
        assert!(!ServiceStatus::Stopped.is_healthy());

        assert!(ServiceStatus::Stopped.is_stopped());
        assert!(ServiceStatus::Failed("error".to_string()).is_stopped());
        assert!(!ServiceStatus::Running.is_stopped());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let manager = ServiceManager::with_defaults();

        let service = Arc::new(TestService::new("test"));
        manager.register(service.clone()).unwrap();

        let result = manager.register(service);
        assert!(matches!(result, Err(ServiceError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_service_status_lookup() {
        let manager = ServiceManager::with_defaults();
        manager.register(Arc::new(TestService::new("a"))).unwrap();
        manager.register(Arc::new(TestService::new("b"))).unwrap();

        assert_eq!(manager.status().len(), 2);
        assert!(manager.service_status("a").is_some());
        assert!(manager.service_status("missing").is_none());
    }
}
