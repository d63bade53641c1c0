//! The registry process: answers register and lookup requests.

use super::service_registry::{RegistrationOutcome, ServiceRegistry};
use crate::config::ServerConfig;
use crate::protocol::{
    decode, LookupRequest, LookupResponse, Message, Payload, RegisterRequest, RegisterResponse,
    TypedMessage,
};
use crate::transport::server::reject;
use crate::transport::{Connection, ConnectionHandler, ServerHandle, ServerTransport};
use crate::{RendezvousError, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discovery service mapping function names to endpoints.
///
/// The mapping is injected, so several registries can coexist in one process.
pub struct RegistryServer {
    config: ServerConfig,
    registry: Arc<ServiceRegistry>,
    handle: Option<ServerHandle>,
}

impl RegistryServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(ServiceRegistry::new()))
    }

    pub fn with_registry(config: ServerConfig, registry: Arc<ServiceRegistry>) -> Self {
        Self {
            config,
            registry,
            handle: None,
        }
    }

    /// Bind and start serving. Failing to bind aborts startup.
    pub async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(RendezvousError::AlreadyStarted);
        }
        info!(
            "Starting registry server on {}:{}",
            self.config.host, self.config.port
        );

        let handler = Arc::new(RegistryHandler {
            registry: self.registry.clone(),
        });
        let handle = ServerTransport::start(&self.config, handler).await?;
        info!("Registry server started on port {}", handle.bound_port());

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop accepting and drop every registration.
    pub async fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            info!("Stopping registry server");
            handle.stop().await;
            self.registry.clear();
            info!("Registry server stopped");
        }
    }

    /// The bound port, once started.
    pub fn port(&self) -> Option<u16> {
        self.handle.as_ref().map(ServerHandle::bound_port)
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }
}

struct RegistryHandler {
    registry: Arc<ServiceRegistry>,
}

#[async_trait::async_trait]
impl ConnectionHandler for RegistryHandler {
    async fn handle(&self, connection: &mut Connection) {
        let frame = match connection.receive_raw().await {
            Ok(frame) => frame,
            Err(e) => {
                error!("Error handling registry connection: {}", e);
                return;
            }
        };

        let result = match decode(&frame) {
            Ok(Message::RegisterRequest(request)) => {
                connection.send(&self.handle_register(request)).await
            }
            Ok(Message::LookupRequest(request)) => {
                connection.send(&self.handle_lookup(request)).await
            }
            Ok(other) => {
                warn!("Received unexpected message type: {}", other.kind());
                reject(connection, &frame, "Unknown message type").await
            }
            Err(e @ RendezvousError::UnknownMessageType(_))
            | Err(e @ RendezvousError::MissingTypeField) => {
                warn!("Rejecting registry request: {}", e);
                reject(connection, &frame, "Unknown message type").await
            }
            Err(e) => {
                warn!("Rejecting registry request: {}", e);
                reject(connection, &frame, &e.full_message()).await
            }
        };

        if let Err(e) = result {
            error!("Error handling registry connection: {}", e);
        }
    }
}

impl RegistryHandler {
    fn handle_register(&self, request: RegisterRequest) -> RegisterResponse {
        let RegisterRequest {
            function_name,
            host,
            port,
            ..
        } = &request;
        info!(
            "Received register request for function '{}' at {}:{}",
            function_name, host, port
        );

        let message = match self.registry.register(function_name, host, *port) {
            RegistrationOutcome::Registered => {
                info!(
                    "Function '{}' registered successfully at {}:{}",
                    function_name, host, port
                );
                format!("Function '{}' registered successfully", function_name)
            }
            RegistrationOutcome::Updated => {
                info!(
                    "Function '{}' already registered, updated to {}:{}",
                    function_name, host, port
                );
                format!("Function '{}' registration updated", function_name)
            }
        };

        RegisterResponse::success(message).in_reply_to(&request.envelope.trace_id)
    }

    fn handle_lookup(&self, request: LookupRequest) -> LookupResponse {
        let function_name = &request.function_name;
        info!("Received lookup request for function '{}'", function_name);

        let response = match self.registry.lookup(function_name) {
            Some(endpoint) => {
                info!("Function '{}' found at {}", function_name, endpoint);
                LookupResponse::success(endpoint.host, endpoint.port)
            }
            None => {
                warn!("Function '{}' not found in registry", function_name);
                LookupResponse::error(format!("Function '{}' not found", function_name))
            }
        };

        response.in_reply_to(&request.envelope.trace_id)
    }
}
