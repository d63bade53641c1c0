//! Client side of the registry protocol.

use crate::config::Endpoint;
use crate::protocol::{
    LookupRequest, LookupResponse, Payload, RegisterRequest, RegisterResponse, TypedMessage,
};
use crate::transport::ClientTransport;
use crate::{RendezvousError, Result};
use tracing::{debug, error, info, warn};

/// Talks to one registry. Every operation opens its own connection.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    registry: Endpoint,
    transport: ClientTransport,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new(Endpoint::default())
    }
}

impl RegistryClient {
    pub fn new(registry: Endpoint) -> Self {
        Self::with_transport(registry, ClientTransport::default())
    }

    pub fn with_transport(registry: Endpoint, transport: ClientTransport) -> Self {
        info!("RegistryClient configured to use registry at {}", registry);
        Self {
            registry,
            transport,
        }
    }

    pub fn registry_host(&self) -> &str {
        &self.registry.host
    }

    pub fn registry_port(&self) -> u16 {
        self.registry.port
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.registry
    }

    /// Announce `function_name` at `host:port`.
    ///
    /// A well-formed request always succeeds; errors here are transport or
    /// decoding failures, wrapped as [`RendezvousError::Registry`].
    pub async fn register(
        &self,
        function_name: &str,
        host: &str,
        port: u16,
    ) -> Result<RegisterResponse> {
        info!(
            "Registering service '{}' at {}:{} with registry at {}",
            function_name, host, port, self.registry
        );

        let request = RegisterRequest::new(function_name, host, port);
        let response: RegisterResponse = self.exchange(&request).await.map_err(|e| {
            error!("Error registering service: {}", e);
            RendezvousError::registry("Failed to register service", e)
        })?;

        if response.is_success() {
            info!(
                "Service '{}' registered successfully: {}",
                function_name, response.message
            );
        } else {
            warn!(
                "Failed to register service '{}': {}",
                function_name, response.message
            );
        }
        Ok(response)
    }

    /// Ask where `function_name` is served. A miss is an error-status
    /// response, not an `Err`.
    pub async fn lookup(&self, function_name: &str) -> Result<LookupResponse> {
        info!(
            "Looking up service '{}' in registry at {}",
            function_name, self.registry
        );

        let request = LookupRequest::new(function_name);
        let response: LookupResponse = self.exchange(&request).await.map_err(|e| {
            error!("Error looking up service: {}", e);
            RendezvousError::registry("Failed to look up service", e)
        })?;

        match response.endpoint() {
            Ok(endpoint) => info!("Service '{}' found at {}", function_name, endpoint),
            Err(message) => warn!("Service '{}' not found: {}", function_name, message),
        }
        Ok(response)
    }

    /// Like [`lookup`](Self::lookup), but a miss becomes a registry error.
    pub async fn resolve(&self, function_name: &str) -> Result<Endpoint> {
        self.lookup(function_name)
            .await?
            .endpoint()
            .map_err(|message| RendezvousError::Registry {
                message,
                source: None,
            })
    }

    async fn exchange<Req: Payload, Resp: TypedMessage>(&self, request: &Req) -> Result<Resp> {
        let mut connection = self
            .transport
            .connect(&self.registry.host, self.registry.port)
            .await?;

        let result = async {
            connection.send(request).await?;
            connection.receive::<Resp>().await
        }
        .await;
        connection.close().await;

        let response = result?;
        if response.trace_id() != request.trace_id() {
            debug!(
                "Registry answered trace {} for request {}",
                response.trace_id(),
                request.trace_id()
            );
        }
        Ok(response)
    }
}
