//! Caller side: resolve through the registry, then call the callee directly.

use crate::config::Endpoint;
use crate::error::RpcPhase;
use crate::protocol::{CallRequest, CallResponse};
use crate::registry::RegistryClient;
use crate::transport::ClientTransport;
use crate::{RendezvousError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info};

/// Invokes remote functions by name.
///
/// Every call resolves the name afresh. There is no retry and no caching of
/// earlier resolutions.
#[derive(Debug, Clone, Default)]
pub struct RpcClient {
    registry: RegistryClient,
    transport: ClientTransport,
}

impl RpcClient {
    pub fn new(registry: RegistryClient) -> Self {
        Self::with_transport(registry, ClientTransport::default())
    }

    /// Use `transport` for the call connection. The registry client keeps its own.
    pub fn with_transport(registry: RegistryClient, transport: ClientTransport) -> Self {
        Self {
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Call `function_name` with positional `args` and return its result.
    ///
    /// Fails with an [`RendezvousError::Rpc`] whose phase tells where:
    /// - `Resolution`: the registry did not know the name or could not be reached;
    ///   no callee was contacted.
    /// - `Network`: connecting to or talking with the callee failed.
    /// - `Invocation`: the callee answered with an error status.
    pub async fn invoke(&self, function_name: &str, args: Vec<Value>) -> Result<Value> {
        info!("Invoking remote function '{}'", function_name);

        let endpoint = self.resolve(function_name).await?;
        let response = self.call(&endpoint, function_name, args).await?;

        match response.into_result() {
            Ok(result) => {
                info!("Remote function '{}' returned successfully", function_name);
                Ok(result)
            }
            Err(message) => {
                error!("Remote function '{}' failed: {}", function_name, message);
                Err(RendezvousError::rpc(
                    RpcPhase::Invocation,
                    format!("Function invocation failed: {}", message),
                ))
            }
        }
    }

    /// [`invoke`](Self::invoke), then convert the result into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        function_name: &str,
        args: Vec<Value>,
    ) -> Result<T> {
        let result = self.invoke(function_name, args).await?;
        serde_json::from_value(result).map_err(|e| RendezvousError::Serialization {
            message: format!("Result of '{}' has an unexpected shape", function_name),
            source: Some(e),
        })
    }

    async fn resolve(&self, function_name: &str) -> Result<Endpoint> {
        let lookup = self.registry.lookup(function_name).await.map_err(|e| {
            let (registry_error, cause) = e.detach_source();
            RendezvousError::Rpc {
                phase: RpcPhase::Resolution,
                message: registry_error.to_string(),
                source: cause,
            }
        })?;

        let endpoint = lookup.endpoint().map_err(|message| {
            error!("Function '{}' could not be resolved: {}", function_name, message);
            RendezvousError::rpc(
                RpcPhase::Resolution,
                format!("Function not found: {}", message),
            )
        })?;
        debug!("Resolved '{}' to {}", function_name, endpoint);
        Ok(endpoint)
    }

    async fn call(
        &self,
        endpoint: &Endpoint,
        function_name: &str,
        args: Vec<Value>,
    ) -> Result<CallResponse> {
        let network = |e: RendezvousError| {
            error!("Network error calling {} at {}: {}", function_name, endpoint, e);
            RendezvousError::Rpc {
                phase: RpcPhase::Network,
                message: format!("Communication error with {}", endpoint),
                source: Some(Box::new(e)),
            }
        };

        let mut connection = self.transport.connect_to(endpoint).await.map_err(network)?;
        let request = CallRequest::new(function_name, args);
        let result = async {
            connection.send(&request).await?;
            connection.receive::<CallResponse>().await
        }
        .await;
        connection.close().await;

        result.map_err(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::registry::RegistryServer;
    use crate::rpc::RpcServer;
    use serde_json::json;
    use std::sync::Arc;

    struct Greeter;

    impl Greeter {
        fn greet(&self, name: String) -> String {
            format!("hello, {}", name)
        }

        fn pair(&self) -> Vec<u32> {
            vec![1, 2]
        }
    }

    async fn registry() -> (RegistryServer, RegistryClient) {
        let mut server = RegistryServer::new(ServerConfig::new("127.0.0.1", 0));
        server.start().await.unwrap();
        let client = RegistryClient::new(Endpoint::new("127.0.0.1", server.port().unwrap()));
        (server, client)
    }

    #[tokio::test]
    async fn test_invoke_round_trip() {
        let (mut registry, registry_client) = registry().await;
        let mut callee = RpcServer::new(ServerConfig::new("127.0.0.1", 0), registry_client.clone())
            .with_advertised_host("127.0.0.1");
        callee.start().await.unwrap();
        callee
            .register_function("greet", Arc::new(Greeter), Greeter::greet)
            .await
            .unwrap();
        callee
            .register_function("pair", Arc::new(Greeter), Greeter::pair)
            .await
            .unwrap();

        let client = RpcClient::new(registry_client);
        let result = client.invoke("greet", vec![json!("ada")]).await.unwrap();
        assert_eq!(result, json!("hello, ada"));

        let pair: Vec<u32> = client.invoke_as("pair", vec![]).await.unwrap();
        assert_eq!(pair, vec![1, 2]);

        let err = client.invoke_as::<bool>("pair", vec![]).await.unwrap_err();
        assert!(err.is_serialization());

        callee.stop().await;
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_unregistered_function_is_resolution_error() {
        let (mut registry, registry_client) = registry().await;
        let client = RpcClient::new(registry_client);

        let err = client.invoke("missing", vec![]).await.unwrap_err();
        assert_eq!(err.rpc_phase(), Some(RpcPhase::Resolution));
        assert!(err.to_string().contains("not found"));

        registry.stop().await;
    }

    /// Displays of `err` and each of its causes, outermost first.
    fn chain(err: &RendezvousError) -> Vec<String> {
        let mut texts = vec![err.to_string()];
        let mut cause = std::error::Error::source(err);
        while let Some(inner) = cause {
            texts.push(inner.to_string());
            cause = std::error::Error::source(inner);
        }
        texts
    }

    fn assert_no_repeated_text(err: &RendezvousError) {
        let texts = chain(err);
        for pair in texts.windows(2) {
            assert!(
                !pair[0].contains(&pair[1]),
                "cause '{}' repeated in '{}'",
                pair[1],
                pair[0]
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_resolution_error() {
        let (mut registry, registry_client) = registry().await;
        registry.stop().await;

        let client = RpcClient::new(registry_client);
        let err = client.invoke("anything", vec![]).await.unwrap_err();
        assert_eq!(err.rpc_phase(), Some(RpcPhase::Resolution));

        let line = err.to_string();
        assert_eq!(line.matches("Registry error").count(), 1, "{}", line);
        assert_eq!(line.matches("Resolution error").count(), 1, "{}", line);
        match &err {
            RendezvousError::Rpc {
                source: Some(cause),
                ..
            } => assert!(cause.is_connection(), "{:?}", cause),
            other => panic!("Expected Rpc error with a cause, got: {:?}", other),
        }
        assert_no_repeated_text(&err);
    }

    #[tokio::test]
    async fn test_stale_endpoint_is_network_error() {
        let (mut registry, registry_client) = registry().await;
        let mut callee = RpcServer::new(ServerConfig::new("127.0.0.1", 0), registry_client.clone())
            .with_advertised_host("127.0.0.1");
        callee.start().await.unwrap();
        callee
            .register_function("greet", Arc::new(Greeter), Greeter::greet)
            .await
            .unwrap();
        callee.stop().await;

        let client = RpcClient::new(registry_client);
        let err = client.invoke("greet", vec![json!("ada")]).await.unwrap_err();
        assert_eq!(err.rpc_phase(), Some(RpcPhase::Network));
        assert!(err.to_string().contains("Communication error with 127.0.0.1:"));
        assert_no_repeated_text(&err);

        registry.stop().await;
    }
}
