//! Callee side: hosts named functions and answers call requests.

use super::function::{FunctionTable, Method, RemoteFunction};
use crate::config::{RegistryConfig, ServerConfig};
use crate::protocol::{decode_as, CallRequest, CallResponse, RegisterResponse, TypedMessage};
use crate::registry::RegistryClient;
use crate::transport::server::reject;
use crate::transport::{Connection, ConnectionHandler, ServerHandle, ServerTransport};
use crate::{RendezvousError, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A process hosting remotely callable functions.
///
/// Start it first so the listening port is known, then register functions;
/// each registration is announced to the registry with the bound port.
pub struct RpcServer {
    config: ServerConfig,
    advertised_host: String,
    registry: RegistryClient,
    functions: Arc<FunctionTable>,
    handle: Option<ServerHandle>,
}

impl RpcServer {
    pub fn new(config: ServerConfig, registry: RegistryClient) -> Self {
        Self {
            config,
            advertised_host: RegistryConfig::DEFAULT_HOST.to_string(),
            registry,
            functions: Arc::new(FunctionTable::new()),
            handle: None,
        }
    }

    /// Host name sent to the registry. Defaults to `localhost`.
    pub fn with_advertised_host(mut self, host: impl Into<String>) -> Self {
        self.advertised_host = host.into();
        self
    }

    pub fn advertised_host(&self) -> &str {
        &self.advertised_host
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(RendezvousError::AlreadyStarted);
        }
        info!(
            "Starting RPC server on {}:{}",
            self.config.host, self.config.port
        );

        let handler = Arc::new(CallHandler {
            functions: self.functions.clone(),
        });
        let handle = ServerTransport::start(&self.config, handler).await?;
        info!("RPC server started on port {}", handle.bound_port());

        self.handle = Some(handle);
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            info!("Stopping RPC server");
            handle.stop().await;
            info!("RPC server stopped");
        }
    }

    /// The bound port, once started.
    pub fn port(&self) -> Option<u16> {
        self.handle.as_ref().map(ServerHandle::bound_port)
    }

    pub fn bound_port(&self) -> Result<u16> {
        self.port().ok_or(RendezvousError::NotStarted)
    }

    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Bind `name` to `method` on `target` and announce it to the registry.
    ///
    /// Binding the same name again replaces the local entry.
    pub async fn register_function<T, M, Args>(
        &self,
        name: &str,
        target: Arc<T>,
        method: M,
    ) -> Result<RegisterResponse>
    where
        T: Send + Sync + 'static,
        M: Method<T, Args>,
        Args: 'static,
    {
        let port = self.bound_port()?;
        if self.functions.bind(name, target, method) {
            debug!("Replaced local binding for '{}'", name);
        }
        self.announce(name, port).await
    }

    /// Like [`register_function`](Self::register_function) for an untyped
    /// `(args) -> result` function.
    pub async fn register_remote(
        &self,
        name: &str,
        function: Arc<dyn RemoteFunction>,
    ) -> Result<RegisterResponse> {
        let port = self.bound_port()?;
        if self.functions.insert(name, function) {
            debug!("Replaced local binding for '{}'", name);
        }
        self.announce(name, port).await
    }

    async fn announce(&self, name: &str, port: u16) -> Result<RegisterResponse> {
        info!(
            "Registering function '{}' at {}:{}",
            name, self.advertised_host, port
        );
        self.registry
            .register(name, &self.advertised_host, port)
            .await
    }
}

struct CallHandler {
    functions: Arc<FunctionTable>,
}

#[async_trait::async_trait]
impl ConnectionHandler for CallHandler {
    async fn handle(&self, connection: &mut Connection) {
        let frame = match connection.receive_raw().await {
            Ok(frame) => frame,
            Err(e) => {
                error!("Error handling RPC request: {}", e);
                return;
            }
        };

        let result = match decode_as::<CallRequest>(&frame) {
            Ok(request) => {
                let response = self.dispatch(request).await;
                connection.send(&response).await
            }
            Err(
                e @ (RendezvousError::UnknownMessageType(_)
                | RendezvousError::MissingTypeField
                | RendezvousError::UnexpectedMessageType { .. }),
            ) => {
                warn!("Rejecting RPC request: {}", e);
                reject(connection, &frame, "Unknown message type").await
            }
            Err(e) => {
                warn!("Rejecting RPC request: {}", e);
                reject(connection, &frame, &e.full_message()).await
            }
        };

        if let Err(e) = result {
            error!("Error sending RPC response: {}", e);
        }
    }
}

impl CallHandler {
    async fn dispatch(&self, request: CallRequest) -> CallResponse {
        let CallRequest {
            envelope,
            function_name,
            arguments,
        } = request;
        info!(
            "Received RPC request for function '{}' with {} argument(s)",
            function_name,
            arguments.len()
        );

        let response = match self.functions.dispatch(&function_name, arguments).await {
            Ok(result) => {
                debug!("Function '{}' returned {}", function_name, result);
                CallResponse::success(result)
            }
            Err(e) => {
                error!("Error invoking function '{}': {}", function_name, e);
                CallResponse::error(e.to_string())
            }
        };

        response.in_reply_to(&envelope.trace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use crate::protocol::{LookupRequest, Payload};
    use crate::registry::RegistryServer;
    use crate::transport::ClientTransport;
    use serde_json::{json, Value};

    struct Counter;

    impl Counter {
        fn add(&self, a: i64, b: i64) -> i64 {
            a + b
        }

        fn fail(&self) -> std::result::Result<(), String> {
            Err("counter jammed".to_string())
        }
    }

    async fn started() -> (RegistryServer, RpcServer) {
        let mut registry = RegistryServer::new(ServerConfig::new("127.0.0.1", 0));
        registry.start().await.unwrap();
        let client = RegistryClient::new(Endpoint::new("127.0.0.1", registry.port().unwrap()));

        let mut server = RpcServer::new(ServerConfig::new("127.0.0.1", 0), client)
            .with_advertised_host("127.0.0.1");
        server.start().await.unwrap();
        (registry, server)
    }

    async fn call(server: &RpcServer, request: &CallRequest) -> CallResponse {
        let mut connection = ClientTransport::new()
            .connect("127.0.0.1", server.port().unwrap())
            .await
            .unwrap();
        connection.send(request).await.unwrap();
        connection.receive().await.unwrap()
    }

    #[tokio::test]
    async fn test_register_before_start_is_state_error() {
        let server = RpcServer::new(ServerConfig::ephemeral(), RegistryClient::default());
        let result = server
            .register_function("add", Arc::new(Counter), Counter::add)
            .await;
        assert!(matches!(result, Err(RendezvousError::NotStarted)));
        assert!(server.functions().is_empty());
    }

    #[tokio::test]
    async fn test_register_advertises_bound_port() {
        let (mut registry, mut server) = started().await;

        let response = server
            .register_function("add", Arc::new(Counter), Counter::add)
            .await
            .unwrap();
        assert!(response.is_success());

        let endpoint = registry.registry().lookup("add").unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", server.port().unwrap()));

        server.stop().await;
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_call_success_copies_trace_id() {
        let (mut registry, mut server) = started().await;
        server
            .register_function("add", Arc::new(Counter), Counter::add)
            .await
            .unwrap();

        let request = CallRequest::new("add", vec![json!(2), json!(40)]);
        let response = call(&server, &request).await;
        assert!(response.is_success());
        assert_eq!(response.result, json!(42));
        assert_eq!(response.trace_id(), request.trace_id());

        server.stop().await;
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_call_failures_become_error_responses() {
        let (mut registry, mut server) = started().await;
        server
            .register_function("add", Arc::new(Counter), Counter::add)
            .await
            .unwrap();
        server
            .register_function("fail", Arc::new(Counter), Counter::fail)
            .await
            .unwrap();

        let missing = call(&server, &CallRequest::new("sub", vec![])).await;
        assert_eq!(missing.error_message.as_deref(), Some("Function 'sub' not found"));

        let mismatch = call(&server, &CallRequest::new("add", vec![json!("two")])).await;
        assert!(mismatch.error_message.unwrap().contains("Argument mismatch"));

        let failed = call(&server, &CallRequest::new("fail", vec![])).await;
        assert_eq!(
            failed.error_message.as_deref(),
            Some("Invocation error: counter jammed")
        );

        // Still serving after failures.
        let ok = call(&server, &CallRequest::new("add", vec![json!(1), json!(1)])).await;
        assert_eq!(ok.result, json!(2));

        server.stop().await;
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_non_call_request_rejected() {
        let (mut registry, mut server) = started().await;

        let mut connection = ClientTransport::new()
            .connect("127.0.0.1", server.port().unwrap())
            .await
            .unwrap();
        let request = LookupRequest::new("add");
        connection.send(&request).await.unwrap();
        let response: CallResponse = connection.receive().await.unwrap();

        assert_eq!(response.error_message.as_deref(), Some("Unknown message type"));
        assert_eq!(response.trace_id(), request.trace_id());

        server.stop().await;
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_untyped_function_registration() {
        let (mut registry, mut server) = started().await;
        server
            .register_remote(
                "count",
                Arc::new(|args: Vec<Value>| -> std::result::Result<Value, crate::error::DispatchError> {
                    Ok(json!(args.len()))
                }),
            )
            .await
            .unwrap();

        let response = call(&server, &CallRequest::new("count", vec![json!(1), json!(2)])).await;
        assert_eq!(response.result, json!(2));

        server.stop().await;
        registry.stop().await;
    }
}
