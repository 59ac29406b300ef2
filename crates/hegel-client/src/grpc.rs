//! gRPC client for the hardware inventory service

use crate::{Hardware, HardwareClient};
use async_trait::async_trait;
use hegel_common::{Error, Result};
use hegel_proto::hardware::hardware_service_client::HardwareServiceClient;
use hegel_proto::hardware::{Empty, GetRequest};
use std::future::Future;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Hardware client backed by a tonic channel
///
/// The channel connects lazily so the server can start while the backend is
/// down; the availability tracker reports the outage in the meantime.
#[derive(Clone, Debug)]
pub struct GrpcHardwareClient {
    client: HardwareServiceClient<Channel>,
    timeout: Duration,
}

impl GrpcHardwareClient {
    /// Build a client for `endpoint` (e.g. `http://cacher:42111`)
    ///
    /// Every RPC issued by this client is bounded by `timeout`.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the endpoint is not a valid URI.
    pub fn connect_lazy(endpoint: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| {
                Error::configuration(format!("invalid hardware endpoint {endpoint:?}: {e}"))
            })?
            .connect_timeout(timeout)
            .connect_lazy();

        Ok(Self {
            client: HardwareServiceClient::new(channel),
            timeout,
        })
    }

    /// Run one RPC under this client's deadline
    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tonic::Status>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(status)) => Err(Error::BackendUnavailable(format!(
                "{}: {}",
                status.code(),
                status.message()
            ))),
            Err(_) => Err(Error::BackendUnavailable(format!(
                "request timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl HardwareClient for GrpcHardwareClient {
    async fn by_ip(&self, ip: &str) -> Result<Hardware> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(GetRequest {
            ip: ip.to_string(),
            ..Default::default()
        });
        request.set_timeout(self.timeout);

        let response = match self.bounded(client.by_ip(request)).await {
            Ok(response) => response.into_inner(),
            Err(e) => {
                debug!(ip, "hardware lookup failed: {e}");
                return Err(e);
            }
        };

        if response.json.is_empty() {
            return Err(Error::HardwareNotFound(ip.to_string()));
        }
        Hardware::from_json(&response.json)
    }

    async fn probe(&self) -> Result<()> {
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(Empty {});
        request.set_timeout(self.timeout);

        // The stream itself is never read; dropping it cancels the call.
        let _stream = self.bounded(client.all(request)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hegel_proto::hardware::Hardware as WireHardware;
    use hegel_proto::hardware::hardware_service_server::{
        HardwareService, HardwareServiceServer,
    };
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{Request, Response, Status};

    struct FakeInventory;

    #[tonic::async_trait]
    impl HardwareService for FakeInventory {
        async fn by_ip(
            &self,
            request: Request<GetRequest>,
        ) -> std::result::Result<Response<WireHardware>, Status> {
            let json = match request.into_inner().ip.as_str() {
                "10.0.0.1" => r#"{"metadata":{"instance":{"id":"i-1","hostname":"node-1"}}}"#,
                "10.0.0.2" => "not json",
                "10.0.0.3" => return Err(Status::internal("database on fire")),
                _ => "",
            };
            Ok(Response::new(WireHardware {
                json: json.to_string(),
            }))
        }

        type AllStream =
            tokio_stream::Iter<std::vec::IntoIter<std::result::Result<WireHardware, Status>>>;

        async fn all(
            &self,
            _request: Request<Empty>,
        ) -> std::result::Result<Response<Self::AllStream>, Status> {
            Ok(Response::new(tokio_stream::iter(Vec::new())))
        }
    }

    async fn spawn_inventory() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(HardwareServiceServer::new(FakeInventory))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
        format!("http://{addr}")
    }

    async fn closed_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_by_ip_found() {
        let endpoint = spawn_inventory().await;
        let client = GrpcHardwareClient::connect_lazy(&endpoint, Duration::from_secs(5)).unwrap();

        let hw = client.by_ip("10.0.0.1").await.unwrap();
        assert_eq!(hw.instance_id(), Some("i-1"));
    }

    #[tokio::test]
    async fn test_by_ip_errors() {
        let endpoint = spawn_inventory().await;
        let client = GrpcHardwareClient::connect_lazy(&endpoint, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            client.by_ip("10.9.9.9").await,
            Err(Error::HardwareNotFound(ip)) if ip == "10.9.9.9"
        ));
        assert!(matches!(
            client.by_ip("10.0.0.2").await,
            Err(Error::MalformedRecord(_))
        ));
        assert!(matches!(
            client.by_ip("10.0.0.3").await,
            Err(Error::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_probe() {
        let endpoint = spawn_inventory().await;
        let client = GrpcHardwareClient::connect_lazy(&endpoint, Duration::from_secs(5)).unwrap();
        client.probe().await.unwrap();

        let down = closed_endpoint().await;
        let client = GrpcHardwareClient::connect_lazy(&down, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.probe().await,
            Err(Error::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let err = GrpcHardwareClient::connect_lazy("not a uri", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
