// Endpoint failover

use super::EndpointSession;
use crate::errors::{ConnectError, NoEndpointAvailable};
use crate::models::EndpointConfig;
use crate::telemetry;
use tracing::{error, info, instrument, warn};

/// Connector opens a session to a single endpoint
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &EndpointConfig) -> Result<Box<dyn EndpointSession>, ConnectError>;
}

/// A connected session together with the endpoint it is bound to
pub struct ActiveSession<'a> {
    pub endpoint: &'a EndpointConfig,
    pub session: Box<dyn EndpointSession>,
}

/// ConnectionManager tries endpoints strictly in priority order.
///
/// Each endpoint is attempted once per run; there is no retry, no backoff and
/// no return to an earlier endpoint.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self { connector }
    }

    #[instrument(skip_all, fields(endpoints = endpoints.len()))]
    pub fn connect<'a>(
        &self,
        endpoints: &'a [EndpointConfig],
    ) -> Result<ActiveSession<'a>, NoEndpointAvailable> {
        let mut attempts = Vec::with_capacity(endpoints.len());

        for (index, endpoint) in endpoints.iter().enumerate() {
            if index > 0 {
                warn!(
                    endpoint = %endpoint.name,
                    previous = %endpoints[index - 1].name,
                    "Previous server failed, trying {} server",
                    endpoint.name
                );
                telemetry::record_failover(&endpoint.name);
            }

            match self.connector.connect(endpoint) {
                Ok(session) => {
                    info!(endpoint = %endpoint.name, host = %endpoint.host, "Endpoint selected");
                    return Ok(ActiveSession { endpoint, session });
                }
                Err(e) => {
                    warn!(
                        endpoint = %endpoint.name,
                        host = %endpoint.host,
                        error = %e,
                        "Error connecting to {} server",
                        endpoint.name
                    );
                    attempts.push((endpoint.name.clone(), e));
                }
            }
        }

        error!(attempted = attempts.len(), "Could not connect to any server");
        Err(NoEndpointAvailable { attempts })
    }
}
