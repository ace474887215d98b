//! Micro-service endpoint registry
//!
//! A [`Service`] is a named group of request/reply endpoints that also answers the
//! discovery subjects every NATS micro-service client expects: `$SRV.PING`,
//! `$SRV.INFO` and `$SRV.STATS`, each reachable bare, scoped to this service's name,
//! and scoped to this particular instance's id.

use std::time::{Duration, Instant};

use bytes::Bytes;
use rillwater_proto::{
    headers::{HeaderMap, HeaderName, HeaderValue},
    ServerMessage, Subject,
};
use serde::Serialize;

use crate::core::{error::ClientClosedError, Client, ProcessError, Subscription};

const PING_RESPONSE: &str = "io.nats.micro.v1.ping_response";
const INFO_RESPONSE: &str = "io.nats.micro.v1.info_response";
const STATS_RESPONSE: &str = "io.nats.micro.v1.stats_response";

/// An endpoint's request handler
///
/// Returns the reply payload on success, or an error message to report back to the
/// caller on failure (carried on the reply via [`HeaderName::SERVICE_ERROR`]).
pub type Handler = Box<dyn FnMut(&ServerMessage) -> Result<Bytes, String> + Send>;

/// A registry of endpoints answering to a shared service identity
///
/// Obtained from [`Service::start`]. Call [`Service::poll`] regularly, interleaved
/// with [`Client::process`] the same way a bare [`Subscription`] is drained: `poll`
/// already calls `process` itself.
pub struct Service {
    client: Client,
    name: String,
    version: String,
    id: String,
    started_at: Instant,
    endpoints: Vec<Endpoint>,
    ping: Vec<Subscription>,
    info: Vec<Subscription>,
    stats: Vec<Subscription>,
}

struct Endpoint {
    name: String,
    subject: Subject,
    subscription: Subscription,
    handler: Handler,
    stats: EndpointStats,
}

#[derive(Debug, Default, Clone)]
struct EndpointStats {
    num_requests: u64,
    num_errors: u64,
    processing_time_ns: u64,
    last_error: Option<String>,
}

#[derive(Serialize)]
struct PingResponse<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    id: &'a str,
    version: &'a str,
}

#[derive(Serialize)]
struct InfoResponse<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    id: &'a str,
    version: &'a str,
    endpoints: Vec<InfoEndpoint<'a>>,
}

#[derive(Serialize)]
struct InfoEndpoint<'a> {
    name: &'a str,
    subject: &'a str,
}

#[derive(Serialize)]
struct StatsResponse<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    id: &'a str,
    version: &'a str,
    started: String,
    endpoints: Vec<StatsEndpoint<'a>>,
}

#[derive(Serialize)]
struct StatsEndpoint<'a> {
    name: &'a str,
    subject: &'a str,
    num_requests: u64,
    num_errors: u64,
    processing_time: u64,
    average_processing_time: u64,
    last_error: Option<&'a str>,
}

impl Service {
    /// Start a service named `name`, subscribing to its discovery subjects
    ///
    /// The service's id is a random NUID generated once here and held for the
    /// service's lifetime.
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed.
    pub fn start(
        client: &Client,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ClientClosedError> {
        let name = name.into();
        let id = nuid::next();

        let ping = subscribe_discovery(client, "PING", &name, &id)?;
        let info = subscribe_discovery(client, "INFO", &name, &id)?;
        let stats = subscribe_discovery(client, "STATS", &name, &id)?;

        Ok(Self {
            client: client.clone(),
            name,
            version: version.into(),
            id,
            started_at: Instant::now(),
            endpoints: Vec::new(),
            ping,
            info,
            stats,
        })
    }

    /// The random id assigned to this service instance at [`Service::start`]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register an endpoint answering `subject`, invoking `handler` for each request
    ///
    /// # Errors
    ///
    /// It returns an error if the client has been closed.
    pub fn endpoint(
        &mut self,
        name: impl Into<String>,
        subject: Subject,
        handler: Handler,
    ) -> Result<(), ClientClosedError> {
        let subscription = self.client.subscribe(subject.clone(), None)?;
        self.endpoints.push(Endpoint {
            name: name.into(),
            subject,
            subscription,
            handler,
            stats: EndpointStats::default(),
        });
        Ok(())
    }

    /// Drive the underlying client and answer every request that has arrived
    ///
    /// # Errors
    ///
    /// It returns an error if the underlying connection failed and couldn't reconnect.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<(), ProcessError> {
        self.client.process(timeout)?;

        for endpoint in &mut self.endpoints {
            while let Some(Ok(message)) = endpoint.subscription.try_recv() {
                let start = Instant::now();
                let result = (endpoint.handler)(&message);
                endpoint.stats.processing_time_ns +=
                    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
                endpoint.stats.num_requests += 1;

                let Some(reply_subject) = message.base.reply_subject.clone() else {
                    if let Err(error) = result {
                        endpoint.stats.num_errors += 1;
                        endpoint.stats.last_error = Some(error);
                    }
                    continue;
                };

                match result {
                    Ok(payload) => {
                        let _ = self.client.publish(reply_subject).payload(payload);
                    }
                    Err(error) => {
                        tracing::warn!(endpoint = %endpoint.name, %error, "endpoint handler failed");
                        endpoint.stats.num_errors += 1;
                        endpoint.stats.last_error = Some(error.clone());
                        let mut headers = HeaderMap::new();
                        headers.insert(
                            HeaderName::SERVICE_ERROR,
                            HeaderValue::from_dangerous_value(error.into()),
                        );
                        headers.insert(
                            HeaderName::SERVICE_ERROR_CODE,
                            HeaderValue::from_static("500"),
                        );
                        let _ = self
                            .client
                            .publish(reply_subject)
                            .headers(headers)
                            .payload(Bytes::new());
                    }
                }
            }
        }

        self.answer_ping();
        self.answer_info();
        self.answer_stats();
        Ok(())
    }

    fn answer_ping(&mut self) {
        let reply = PingResponse {
            kind: PING_RESPONSE,
            name: &self.name,
            id: &self.id,
            version: &self.version,
        };
        let payload = serde_json::to_vec(&reply).expect("PingResponse always serializes");
        reply_to_all(&self.client, &mut self.ping, &payload);
    }

    fn answer_info(&mut self) {
        let endpoints = self
            .endpoints
            .iter()
            .map(|endpoint| InfoEndpoint {
                name: &endpoint.name,
                subject: endpoint.subject.as_str(),
            })
            .collect();
        let reply = InfoResponse {
            kind: INFO_RESPONSE,
            name: &self.name,
            id: &self.id,
            version: &self.version,
            endpoints,
        };
        let payload = serde_json::to_vec(&reply).expect("InfoResponse always serializes");
        reply_to_all(&self.client, &mut self.info, &payload);
    }

    fn answer_stats(&mut self) {
        let started = chrono::DateTime::<chrono::Utc>::from(self.started_at_system_time()).to_rfc3339();
        let endpoints = self
            .endpoints
            .iter()
            .map(|endpoint| {
                let average_processing_time = endpoint
                    .stats
                    .processing_time_ns
                    .checked_div(endpoint.stats.num_requests)
                    .unwrap_or(0);
                StatsEndpoint {
                    name: &endpoint.name,
                    subject: endpoint.subject.as_str(),
                    num_requests: endpoint.stats.num_requests,
                    num_errors: endpoint.stats.num_errors,
                    processing_time: endpoint.stats.processing_time_ns,
                    average_processing_time,
                    last_error: endpoint.stats.last_error.as_deref(),
                }
            })
            .collect();
        let reply = StatsResponse {
            kind: STATS_RESPONSE,
            name: &self.name,
            id: &self.id,
            version: &self.version,
            started,
            endpoints,
        };
        let payload = serde_json::to_vec(&reply).expect("StatsResponse always serializes");
        reply_to_all(&self.client, &mut self.stats, &payload);
    }

    fn started_at_system_time(&self) -> std::time::SystemTime {
        std::time::SystemTime::now() - self.started_at.elapsed()
    }
}

fn subscribe_discovery(
    client: &Client,
    kind: &str,
    name: &str,
    id: &str,
) -> Result<Vec<Subscription>, ClientClosedError> {
    [
        format!("$SRV.{kind}"),
        format!("$SRV.{kind}.{name}"),
        format!("$SRV.{kind}.{name}.{id}"),
    ]
    .into_iter()
    .map(|subject| {
        client.subscribe(
            subject
                .try_into()
                .expect("discovery subject is a valid NATS subject"),
            None,
        )
    })
    .collect()
}

fn reply_to_all(client: &Client, subscriptions: &mut [Subscription], payload: &[u8]) {
    for subscription in subscriptions {
        while let Some(Ok(message)) = subscription.try_recv() {
            if let Some(reply_subject) = message.base.reply_subject {
                let _ = client
                    .publish(reply_subject)
                    .payload(Bytes::copy_from_slice(payload));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_start_generates_nuid_id() {
        let service = crate::tests::with_loopback_client(|client| {
            Service::start(client, "orders", "1.0.0").expect("service starts against a live client")
        });
        assert_eq!(22, service.id().len());
    }

    #[test]
    fn ping_response_has_fixed_type() {
        let reply = PingResponse {
            kind: PING_RESPONSE,
            name: "orders",
            id: "abc",
            version: "1.0.0",
        };
        let json = serde_json::to_string(&reply).expect("PingResponse always serializes");
        assert!(json.contains("\"type\":\"io.nats.micro.v1.ping_response\""));
        assert!(json.contains("\"name\":\"orders\""));
    }

    #[test]
    fn info_response_lists_endpoints() {
        let reply = InfoResponse {
            kind: INFO_RESPONSE,
            name: "orders",
            id: "abc",
            version: "1.0.0",
            endpoints: vec![InfoEndpoint {
                name: "create",
                subject: "orders.create",
            }],
        };
        let json = serde_json::to_string(&reply).expect("InfoResponse always serializes");
        assert!(json.contains("\"subject\":\"orders.create\""));
    }

    #[test]
    fn stats_endpoint_averages_processing_time() {
        let stats = EndpointStats {
            num_requests: 4,
            num_errors: 1,
            processing_time_ns: 400,
            last_error: Some("boom".to_string()),
        };
        assert_eq!(100, stats.processing_time_ns.checked_div(stats.num_requests).unwrap());
    }
}
