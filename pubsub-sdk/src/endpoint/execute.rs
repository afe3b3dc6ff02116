use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::auth::sign_request;
use crate::endpoint::status::{
    Executed, ExecutionError, ExecutionResult, StatusCategory, StatusMetadata,
};
use crate::endpoint::Endpoint;
use crate::errors::{Error, Result, TransportError, ValidationError};
use crate::macros::sdk_log;
use crate::query::default_query;
use crate::transport::{TransportRequest, TransportResponse};

/// Turn a validated endpoint into the exact request that goes on the wire.
///
/// Query layering, each layer overriding the previous one on collision:
/// defaults, operation parameters, credential, caller extras. The signature is computed last,
/// over the final query.
pub(crate) fn prepare<E: Endpoint>(endpoint: &E) -> Result<TransportRequest> {
    let operation = endpoint.operation();
    let invalid = |source: ValidationError| Error::Validation { operation, source };

    endpoint.validate().map_err(invalid)?;
    let path = endpoint.build_path().map_err(invalid)?;
    let operation_query = endpoint.build_query().map_err(invalid)?;
    let body = endpoint.build_body().map_err(invalid)?;
    let method = endpoint.http_method();

    let base = endpoint.base();
    let client = &base.client;
    let config = client.config();

    let mut query = default_query(config, client.telemetry());
    query.merge(operation_query);
    if endpoint.is_auth_required() {
        client.token_manager().apply(
            &mut query,
            base.auth(),
            &endpoint.auth_resources(),
            &config.auth_key,
        );
    }
    if let Some(extra) = &base.query_params {
        query.merge(extra.clone());
    }
    if config.has_secret_key() {
        sign_request(
            &config.secret_key,
            &config.publish_key,
            method,
            &path,
            &mut query,
            &body,
            unix_now(),
        );
    }

    let url = client.request_url(&path, &query).map_err(|err| {
        invalid(ValidationError::new(
            "path",
            format!("Invalid request URL: {err}"),
        ))
    })?;

    let mut headers = Vec::new();
    if !body.is_empty() {
        headers.push(("content-type".to_string(), "application/json".to_string()));
    }

    Ok(TransportRequest {
        method,
        url,
        headers,
        body,
        connect_timeout: endpoint.connect_timeout(),
        request_timeout: endpoint.request_timeout(),
    })
}

/// Run `endpoint` once: validate, assemble, authenticate, sign, send, parse.
///
/// Never retries. The exchange races the endpoint's [`crate::Context`], if any: cancellation
/// drops the in-flight request and yields [`TransportError::Cancelled`]. Telemetry is recorded
/// for every outcome.
pub async fn execute<E: Endpoint>(endpoint: &E) -> ExecutionResult<E::Response> {
    let operation = endpoint.operation();
    let started = Instant::now();

    let (result, status_code) = exchange(endpoint, started).await;

    let latency = started.elapsed();
    endpoint
        .base()
        .client
        .telemetry()
        .record(operation, latency, status_code);

    match result {
        Ok(response) => Ok(Executed {
            response,
            status: StatusMetadata {
                operation,
                category: StatusCategory::Acknowledgment,
                status_code,
                latency,
            },
        }),
        Err(error) => {
            sdk_log!(warn, "{error}");
            let status = StatusMetadata {
                operation,
                category: StatusCategory::from_error(&error),
                status_code,
                latency,
            };
            Err(ExecutionError { error, status })
        }
    }
}

async fn exchange<E: Endpoint>(
    endpoint: &E,
    started: Instant,
) -> (Result<E::Response>, Option<u16>) {
    let operation = endpoint.operation();

    let request = match prepare(endpoint) {
        Ok(request) => request,
        Err(error) => return (Err(error), None),
    };
    sdk_log!(
        debug,
        "{operation}: {} {}",
        request.method,
        request.url.path()
    );

    let response = match send(endpoint, request).await {
        Ok(response) => response,
        Err(source) => return (Err(Error::Transport { operation, source }), None),
    };

    let status = StatusMetadata {
        operation,
        category: StatusCategory::from_status_code(response.status),
        status_code: Some(response.status),
        latency: started.elapsed(),
    };
    sdk_log!(
        debug,
        "{operation}: HTTP {} after {:?}",
        response.status,
        status.latency
    );

    (
        endpoint.parse_response(&response.body, &status),
        Some(response.status),
    )
}

async fn send<E: Endpoint>(
    endpoint: &E,
    request: TransportRequest,
) -> std::result::Result<TransportResponse, TransportError> {
    let transport = endpoint.base().client.transport();
    let request_timeout = request.request_timeout;

    // Transports are not trusted to honour the request timeout on their own.
    let timed = async {
        tokio::time::timeout(request_timeout, transport.send(request))
            .await
            .unwrap_or(Err(TransportError::Timeout))
    };

    match endpoint.base().context() {
        Some(context) => tokio::select! {
            biased;
            reason = context.done() => Err(TransportError::Cancelled(reason)),
            result = timed => result,
        },
        None => timed.await,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
