//! Single-connection Rserve client.
//!
//! All evaluations share one TCP connection guarded by an async mutex, so
//! concurrent callers queue in FIFO order and the daemon only ever sees one
//! command at a time. The connection is checked out for the duration of a
//! call; if the call fails in a way that leaves the stream out of sync (I/O
//! error, bad framing, timeout, or the caller's future being dropped), the
//! connection is discarded and the next call reconnects.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::endpoint::Endpoint;
use crate::error::RserveError;
use crate::protocol::{self, ResponseHeader, DT_SEXP, GREETING_LEN, HEADER_LEN};
use crate::sexp;
use crate::traits::Evaluator;
use crate::value::RValue;

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Give up on an evaluation after this long. `None` waits indefinitely.
    pub eval_timeout: Option<Duration>,
}

struct Connection {
    stream: TcpStream,
}

impl Connection {
    async fn open(endpoint: &Endpoint) -> Result<Self, RserveError> {
        let mut stream = TcpStream::connect(endpoint.socket_addr()).await?;
        stream.set_nodelay(true)?;

        let mut greeting = [0u8; GREETING_LEN];
        stream.read_exact(&mut greeting).await?;
        let version = protocol::parse_greeting(&greeting)?;
        debug!(%version, "rserve greeting accepted");

        Ok(Self { stream })
    }

    async fn eval(&mut self, command: &str) -> Result<RValue, RserveError> {
        self.stream.write_all(&protocol::encode_eval(command)).await?;

        let mut raw = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut raw).await?;
        let header = ResponseHeader::parse(&raw)?;

        let mut payload = vec![0u8; header.length as usize];
        self.stream.read_exact(&mut payload).await?;

        if header.is_error() {
            let status = header.status();
            let mut description = protocol::describe_status(status).to_string();
            if let Some(msg) = protocol::error_message(&payload) {
                description = format!("{description}: {msg}");
            }
            return Err(RserveError::Command {
                status,
                description,
            });
        }

        if payload.is_empty() {
            return Err(RserveError::Decode(
                "command failed for an unknown reason".into(),
            ));
        }
        match protocol::data_item(&payload) {
            Ok((DT_SEXP, body)) => sexp::parse(body).map_err(|e| RserveError::Decode(e.to_string())),
            Ok((kind, _)) => Err(RserveError::Decode(format!(
                "expected SEXP response, got data type {kind}"
            ))),
            Err(e) => Err(RserveError::Decode(e.to_string())),
        }
    }
}

/// Client for a local Rserve daemon.
pub struct RserveClient {
    endpoint: Endpoint,
    options: ClientOptions,
    conn: Mutex<Option<Connection>>,
}

impl RserveClient {
    /// Connect and handshake. Fails if the daemon is unreachable or does not
    /// speak plain QAP1.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect(endpoint: &Endpoint, options: ClientOptions) -> Result<Self, RserveError> {
        let conn = Connection::open(endpoint).await?;
        info!("connected to rserve");
        Ok(Self {
            endpoint: endpoint.clone(),
            options,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn eval_on(&self, conn: &mut Connection, command: &str) -> Result<RValue, RserveError> {
        match self.options.eval_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.eval(command))
                .await
                .map_err(|_| RserveError::Timeout(limit))?,
            None => conn.eval(command).await,
        }
    }
}

#[async_trait]
impl Evaluator for RserveClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn evaluate(&self, command: &str) -> Result<RValue, RserveError> {
        let mut slot = self.conn.lock().await;

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                info!("reconnecting to rserve");
                Connection::open(&self.endpoint).await?
            }
        };

        let started = Instant::now();
        let result = self.eval_on(&mut conn, command).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(value) => {
                debug!(elapsed_ms, kind = value.kind(), "evaluation succeeded");
                *slot = Some(conn);
            }
            Err(e) if e.breaks_connection() => {
                warn!(elapsed_ms, error = %e, "evaluation failed, dropping connection");
            }
            Err(e) => {
                debug!(elapsed_ms, error = %e, "evaluation failed");
                *slot = Some(conn);
            }
        }

        result
    }
}
