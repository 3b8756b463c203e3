//! RPC surface wrapping a PIR server.
//!
//! Envelopes are bincode-encoded and framed with an 8-byte little-endian
//! length prefix over a stream socket. The server keeps a single
//! current-batch query slot; one active client per server instance is a
//! caller obligation, multi-client concurrency is deliberately not provided.

pub mod framing;

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PirError, Result};
use crate::lhe::{Answer, DbInfo, Hint, Query, Secret, SimpleClient, SimpleServer};
use crate::matrix::{Elem, Matrix};
use framing::{read_frame, write_frame};

/// Default listen port of the PIR service.
pub const DEFAULT_PIR_PORT: u16 = 8728;

/// Client-declared instance shape, echoed for logging; the server's database
/// is fixed at construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InitRequest {
    pub rows: u64,
    pub cols: u64,
    pub p_mod: u64,
    pub bits_per: u64,
    pub batch_size: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub enum Request<T: Elem> {
    ClientInit(InitRequest),
    Query(Vec<Query<T>>),
    Answer,
    BatchCapacity { hint_time_ms: f64, pir_time_ms: f64 },
}

#[derive(Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub enum Response<T: Elem> {
    Init { hint: Hint<T> },
    Query,
    Answer { answers: Vec<Answer<T>> },
    BatchCapacity { capacity: u64 },
}

fn send<W: Write, M: Serialize>(writer: W, msg: &M) -> Result<()> {
    let bytes = bincode::serialize(msg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    write_frame(writer, &bytes)?;
    Ok(())
}

fn recv<R: Read, M: DeserializeOwned>(reader: R) -> Result<M> {
    let bytes = read_frame(reader)?;
    let msg = bincode::deserialize(&bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(msg)
}

/// Service state: the wrapped PIR server plus the current batch of queries.
pub struct PirService<T: Elem> {
    server: SimpleServer<T>,
    queries: Vec<Query<T>>,
}

impl<T: Elem> PirService<T> {
    pub fn new(server: SimpleServer<T>) -> Self {
        Self { server, queries: Vec::new() }
    }

    /// Handle one request against the current state.
    pub fn handle(&mut self, request: Request<T>) -> Result<Response<T>> {
        match request {
            Request::ClientInit(init) => {
                info!(?init, "client init");
                Ok(Response::Init { hint: self.server.hint() })
            }
            Request::Query(queries) => {
                let total: u64 = queries.iter().map(Query::size).sum();
                debug!(count = queries.len(), kb = total as f64 / 1024.0, "query registered");
                self.queries = queries;
                Ok(Response::Query)
            }
            Request::Answer => {
                let answers = self.server.answer(&self.queries)?;
                Ok(Response::Answer { answers })
            }
            Request::BatchCapacity { hint_time_ms, pir_time_ms } => {
                Ok(Response::BatchCapacity {
                    capacity: batch_capacity(hint_time_ms, pir_time_ms),
                })
            }
        }
    }

    /// Serve connections until the listener fails. Connections are handled
    /// one at a time; the query slot is not multi-client safe.
    pub fn serve(&mut self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "pir service listening");
        for stream in listener.incoming() {
            let stream = stream?;
            if let Err(err) = self.run_connection(stream) {
                warn!(%err, "connection ended with error");
            }
        }
        Ok(())
    }

    fn run_connection(&mut self, mut stream: TcpStream) -> Result<()> {
        info!(peer = %stream.peer_addr()?, "client connected");
        loop {
            let request = match recv::<_, Request<T>>(&mut stream) {
                Ok(request) => request,
                Err(PirError::Transport(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(())
                }
                Err(err) => return Err(err),
            };
            let response = self.handle(request)?;
            send(&mut stream, &response)?;
        }
    }
}

/// How many query rounds amortize one hint computation.
fn batch_capacity(hint_time_ms: f64, pir_time_ms: f64) -> u64 {
    if pir_time_ms <= 0.0 {
        return 1;
    }
    ((hint_time_ms / pir_time_ms).ceil() as u64).max(1)
}

/// Blocking RPC client owning the scheme client built from the fetched hint.
pub struct ServiceClient<T: Elem> {
    stream: TcpStream,
    client: SimpleClient<T>,
}

impl<T: Elem> ServiceClient<T> {
    /// Connect, fetch the hint, and initialize the scheme client.
    pub fn connect<A: ToSocketAddrs>(addr: A, init: InitRequest) -> Result<Self> {
        let mut stream = TcpStream::connect(addr)?;
        send(&mut stream, &Request::<T>::ClientInit(init))?;
        let hint = match recv::<_, Response<T>>(&mut stream)? {
            Response::Init { hint } => hint,
            _ => return Err(unexpected_response()),
        };
        let client = match hint {
            Hint::Simple(h) => SimpleClient::new(h)?,
            Hint::Local(_) => {
                return Err(PirError::dims("service wraps the simple scheme"));
            }
        };
        Ok(Self { stream, client })
    }

    /// Build queries for the inputs and register them on the server.
    pub fn query(&mut self, inputs: &[Matrix<T>]) -> Result<Vec<Secret<T>>> {
        let (secrets, queries) = self.client.query(inputs)?;
        send(&mut self.stream, &Request::Query(queries))?;
        match recv::<_, Response<T>>(&mut self.stream)? {
            Response::Query => Ok(secrets),
            _ => Err(unexpected_response()),
        }
    }

    /// Fetch the answers for the registered batch and recover.
    pub fn answer(&mut self, secrets: &mut [Secret<T>]) -> Result<Vec<Matrix<T>>> {
        send(&mut self.stream, &Request::<T>::Answer)?;
        match recv::<_, Response<T>>(&mut self.stream)? {
            Response::Answer { answers } => self.client.recover(secrets, &answers),
            _ => Err(unexpected_response()),
        }
    }

    /// Ask the server how many query rounds amortize one hint computation.
    pub fn batch_capacity(&mut self, hint_time_ms: f64, pir_time_ms: f64) -> Result<u64> {
        send(&mut self.stream, &Request::<T>::BatchCapacity { hint_time_ms, pir_time_ms })?;
        match recv::<_, Response<T>>(&mut self.stream)? {
            Response::BatchCapacity { capacity } => Ok(capacity),
            _ => Err(unexpected_response()),
        }
    }

    pub fn db_info(&self) -> &DbInfo {
        self.client.db_info()
    }
}

fn unexpected_response() -> PirError {
    PirError::Transport(io::Error::new(
        io::ErrorKind::InvalidData,
        "unexpected response variant",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_capacity_quotient() {
        assert_eq!(batch_capacity(1000.0, 100.0), 10);
        assert_eq!(batch_capacity(150.0, 100.0), 2);
        assert_eq!(batch_capacity(10.0, 100.0), 1);
        assert_eq!(batch_capacity(10.0, 0.0), 1);
    }
}
