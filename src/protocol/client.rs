use std::{
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
};

use log::debug;

use super::{
    ComputeStatus, FetchReply, MAX_ARRAY_LEN, ProtocolTransport, Request,
    transport::TransportError,
};

/// Peer side of the statistics protocol.
pub struct Client<T: Read + Write = TcpStream> {
    transport: ProtocolTransport<T>,
}

impl Client<TcpStream> {
    pub fn connect<A: ToSocketAddrs>(address: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address)?;
        debug!("connected to {}", stream.peer_addr()?);
        Ok(Self::new(stream))
    }
}

impl<T: Read + Write> Client<T> {
    pub fn new(stream: T) -> Self {
        Self {
            transport: ProtocolTransport::new(stream),
        }
    }

    /// Queues an array on the server. The server sends no acknowledgement.
    pub fn submit_array(&mut self, values: &[i32], workers: u32) -> Result<(), TransportError> {
        if values.is_empty() || values.len() > MAX_ARRAY_LEN {
            return Err(TransportError::InvalidArrayLength(
                u32::try_from(values.len()).unwrap_or(u32::MAX),
            ));
        }

        self.transport.write_request(&Request::SubmitArray {
            workers,
            values: values.to_vec(),
        })
    }

    pub fn compute(&mut self) -> Result<ComputeStatus, TransportError> {
        self.transport.write_request(&Request::Compute)?;
        self.transport.read_compute_status()
    }

    pub fn fetch_results(&mut self) -> Result<FetchReply, TransportError> {
        self.transport.write_request(&Request::FetchResults)?;
        self.transport.read_fetch_reply()
    }
}
