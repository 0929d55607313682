use std::io::{self, Read, Write};

use bincode::{
    Decode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};
use thiserror::Error;

use crate::stats::Summary;

use super::{
    MAX_ARRAY_LEN, Request,
    request::{COMPUTE, FETCH_RESULTS, SUBMIT_ARRAY},
    response::{ComputeStatus, FetchReply, Response},
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("peer closed the connection")]
    Disconnected,
    #[error("stream ended after {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },
    #[error("unknown message type {0:#04x}")]
    UnknownDiscriminator(u8),
    #[error("invalid array length {0}; expected 1..={max}", max = MAX_ARRAY_LEN)]
    InvalidArrayLength(u32),
    #[error("unknown status byte {0:#04x}")]
    UnknownStatus(u8),
}

impl TransportError {
    /// True when the peer closed the stream cleanly between messages.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected)
    }
}

/// Fixed-width big-endian codec over any byte stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: Configuration<BigEndian, Fixint>,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        Self { stream, config }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Reads exactly `length` bytes, issuing as many reads as the stream needs.
    pub fn receive_exact(&mut self, length: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; length];
        let mut filled = 0;

        while filled < length {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(TransportError::Truncated {
                        expected: length,
                        received: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }

    pub fn write_request(&mut self, req: &Request) -> Result<(), TransportError> {
        self.send(req)
    }

    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        self.send(resp)
    }

    pub fn read_request(&mut self) -> Result<Request, TransportError> {
        // End of stream counts as a clean close only before a message starts.
        let discriminator: u8 = match self.read_value() {
            Err(TransportError::Truncated { received: 0, .. }) => {
                return Err(TransportError::Disconnected);
            }
            other => other?,
        };

        match discriminator {
            SUBMIT_ARRAY => {
                let len: u32 = self.read_value()?;
                let workers: u32 = self.read_value()?;
                if len == 0 || len as usize > MAX_ARRAY_LEN {
                    return Err(TransportError::InvalidArrayLength(len));
                }
                let values = self.read_values(len as usize)?;
                Ok(Request::SubmitArray { workers, values })
            }
            COMPUTE => Ok(Request::Compute),
            FETCH_RESULTS => Ok(Request::FetchResults),
            other => Err(TransportError::UnknownDiscriminator(other)),
        }
    }

    pub fn read_compute_status(&mut self) -> Result<ComputeStatus, TransportError> {
        let status: u8 = self.read_value()?;
        ComputeStatus::try_from(status).map_err(TransportError::UnknownStatus)
    }

    pub fn read_fetch_reply(&mut self) -> Result<FetchReply, TransportError> {
        let status: u8 = self.read_value()?;

        match status {
            FetchReply::DONE => {
                let count: u32 = self.read_value()?;
                let results = (0..count)
                    .map(|_| self.read_summary())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FetchReply::Done(results))
            }
            FetchReply::IN_PROGRESS => Ok(FetchReply::InProgress),
            FetchReply::NO_DATA => Ok(FetchReply::NoData),
            other => Err(TransportError::UnknownStatus(other)),
        }
    }

    fn read_summary(&mut self) -> Result<Summary, TransportError> {
        let mode_size: u32 = self.read_value()?;
        let mode = self.read_values(mode_size as usize)?;
        let median: f64 = self.read_value()?;
        Ok(Summary { mode, median })
    }

    /// Decodes one scalar. Under fixed-int encoding the wire width of every
    /// scalar used by the protocol equals its in-memory size.
    fn read_value<V: Decode<()>>(&mut self) -> Result<V, TransportError> {
        let bytes = self.receive_exact(size_of::<V>())?;
        let (value, _) = decode_from_slice(&bytes, self.config)?;
        Ok(value)
    }

    fn read_values(&mut self, count: usize) -> Result<Vec<i32>, TransportError> {
        let bytes = self.receive_exact(count * size_of::<i32>())?;
        bytes
            .chunks_exact(size_of::<i32>())
            .map(|chunk| {
                decode_from_slice(chunk, self.config)
                    .map(|(value, _)| value)
                    .map_err(TransportError::from)
            })
            .collect()
    }

    fn send<E: bincode::Encode>(&mut self, message: E) -> Result<(), TransportError> {
        let bytes = encode_to_vec(message, self.config)?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use super::*;

    /// Stream handing out at most `chunk` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let end = (self.pos + self.chunk).min(self.data.len());
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn rewound(bytes: &[u8]) -> ProtocolTransport<Cursor<Vec<u8>>> {
        ProtocolTransport::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn read_write_request() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);
        let request = Request::SubmitArray {
            workers: 3,
            values: vec![i32::MIN, -1, 0, 1, i32::MAX],
        };

        transport.write_request(&request).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        assert_eq!(transport.read_request().unwrap(), request);
    }

    #[test]
    fn read_write_fetch_reply() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);
        let medians = [0.0, -0.0, -17.5, 4.5, f64::from(i32::MIN), 1e-300];
        let results = medians
            .iter()
            .map(|&median| Summary {
                mode: vec![-3, 8],
                median,
            })
            .collect::<Vec<_>>();

        transport
            .write_response(&Response::Fetch(FetchReply::Done(results)))
            .unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();

        let FetchReply::Done(decoded) = transport.read_fetch_reply().unwrap() else {
            panic!("expected results");
        };
        for (summary, median) in decoded.iter().zip(medians) {
            assert_eq!(summary.median.to_bits(), median.to_bits());
            assert_eq!(summary.mode, vec![-3, 8]);
        }
    }

    #[test]
    fn median_is_raw_big_endian_bits() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);
        let reply = FetchReply::Done(vec![Summary {
            mode: vec![],
            median: -2.5,
        }]);

        transport.write_response(&Response::Fetch(reply)).unwrap();
        let bytes = transport.stream.into_inner();
        assert_eq!(bytes[bytes.len() - 8..], (-2.5f64).to_bits().to_be_bytes());
    }

    #[test]
    fn reassembles_partial_reads() {
        let request = Request::SubmitArray {
            workers: 2,
            values: (0..1000).collect(),
        };
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        let data = encode_to_vec(&request, config).unwrap();
        let mut transport = ProtocolTransport::new(Trickle {
            data,
            pos: 0,
            chunk: 3,
        });

        assert_eq!(transport.read_request().unwrap(), request);
    }

    #[test]
    fn control_requests() {
        let mut transport = rewound(&[0x02, 0x03]);

        assert_eq!(transport.read_request().unwrap(), Request::Compute);
        assert_eq!(transport.read_request().unwrap(), Request::FetchResults);
        assert!(transport.read_request().unwrap_err().is_disconnect());
    }

    #[test]
    fn end_of_stream_inside_message_is_not_a_disconnect() {
        for frame in [&[0x01][..], &[0x01, 0, 0, 0, 1][..]] {
            let err = rewound(frame).read_request().unwrap_err();

            assert!(
                matches!(err, TransportError::Truncated { received: 0, .. }),
                "{err:?}"
            );
            assert!(!err.is_disconnect());
        }
    }

    #[test]
    fn unknown_discriminator() {
        let mut transport = rewound(&[0x09]);

        assert!(matches!(
            transport.read_request(),
            Err(TransportError::UnknownDiscriminator(0x09))
        ));
    }

    #[test]
    fn rejects_empty_array() {
        let mut transport = rewound(&[0x01, 0, 0, 0, 0, 0, 0, 0, 1]);

        assert!(matches!(
            transport.read_request(),
            Err(TransportError::InvalidArrayLength(0))
        ));
    }

    #[test]
    fn rejects_oversized_array_before_reading_payload() {
        let len = (MAX_ARRAY_LEN as u32 + 1).to_be_bytes();
        let mut frame = vec![0x01];
        frame.extend(len);
        frame.extend(1u32.to_be_bytes());
        let mut transport = rewound(&frame);

        assert!(matches!(
            transport.read_request(),
            Err(TransportError::InvalidArrayLength(100_001))
        ));
    }

    #[test]
    fn truncated_array_payload() {
        let mut transport = rewound(&[0x01, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 7]);

        let err = transport.read_request().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Truncated {
                expected: 8,
                received: 4
            }
        ));
        assert!(!err.is_disconnect());
    }

    #[test]
    fn compute_status_round_trip() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport
            .write_response(&Response::Compute(ComputeStatus::NoData))
            .unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        assert_eq!(
            transport.read_compute_status().unwrap(),
            ComputeStatus::NoData
        );
    }

    #[test]
    fn unknown_fetch_status() {
        let mut transport = rewound(&[0x05]);

        assert!(matches!(
            transport.read_fetch_reply(),
            Err(TransportError::UnknownStatus(0x05))
        ));
    }
}
