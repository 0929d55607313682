use bincode::{Encode, enc::Encoder, error::EncodeError};

use crate::stats::Summary;

/// Status byte answering a Compute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ComputeStatus {
    Ok = 0x00,
    NoData = 0x01,
    /// A pending array asked for zero workers or more than the server allows.
    Rejected = 0x02,
}

/// Answer to a FetchResults request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchReply {
    /// Results in submission order.
    Done(Vec<Summary>),
    InProgress,
    NoData,
}

impl FetchReply {
    pub const DONE: u8 = 0x00;
    pub const IN_PROGRESS: u8 = 0x01;
    pub const NO_DATA: u8 = 0x02;

    pub fn status(&self) -> u8 {
        match self {
            FetchReply::Done(_) => Self::DONE,
            FetchReply::InProgress => Self::IN_PROGRESS,
            FetchReply::NoData => Self::NO_DATA,
        }
    }
}

impl TryFrom<u8> for ComputeStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ComputeStatus::Ok),
            0x01 => Ok(ComputeStatus::NoData),
            0x02 => Ok(ComputeStatus::Rejected),
            other => Err(other),
        }
    }
}

/// Server to client message.
///
/// The wire form carries no type tag; a client knows which reply to expect
/// from the request it sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Compute(ComputeStatus),
    Fetch(FetchReply),
}

impl Encode for Response {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        match self {
            Response::Compute(status) => (*status as u8).encode(encoder),
            Response::Fetch(reply) => {
                reply.status().encode(encoder)?;
                if let FetchReply::Done(results) = reply {
                    wire_len(results.len())?.encode(encoder)?;
                    for summary in results {
                        summary.encode(encoder)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// `[u32 modeSize][i32 × modeSize][f64 median]`; the median is written as
/// its IEEE-754 bit pattern under the big-endian configuration.
impl Encode for Summary {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        wire_len(self.mode.len())?.encode(encoder)?;
        for value in &self.mode {
            value.encode(encoder)?;
        }
        self.median.encode(encoder)
    }
}

fn wire_len(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::Other("length does not fit in u32"))
}
