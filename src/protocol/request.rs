use bincode::{Encode, enc::Encoder, error::EncodeError};

/// Discriminator of a [`Request::SubmitArray`] frame.
pub const SUBMIT_ARRAY: u8 = 0x01;
/// Discriminator of a [`Request::Compute`] frame.
pub const COMPUTE: u8 = 0x02;
/// Discriminator of a [`Request::FetchResults`] frame.
pub const FETCH_RESULTS: u8 = 0x03;

/// Client to server message.
///
/// Encodes as `[u8 discriminator]`, followed for `SubmitArray` by
/// `[u32 len][u32 workers][i32 × len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SubmitArray { workers: u32, values: Vec<i32> },
    Compute,
    FetchResults,
}

impl Request {
    pub fn discriminator(&self) -> u8 {
        match self {
            Request::SubmitArray { .. } => SUBMIT_ARRAY,
            Request::Compute => COMPUTE,
            Request::FetchResults => FETCH_RESULTS,
        }
    }
}

impl Encode for Request {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.discriminator().encode(encoder)?;

        if let Request::SubmitArray { workers, values } = self {
            let len = u32::try_from(values.len())
                .map_err(|_| EncodeError::Other("array length does not fit in u32"))?;
            len.encode(encoder)?;
            workers.encode(encoder)?;
            for value in values {
                value.encode(encoder)?;
            }
        }
        Ok(())
    }
}
