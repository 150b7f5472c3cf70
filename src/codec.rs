use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufRead, Write};
use std::marker::PhantomData;

/// Turns one element into bytes and back.
///
/// Spill files are elements written back to back with no framing of their own,
/// so a codec must be self-delimiting. `decode` returns `Ok(None)` only when the
/// stream ends cleanly on an element boundary.
pub trait ElementCodec<T> {
    fn encode<W: Write>(&self, item: &T, writer: &mut W) -> Result<()>;

    fn decode<R: BufRead>(&self, reader: &mut R) -> Result<Option<T>>;
}

fn at_end<R: BufRead>(reader: &mut R) -> Result<bool> {
    Ok(reader.fill_buf()?.is_empty())
}

/// Native bincode encoding with the standard config.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> ElementCodec<T> for BincodeCodec<T>
where
    T: bincode::Encode + bincode::Decode<()>,
{
    fn encode<W: Write>(&self, item: &T, writer: &mut W) -> Result<()> {
        bincode::encode_into_std_write(item, writer, bincode::config::standard())?;
        Ok(())
    }

    fn decode<R: BufRead>(&self, reader: &mut R) -> Result<Option<T>> {
        if at_end(reader)? {
            return Ok(None);
        }
        let item = bincode::decode_from_std_read(reader, bincode::config::standard())?;
        Ok(Some(item))
    }
}

/// Bincode's serde bridge, for element types that only derive serde traits.
pub struct SerdeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SerdeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> ElementCodec<T> for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode<W: Write>(&self, item: &T, writer: &mut W) -> Result<()> {
        bincode::serde::encode_into_std_write(item, writer, bincode::config::standard())?;
        Ok(())
    }

    fn decode<R: BufRead>(&self, reader: &mut R) -> Result<Option<T>> {
        if at_end(reader)? {
            return Ok(None);
        }
        let item = bincode::serde::decode_from_std_read(reader, bincode::config::standard())?;
        Ok(Some(item))
    }
}
