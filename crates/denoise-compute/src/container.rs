//! Named-tensor container read by the CPU backend.
//!
//! # Layout
//!
//! All integers are little endian.
//!
//! ```text
//! magic    4 bytes  "DNZW"
//! version  u32      1
//! count    u32      number of tensors
//! tensor * count:
//!   name_len u16, name [u8; name_len] (UTF-8)
//!   rank     u8,  dims [u32; rank]
//!   data     [f32; product(dims)]
//! ```

use denoise_core::{Error, Result};

use crate::weights::Weights;

/// Container magic.
pub const MAGIC: [u8; 4] = *b"DNZW";
/// Supported container version.
pub const VERSION: u32 = 1;

/// One tensor in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

impl NamedTensor {
    pub fn new(name: impl Into<String>, dims: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            dims,
            data,
        }
    }
}

/// Ordered list of named tensors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightContainer {
    tensors: Vec<NamedTensor>,
}

impl WeightContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tensor: NamedTensor) {
        self.tensors.push(tensor);
    }

    pub fn tensors(&self) -> &[NamedTensor] {
        &self.tensors
    }

    pub fn get(&self, name: &str) -> Option<&NamedTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Serializes the container.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidWeights`] if a name, rank or dimension does not fit its
    /// field, or a tensor's data length disagrees with its dims.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&field::<u32>(self.tensors.len(), "tensor count")?.to_le_bytes());

        for t in &self.tensors {
            let expected: usize = t.dims.iter().product();
            if expected != t.data.len() {
                return Err(Error::invalid_weights(format!(
                    "tensor '{}' has {} values, dims {:?} need {expected}",
                    t.name,
                    t.data.len(),
                    t.dims
                )));
            }
            out.extend_from_slice(&field::<u16>(t.name.len(), "name length")?.to_le_bytes());
            out.extend_from_slice(t.name.as_bytes());
            out.push(field::<u8>(t.dims.len(), "rank")?);
            for &d in &t.dims {
                out.extend_from_slice(&field::<u32>(d, "dimension")?.to_le_bytes());
            }
            for v in &t.data {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        Ok(out)
    }

    /// Serializes into a [`Weights`] blob.
    pub fn to_weights(&self) -> Result<Weights> {
        Ok(Weights::from_bytes(self.encode()?))
    }

    /// Parses a container.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidWeights`] on a bad magic, unknown version, truncated
    /// data, invalid UTF-8 names or trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader { bytes, pos: 0 };

        if r.take(4)? != MAGIC {
            return Err(Error::invalid_weights("not a weight container (bad magic)"));
        }
        let version = r.u32()?;
        if version != VERSION {
            return Err(Error::invalid_weights(format!("unsupported container version {version}")));
        }

        let count = r.u32()? as usize;
        let mut tensors = Vec::new();
        for _ in 0..count {
            let name_len = r.u16()? as usize;
            let name = std::str::from_utf8(r.take(name_len)?)
                .map_err(|_| Error::invalid_weights("tensor name is not UTF-8"))?
                .to_owned();

            let rank = r.u8()? as usize;
            let mut dims = Vec::with_capacity(rank);
            for _ in 0..rank {
                dims.push(r.u32()? as usize);
            }

            let len = dims
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .and_then(|n| n.checked_mul(4))
                .ok_or_else(|| Error::invalid_weights(format!("tensor '{name}' is too large")))?;
            let raw = r.take(len)?;
            let data = raw
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(bytemuck::pod_read_unaligned(c)))
                .collect();

            tensors.push(NamedTensor { name, dims, data });
        }

        if r.pos != bytes.len() {
            return Err(Error::invalid_weights(format!(
                "{} trailing bytes after last tensor",
                bytes.len() - r.pos
            )));
        }
        Ok(Self { tensors })
    }
}

fn field<T: TryFrom<usize>>(value: usize, what: &str) -> Result<T> {
    T::try_from(value).map_err(|_| Error::invalid_weights(format!("{what} {value} out of range")))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::invalid_weights(format!("truncated container at byte {}", self.pos)))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(bytemuck::pod_read_unaligned(self.take(2)?)))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(bytemuck::pod_read_unaligned(self.take(4)?)))
    }
}
