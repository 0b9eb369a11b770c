//! Datapack codec.
//!
//! A small tagged envelope moving typed payloads between the service layer
//! and the transaction engine:
//!
//! ```text
//! +---------+---------+------+-----------------+
//! | tag u16 | size u16| kind | payload (size)  |
//! +---------+---------+------+-----------------+
//! ```
//!
//! Integers are big endian. `kind` tells whether the payload is inlined
//! ([`ContentKind::Content`], at most [`MAX_INLINE`] bytes) or lent by
//! reference ([`ContentKind::Pointer`]). A lent payload stays owned by the
//! writer; the borrow checker keeps it alive for as long as the envelope.
//!
//! Reads fail closed: the tag, size and kind of the envelope must match the
//! expected type exactly.

use core::any::Any;

use heapless::{String, Vec};
use no_std_net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const HEADER_LEN: usize = 5;
pub const MAX_INLINE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ContentKind {
    Pointer = 1,
    Content = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataPackError {
    /// Nothing was written to the envelope.
    Empty,
    /// Payload larger than [`MAX_INLINE`], or written past its declared size.
    Overflow,
    TagMismatch,
    SizeMismatch,
    KindMismatch,
    /// Payload bytes do not decode to the expected type.
    Malformed,
}

/// Types that travel through an envelope, inline or by reference.
pub trait Tagged: 'static {
    const TAG: u16;
}

/// Types with a fixed size inline encoding.
pub trait Packable: Tagged + Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError>;
    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError>;
}

enum External<'a> {
    Ref(&'a dyn Any),
    Mut(&'a mut dyn Any),
}

pub struct PackBuf<'a> {
    raw: [u8; HEADER_LEN + MAX_INLINE],
    len: usize,
    external: Option<External<'a>>,
}

impl Default for PackBuf<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> PackBuf<'a> {
    pub const fn new() -> Self {
        Self {
            raw: [0; HEADER_LEN + MAX_INLINE],
            len: 0,
            external: None,
        }
    }

    /// Envelope received as raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DataPackError> {
        if bytes.len() < HEADER_LEN {
            return Err(DataPackError::Empty);
        }
        if bytes.len() > HEADER_LEN + MAX_INLINE {
            return Err(DataPackError::Overflow);
        }
        let mut buf = Self::new();
        buf.raw[..bytes.len()].copy_from_slice(bytes);
        buf.len = bytes.len();
        if buf.size() as usize + HEADER_LEN != bytes.len() {
            return Err(DataPackError::SizeMismatch);
        }
        Ok(buf)
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.external = None;
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Header and inline payload, as they would travel on a byte channel.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw[..self.len]
    }

    pub fn tag(&self) -> Option<u16> {
        (!self.is_empty()).then(|| u16::from_be_bytes([self.raw[0], self.raw[1]]))
    }

    fn size(&self) -> u16 {
        u16::from_be_bytes([self.raw[2], self.raw[3]])
    }

    fn kind(&self) -> Option<ContentKind> {
        match self.raw[4] {
            1 => Some(ContentKind::Pointer),
            2 => Some(ContentKind::Content),
            _ => None,
        }
    }

    fn write_header(&mut self, tag: u16, size: usize, kind: ContentKind) {
        self.raw[0..2].copy_from_slice(&tag.to_be_bytes());
        self.raw[2..4].copy_from_slice(&(size as u16).to_be_bytes());
        self.raw[4] = kind as u8;
    }

    fn check_header(&self, tag: u16, size: usize, kind: ContentKind) -> Result<(), DataPackError> {
        if self.is_empty() {
            return Err(DataPackError::Empty);
        }
        if self.tag() != Some(tag) {
            return Err(DataPackError::TagMismatch);
        }
        if self.kind() != Some(kind) {
            return Err(DataPackError::KindMismatch);
        }
        if self.size() as usize != size {
            return Err(DataPackError::SizeMismatch);
        }
        Ok(())
    }

    /// Inline `value`. On error the envelope is left empty.
    pub fn write_struct<T: Packable>(&mut self, value: &T) -> Result<(), DataPackError> {
        self.clear();
        if T::SIZE > MAX_INLINE {
            return Err(DataPackError::Overflow);
        }
        let mut w = Writer::new(&mut self.raw[HEADER_LEN..HEADER_LEN + T::SIZE]);
        value.encode(&mut w)?;
        w.pad();
        self.write_header(T::TAG, T::SIZE, ContentKind::Content);
        self.len = HEADER_LEN + T::SIZE;
        Ok(())
    }

    pub fn read_struct<T: Packable>(&self) -> Result<T, DataPackError> {
        self.check_header(T::TAG, T::SIZE, ContentKind::Content)?;
        let mut r = Reader::new(&self.raw[HEADER_LEN..self.len]);
        T::decode(&mut r)
    }

    /// Decode into `out`, which is only touched on success.
    pub fn read_into<T: Packable>(&self, out: &mut T) -> Result<(), DataPackError> {
        *out = self.read_struct()?;
        Ok(())
    }

    /// Lend `value` by reference.
    pub fn write_ref<T: Tagged>(&mut self, value: &'a T) {
        self.clear();
        self.write_header(T::TAG, core::mem::size_of::<T>(), ContentKind::Pointer);
        self.len = HEADER_LEN;
        self.external = Some(External::Ref(value));
    }

    /// Lend `value` by mutable reference, for payloads the engine fills in.
    pub fn write_mut<T: Tagged>(&mut self, value: &'a mut T) {
        self.clear();
        self.write_header(T::TAG, core::mem::size_of::<T>(), ContentKind::Pointer);
        self.len = HEADER_LEN;
        self.external = Some(External::Mut(value));
    }

    pub fn read_ref<T: Tagged>(&self) -> Result<&T, DataPackError> {
        self.check_header(T::TAG, core::mem::size_of::<T>(), ContentKind::Pointer)?;
        let any: &dyn Any = match &self.external {
            Some(External::Ref(r)) => *r,
            Some(External::Mut(m)) => &**m,
            None => return Err(DataPackError::Malformed),
        };
        any.downcast_ref().ok_or(DataPackError::TagMismatch)
    }

    pub fn read_mut<T: Tagged>(&mut self) -> Result<&mut T, DataPackError> {
        self.check_header(T::TAG, core::mem::size_of::<T>(), ContentKind::Pointer)?;
        match &mut self.external {
            Some(External::Mut(m)) => m.downcast_mut().ok_or(DataPackError::TagMismatch),
            Some(External::Ref(_)) => Err(DataPackError::KindMismatch),
            None => Err(DataPackError::Malformed),
        }
    }
}

impl core::fmt::Debug for PackBuf<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PackBuf")
            .field("tag", &self.tag())
            .field("len", &self.len)
            .field("external", &self.external.is_some())
            .finish()
    }
}

/// Sequential writer over a payload slot.
pub struct Writer<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Writer<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> Result<(), DataPackError> {
        let end = self.pos + bytes.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(DataPackError::Overflow)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub fn u8(&mut self, v: u8) -> Result<(), DataPackError> {
        self.bytes(&[v])
    }

    pub fn bool(&mut self, v: bool) -> Result<(), DataPackError> {
        self.u8(v as u8)
    }

    pub fn u16(&mut self, v: u16) -> Result<(), DataPackError> {
        self.bytes(&v.to_be_bytes())
    }

    pub fn i16(&mut self, v: i16) -> Result<(), DataPackError> {
        self.bytes(&v.to_be_bytes())
    }

    pub fn u32(&mut self, v: u32) -> Result<(), DataPackError> {
        self.bytes(&v.to_be_bytes())
    }

    /// Length byte followed by `N` bytes, zero padded.
    pub fn str<const N: usize>(&mut self, s: &String<N>) -> Result<(), DataPackError> {
        self.u8(s.len() as u8)?;
        self.bytes(s.as_bytes())?;
        self.zeros(N - s.len())
    }

    /// One kind byte (0, 4 or 6) followed by 16 address bytes.
    pub fn ip(&mut self, ip: Option<IpAddr>) -> Result<(), DataPackError> {
        let mut octets = [0u8; 16];
        let kind = match ip {
            None => 0,
            Some(IpAddr::V4(v4)) => {
                octets[..4].copy_from_slice(&v4.octets());
                4
            }
            Some(IpAddr::V6(v6)) => {
                octets.copy_from_slice(&v6.octets());
                6
            }
        };
        self.u8(kind)?;
        self.bytes(&octets)
    }

    fn zeros(&mut self, n: usize) -> Result<(), DataPackError> {
        let end = self.pos + n;
        self.buf
            .get_mut(self.pos..end)
            .ok_or(DataPackError::Overflow)?
            .fill(0);
        self.pos = end;
        Ok(())
    }

    fn pad(&mut self) {
        self.buf[self.pos..].fill(0);
        self.pos = self.buf.len();
    }
}

/// Sequential reader over a payload slot.
pub struct Reader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    pub fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'b [u8], DataPackError> {
        let end = self.pos + n;
        let out = self.buf.get(self.pos..end).ok_or(DataPackError::Malformed)?;
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DataPackError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, DataPackError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DataPackError::Malformed),
        }
    }

    pub fn u16(&mut self) -> Result<u16, DataPackError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16, DataPackError> {
        let b = self.bytes(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, DataPackError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn str<const N: usize>(&mut self) -> Result<String<N>, DataPackError> {
        let len = self.u8()? as usize;
        if len > N {
            return Err(DataPackError::Malformed);
        }
        let raw = self.bytes(N)?;
        let text = core::str::from_utf8(&raw[..len]).map_err(|_| DataPackError::Malformed)?;
        let mut s = String::new();
        s.push_str(text).map_err(|_| DataPackError::Malformed)?;
        Ok(s)
    }

    pub fn ip(&mut self) -> Result<Option<IpAddr>, DataPackError> {
        let kind = self.u8()?;
        let b = self.bytes(16)?;
        match kind {
            0 => Ok(None),
            4 => Ok(Some(IpAddr::V4(Ipv4Addr::new(b[0], b[1], b[2], b[3])))),
            6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                Ok(Some(IpAddr::V6(Ipv6Addr::from(octets))))
            }
            _ => Err(DataPackError::Malformed),
        }
    }
}

/// Encoded size of a string field of capacity `N`.
pub const fn str_size(n: usize) -> usize {
    1 + n
}

pub const IP_SIZE: usize = 17;

/// Byte vector field of capacity `N`: length `u16` then `N` bytes.
pub fn write_vec<const N: usize>(w: &mut Writer<'_>, v: &Vec<u8, N>) -> Result<(), DataPackError> {
    w.u16(v.len() as u16)?;
    w.bytes(v)?;
    w.zeros(N - v.len())
}

pub fn read_vec<const N: usize>(r: &mut Reader<'_>) -> Result<Vec<u8, N>, DataPackError> {
    let len = r.u16()? as usize;
    if len > N {
        return Err(DataPackError::Malformed);
    }
    let raw = r.bytes(N)?;
    Vec::from_slice(&raw[..len]).map_err(|_| DataPackError::Malformed)
}
