//! Addresses in inferior-process memory.

use core::{fmt, mem::size_of};

/// Distinguishes a relocated, runtime address from a static, on-disk one.
///
/// Mirrors the load/file address distinction a debugger's own address abstraction makes: a file
/// address is only meaningful relative to an object file that has not yet been mapped into the
/// inferior; a load address is where that byte actually lives once the inferior is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// A runtime address in the inferior's address space.
    Load,
    /// A static address from an object file, not yet relocated.
    File,
}

/// An address, tagged with whether it is a [load or file address][AddressKind].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    /// The raw address value.
    pub value: u64,
    /// Whether [`Address::value`] is a load address or a file address.
    pub kind: AddressKind,
}

impl Address {
    /// Constructs a [`Address`] tagged as a load address.
    #[must_use]
    pub const fn load(value: u64) -> Self {
        Self {
            value,
            kind: AddressKind::Load,
        }
    }

    /// Constructs a [`Address`] tagged as a file address.
    #[must_use]
    pub const fn file(value: u64) -> Self {
        Self {
            value,
            kind: AddressKind::File,
        }
    }

    /// Returns `true` if this [`Address`] is a load address.
    #[must_use]
    pub const fn is_load_address(self) -> bool {
        matches!(self.kind, AddressKind::Load)
    }

    /// Returns `true` if the address lies within `[bottom, top]`, inclusive.
    #[must_use]
    pub const fn within(self, bottom: Self, top: Self) -> bool {
        self.value >= bottom.value && self.value <= top.value
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AddressKind::Load => write!(f, "0x{:x} (load)", self.value),
            AddressKind::File => write!(f, "0x{:x} (file)", self.value),
        }
    }
}

/// Byte order used when encoding or decoding scalars in inferior memory.
///
/// Reported by the [`MemoryMap`][crate::collaborators::MemoryMap]; this crate never swaps the
/// byte order of opaque user payloads, only of the addresses and scalars it writes itself (see
/// the Non-goals in the crate's governing specification).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

impl ByteOrder {
    /// Encodes `value` into the first `byte_count` bytes of `out`, in this [`ByteOrder`].
    ///
    /// # Panics
    ///
    /// Panics if `byte_count` is greater than 8 or `out` is shorter than `byte_count`.
    pub fn write_scalar(self, out: &mut [u8], value: u64, byte_count: usize) {
        assert!(byte_count <= size_of::<u64>());
        let bytes = match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        };

        match self {
            Self::Little => out[..byte_count].copy_from_slice(&bytes[..byte_count]),
            Self::Big => {
                let start = bytes.len() - byte_count;
                out[..byte_count].copy_from_slice(&bytes[start..]);
            }
        }
    }

    /// Decodes the first `bytes.len()` bytes of `bytes` as a scalar in this [`ByteOrder`].
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than 8 bytes.
    #[must_use]
    pub fn read_scalar(self, bytes: &[u8]) -> u64 {
        assert!(bytes.len() <= size_of::<u64>());
        let mut buf = [0u8; size_of::<u64>()];

        match self {
            Self::Little => {
                buf[..bytes.len()].copy_from_slice(bytes);
                u64::from_le_bytes(buf)
            }
            Self::Big => {
                let start = buf.len() - bytes.len();
                buf[start..].copy_from_slice(bytes);
                u64::from_be_bytes(buf)
            }
        }
    }
}
