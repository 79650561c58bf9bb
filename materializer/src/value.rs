//! The size and alignment of a single staged value.

/// The size and alignment a collaborator reports for the data it stages.
///
/// Every entity consults its [`ValueType`] to decide how much room to reserve in the argument
/// struct and where within that struct its data must land.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueType {
    /// The size of the value, in bytes.
    pub byte_size: usize,
    /// The required alignment of the value, in bits.
    ///
    /// Reported in bits, not bytes, because that is the unit a debugger's own type system
    /// reports alignment in; see [`ValueType::byte_alignment`] for the byte-granular form the
    /// layout engine actually works in.
    pub bit_alignment: usize,
}

impl ValueType {
    /// Constructs a [`ValueType`] from a byte size and a byte alignment.
    #[must_use]
    pub const fn from_bytes(byte_size: usize, byte_alignment: usize) -> Self {
        Self {
            byte_size,
            bit_alignment: byte_alignment * 8,
        }
    }

    /// The required alignment of the value, in bytes, rounding up any sub-byte bit alignment.
    ///
    /// A bit alignment that is not a whole number of bytes (for example a single bit-field) is
    /// rounded up to the next whole byte: the layout engine only ever places values at
    /// byte-granular offsets.
    #[must_use]
    pub const fn byte_alignment(&self) -> usize {
        self.bit_alignment.div_ceil(8).next_power_of_two()
    }
}
