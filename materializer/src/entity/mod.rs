//! The common interface every staged entity implements.

pub mod local;
pub mod persistent;
pub mod register;
pub mod result;
pub mod symbol;

use std::{cell::RefCell, rc::Rc};

use crate::{
    address::Address,
    collaborators::{Frame, MemoryMap, Target},
    error::Error,
    value::ValueType,
};

/// The shared state every [`Entity`] call is handed: where the argument struct lives, and how to
/// reach inferior memory and the current frame.
pub struct Context {
    /// The load address of the start of the argument struct.
    pub struct_address: Address,
    /// The memory map backing the current execution scope.
    pub memory_map: Rc<RefCell<dyn MemoryMap>>,
    /// The current frame, if the execution scope has one bound.
    pub frame: Option<Rc<RefCell<dyn Frame>>>,
    /// The current target, if the execution scope has one bound.
    pub target: Option<Rc<RefCell<dyn Target>>>,
    /// The `(bottom, top)` address range of the expression's own stack frame, supplied to
    /// [`Dematerializer::dematerialize`][crate::Dematerializer::dematerialize]. Only
    /// [`persistent::PersistentEntity`] consults this, to detect a program reference that cannot
    /// outlive the frame it was taken in.
    pub frame_bounds: Option<(Address, Address)>,
}

/// The context passed to [`Entity::materialize`].
pub type MaterializeContext = Context;
/// The context passed to [`Entity::dematerialize`].
pub type DematerializeContext = Context;
/// The context passed to [`Entity::wipe`].
pub type WipeContext = Context;

/// One member of an argument struct: a free variable, a result slot, or a persistent variable.
///
/// Implementors own exactly one slice of the argument struct, at the offset the
/// [`Materializer`][crate::Materializer] assigned them when they were added. They never see the
/// struct as a whole, only their own slot, reached through [`Context::slot_address`].
pub trait Entity {
    /// The size and alignment this entity needs reserved in the argument struct.
    fn value_type(&self) -> ValueType;

    /// Copies this entity's live value into its slot of the argument struct.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity's source value could not be read, or the slot could not be
    /// written.
    fn materialize(&mut self, offset: usize, ctx: &mut MaterializeContext) -> Result<(), Error>;

    /// Copies this entity's slot of the argument struct back into its live value.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot could not be read, or the entity's destination value could
    /// not be written. The result entity overrides the default implementation to always fail
    /// with [`Error::WrongEntry`], since it must be dematerialized through
    /// [`result::ResultEntity::dematerialize_into`] instead.
    fn dematerialize(&mut self, offset: usize, ctx: &mut DematerializeContext) -> Result<(), Error>;

    /// Releases any temporary inferior allocation this entity made during materialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation could not be freed.
    fn wipe(&mut self, offset: usize, ctx: &mut WipeContext) -> Result<(), Error>;
}

impl Context {
    /// The live address of this entity's slot, `offset` bytes into the argument struct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadAddressForm`] if the struct address is a file address rather than a
    /// load address: entities may only be materialized into memory the inferior can actually
    /// read and write right now.
    pub fn slot_address(&self, offset: usize) -> Result<Address, Error> {
        if !self.struct_address.is_load_address() {
            return Err(Error::BadAddressForm);
        }

        Ok(Address::load(
            self.struct_address.value + conversion::usize_to_u64(offset),
        ))
    }

    /// Reads `byte_size` bytes from this entity's slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot address is malformed or the read fails.
    pub fn read_slot(&self, offset: usize, byte_size: usize) -> Result<Vec<u8>, Error> {
        let address = self.slot_address(offset)?;
        let mut buf = vec![0u8; byte_size];
        self.memory_map
            .borrow()
            .read(address, &mut buf)
            .map_err(Error::ReadFailed)?;
        Ok(buf)
    }

    /// Writes `data` to this entity's slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot address is malformed or the write fails.
    pub fn write_slot(&self, offset: usize, data: &[u8]) -> Result<(), Error> {
        let address = self.slot_address(offset)?;
        self.memory_map
            .borrow_mut()
            .write(address, data)
            .map_err(Error::WriteFailed)
    }

    /// Writes `address` into this entity's slot, encoded as a `byte_size`-byte scalar in the
    /// memory map's byte order.
    ///
    /// Every entity that stages a pointer (persistent, local, result, and symbol slots) goes
    /// through this rather than a raw `to_le_bytes` write, so the pointer width follows the
    /// target's own [`TargetConfig`][crate::materializer::TargetConfig] instead of assuming a
    /// host-native 8 bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot address is malformed or the write fails.
    pub fn write_pointer(&self, offset: usize, address: Address, byte_size: usize) -> Result<(), Error> {
        let byte_order = self.memory_map.borrow().byte_order();
        let mut buf = vec![0u8; byte_size];
        byte_order.write_scalar(&mut buf, address.value, byte_size);
        self.write_slot(offset, &buf)
    }

    /// Reads a `byte_size`-byte scalar address out of this entity's slot, in the memory map's
    /// byte order.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot address is malformed or the read fails.
    pub fn read_pointer(&self, offset: usize, byte_size: usize) -> Result<Address, Error> {
        let bytes = self.read_slot(offset, byte_size)?;
        let byte_order = self.memory_map.borrow().byte_order();
        Ok(Address::load(byte_order.read_scalar(&bytes)))
    }
}
