//! The debugger-side types this crate stages data through, but does not implement itself.
//!
//! Everything in this module is a trait or a plain descriptor. The concrete frame, target, and
//! memory map live in the surrounding debugger; this crate only ever borrows them for the
//! duration of a single materialize, dematerialize, or wipe call.

use std::{cell::RefCell, rc::Rc};

use crate::{address::{Address, ByteOrder}, error::CollaboratorError, permissions::{AllocationPolicy, Permissions}, value::ValueType};

/// Inferior-process memory, as seen from the host.
///
/// Grounds every address-producing and address-consuming operation this crate performs: all
/// temporary allocations are requested here, and all reads and writes of staged data pass
/// through here.
pub trait MemoryMap {
    /// Allocates `byte_size` bytes of inferior memory with the given alignment and permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the inferior has no room, or refuses the requested permissions.
    fn allocate(
        &mut self,
        byte_size: usize,
        byte_alignment: usize,
        permissions: Permissions,
        policy: AllocationPolicy,
    ) -> Result<Address, CollaboratorError>;

    /// Releases a region previously returned by [`MemoryMap::allocate`].
    ///
    /// # Errors
    ///
    /// Returns an error if `address` was not an outstanding allocation from this map.
    fn deallocate(&mut self, address: Address) -> Result<(), CollaboratorError>;

    /// Reads `out.len()` bytes starting at `address` into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the requested range is unmapped or unreadable.
    fn read(&self, address: Address, out: &mut [u8]) -> Result<(), CollaboratorError>;

    /// Writes `data` to inferior memory starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the requested range is unmapped or unwritable.
    fn write(&mut self, address: Address, data: &[u8]) -> Result<(), CollaboratorError>;

    /// The byte order of the inferior process.
    fn byte_order(&self) -> ByteOrder;

    /// The size, in bytes, of a pointer in the inferior process.
    fn address_byte_size(&self) -> usize;
}

/// The debuggee process and its static properties.
///
/// A thin handle; most of what this crate needs from a target (byte order, pointer size) is
/// actually exposed through [`MemoryMap`], but a live [`Target`] is still required before any
/// entity may materialize, matching the parent debugger's own rule that every expression
/// evaluation binds to a target.
pub trait Target {
    /// A human-readable identifier for the target, used only in log messages.
    fn description(&self) -> String;
}

/// Whatever a [`Frame`] or a bare [`MemoryMap`] can provide about the context an expression runs
/// in.
///
/// [`Materializer::materialize`][crate::Materializer::materialize] accepts anything implementing
/// this trait so that expressions with no frame (for example, ones evaluated at the target level)
/// can still stage a result or a persistent variable.
pub trait ExecutionScope {
    /// The target this scope runs against, if any.
    fn target(&self) -> Option<Rc<RefCell<dyn Target>>>;

    /// The memory map this scope stages data through, if any.
    fn memory_map(&self) -> Option<Rc<RefCell<dyn MemoryMap>>>;
}

/// A single stack frame in the inferior.
///
/// Extends [`ExecutionScope`] with the two things only a bound frame can provide: a register
/// context, and named local variables.
pub trait Frame: ExecutionScope {
    /// The register context for this frame, if the frame is still live.
    fn register_context(&self) -> Option<Rc<RefCell<dyn RegisterContext>>>;

    /// Looks up a named local variable or argument visible in this frame.
    fn variable(&self, name: &str) -> Option<VariableDescriptor>;
}

/// A named machine register, and the value type a read of it produces.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegisterInfo {
    /// The register's name, as it would appear in an expression.
    pub name: String,
    /// The size and alignment of the register's value.
    pub value_type: ValueType,
}

/// Access to the machine registers of a single [`Frame`].
pub trait RegisterContext {
    /// Looks up a register by name.
    fn register_info(&self, name: &str) -> Option<RegisterInfo>;

    /// Reads the current value of `register`.
    ///
    /// # Errors
    ///
    /// Returns an error if the register could not be read from the live frame.
    fn read_register(&self, register: &RegisterInfo) -> Result<Vec<u8>, CollaboratorError>;

    /// Writes `data` into `register`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not have the size the register's
    /// [`ValueType`] declares, or the register could not be written.
    fn write_register(
        &mut self,
        register: &RegisterInfo,
        data: &[u8],
    ) -> Result<(), CollaboratorError>;
}

/// An addressable or register-backed value exposed by a local variable, a symbol, or an
/// expression result.
///
/// This is the common surface [`LocalEntity`][crate::entity::local::LocalEntity] and
/// [`ResultEntity`][crate::entity::result::ResultEntity] stage through; whether the backing
/// storage happens to be inferior memory or a host-side buffer is invisible to the entity.
pub trait ValueObject {
    /// The size and alignment of this value.
    fn value_type(&self) -> ValueType;

    /// The live address of this value in inferior memory, if it has one.
    ///
    /// A `None` return means the value currently exists only in the host-side buffer returned by
    /// [`ValueObject::load_data`], and an entity wishing to reuse its storage in place must fall
    /// back to copying.
    fn address(&self) -> Option<Address>;

    /// Reads this value's current bytes, wherever they live.
    ///
    /// # Errors
    ///
    /// Returns an error if the value's backing storage could not be read.
    fn load_data(&self) -> Result<Vec<u8>, CollaboratorError>;

    /// Writes `data` back to this value's backing storage.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not match this value's declared size, or the backing
    /// storage could not be written.
    fn store_data(&mut self, data: &[u8]) -> Result<(), CollaboratorError>;
}

/// A named local variable or argument, as resolved from a [`Frame`].
pub struct VariableDescriptor {
    /// The variable's declared type.
    pub value_type: ValueType,
    /// `true` if the variable's declared type is itself a reference type, in which case the
    /// bytes [`ValueObject::load_data`] returns are a referent address, not the referent's data.
    pub is_reference: bool,
    /// The live value backing this variable.
    pub value: Rc<RefCell<dyn ValueObject>>,
}

/// A named, process-lifetime symbol (for example a global or a function).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SymbolInfo {
    /// The symbol's linkage name.
    pub name: String,
    /// The symbol's relocated, runtime address, if the target has loaded it.
    pub load_address: Option<Address>,
    /// The symbol's static, on-disk address, used when no load address is available.
    pub file_address: Option<Address>,
    /// The size and alignment of the data the symbol names.
    pub value_type: ValueType,
}

impl SymbolInfo {
    /// The address to stage: [`SymbolInfo::load_address`] if the target has relocated the
    /// symbol, otherwise [`SymbolInfo::file_address`].
    #[must_use]
    pub const fn preferred_address(&self) -> Option<Address> {
        match self.load_address {
            Some(address) => Some(address),
            None => self.file_address,
        }
    }
}

/// Flags tracking a persistent expression-result variable's (for example `$0`, or a
/// user-declared `$my_var`) allocation state and lifetime policy.
///
/// Named and grouped to match the record fields a debugger's own persistent-variable table
/// tracks: whether the record still needs an inferior allocation, whether its live location is a
/// program address rather than one this crate allocated, and whether its value must be
/// snapshotted into the host-side buffer before the inferior allocation can be freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PersistentVariableFlags(u8);

impl PersistentVariableFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// The record has no live inferior allocation yet and needs one before it can be
    /// materialized.
    pub const NEEDS_ALLOCATION: Self = Self(1 << 0);
    /// The record's live location is an address the expression program chose, not one this crate
    /// allocated.
    pub const IS_PROGRAM_REFERENCE: Self = Self(1 << 1);
    /// The record's live location is an inferior allocation this crate made and owns.
    pub const IS_LLDB_ALLOCATED: Self = Self(1 << 2);
    /// The record's inferior allocation must survive past this materialize/dematerialize cycle.
    pub const KEEP_IN_TARGET: Self = Self(1 << 3);
    /// The record's host-side buffer is stale and must be refreshed from the inferior before the
    /// allocation backing it can be freed.
    pub const NEEDS_FREEZE_DRY: Self = Self(1 << 4);

    /// Returns `true` if every bit set in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns a copy of `self` with every bit in `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl core::ops::BitOr for PersistentVariableFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for PersistentVariableFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A persistent expression-result variable, kept alive across expression evaluations by a
/// [`PersistentStore`].
pub struct PersistentVariable {
    /// The flags controlling allocation and lifetime policy for this record.
    pub flags: PersistentVariableFlags,
    /// The size and alignment of the variable's value.
    pub value_type: ValueType,
    /// The variable's current live location in inferior memory, if one has been established.
    pub live_location: Option<Address>,
    /// The host-side snapshot of the variable's value.
    pub data: Vec<u8>,
}

/// The debugger's table of persistent expression-result variables.
///
/// [`PersistentEntity`][crate::entity::persistent::PersistentEntity] looks up entries here, and
/// [`ResultEntity`][crate::entity::result::ResultEntity] mints fresh ones after an expression
/// runs; the store itself owns the variables' lifetime, which can span many
/// materialize/dematerialize cycles across different expressions.
pub trait PersistentStore {
    /// Looks up an existing persistent variable by name.
    fn variable(&self, name: &str) -> Option<Rc<RefCell<PersistentVariable>>>;

    /// Mints the name the next anonymous persistent variable (for example `$3`) should use.
    fn next_variable_name(&mut self) -> String;

    /// Creates a fresh persistent variable of the given type, with no live location yet, and
    /// registers it under `name`.
    fn create_variable(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> Rc<RefCell<PersistentVariable>>;
}
