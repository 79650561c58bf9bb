//! Reserves a slot for an expression's return value and promotes it to a persistent variable.

use std::{cell::RefCell, rc::Rc};

use log::{debug, trace};

use crate::{
    address::Address,
    collaborators::{PersistentStore, PersistentVariable, PersistentVariableFlags},
    entity::{DematerializeContext, Entity, MaterializeContext, WipeContext},
    error::Error,
    permissions::{AllocationPolicy, Permissions},
    value::ValueType,
};

/// A temporary inferior allocation backing the result slot until it is promoted to a persistent
/// variable.
#[derive(Clone, Copy, Debug)]
struct TemporaryAllocation {
    /// Where the result currently lives.
    address: Address,
}

/// Stages the expression's result. Unlike every other entity, this one is dematerialized through
/// [`ResultEntity::dematerialize_into`] rather than the generic [`Entity::dematerialize`], since
/// producing a persistent variable requires an out-parameter the shared trait has no room for.
pub struct ResultEntity {
    /// The declared type of the result.
    value_type: ValueType,
    /// `true` if the expression program, not this crate, will fill the slot with an address it
    /// chooses.
    is_program_reference: bool,
    /// `true` if the promoted persistent variable's inferior allocation should survive past this
    /// materialize/dematerialize cycle.
    keep_in_memory: bool,
    /// The size and alignment of the pointer slot this entity occupies, per the materializer's
    /// [`TargetConfig`][crate::materializer::TargetConfig].
    slot_type: ValueType,
    /// Present while this entity owns a scratch allocation for the result.
    temporary_allocation: Option<TemporaryAllocation>,
}

impl ResultEntity {
    /// Creates a result entity of the given type and policy.
    #[must_use]
    pub const fn new(
        value_type: ValueType,
        is_program_reference: bool,
        keep_in_memory: bool,
        slot_type: ValueType,
    ) -> Self {
        Self {
            value_type,
            is_program_reference,
            keep_in_memory,
            slot_type,
            temporary_allocation: None,
        }
    }

    /// The specialized dematerialize entry point for the result entity: reads the address the
    /// expression left in the slot, mints a fresh persistent variable, and copies the result's
    /// bytes into it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoTarget`] if the execution scope has no target to mint a persistent
    /// variable from, or propagates a read/deallocation failure from the memory map.
    pub fn dematerialize_into(
        &mut self,
        offset: usize,
        ctx: &mut DematerializeContext,
        store: &mut dyn PersistentStore,
    ) -> Result<Rc<RefCell<PersistentVariable>>, Error> {
        trace!("ResultEntity::dematerialize_into at offset {offset}");
        if ctx.target.is_none() {
            return Err(Error::NoTarget);
        }

        let address = ctx.read_pointer(offset, self.slot_type.byte_size)?;

        let name = store.next_variable_name();
        let record = store.create_variable(&name, self.value_type);

        let mut data = vec![0u8; self.value_type.byte_size];
        ctx.memory_map
            .borrow()
            .read(address, &mut data)
            .map_err(Error::ReadFailed)?;

        {
            let mut record = record.borrow_mut();
            record.live_location = Some(address);
            record.data = data;

            record.flags = if !self.keep_in_memory && self.temporary_allocation.is_some() {
                PersistentVariableFlags::NEEDS_ALLOCATION
            } else {
                PersistentVariableFlags::IS_LLDB_ALLOCATED
            };
        }

        if !self.keep_in_memory {
            if let Some(temporary) = self.temporary_allocation.take() {
                ctx.memory_map
                    .borrow_mut()
                    .deallocate(temporary.address)
                    .map_err(Error::DeallocationFailed)?;
                debug!("freed result scratch allocation at {}", temporary.address);
            }
        }
        self.temporary_allocation = None;

        Ok(record)
    }
}

impl Entity for ResultEntity {
    fn value_type(&self) -> ValueType {
        self.slot_type
    }

    fn materialize(&mut self, offset: usize, ctx: &mut MaterializeContext) -> Result<(), Error> {
        trace!("ResultEntity::materialize at offset {offset}");
        if self.is_program_reference {
            return Ok(());
        }

        if self.temporary_allocation.is_some() {
            return Err(Error::DoubleAllocation);
        }

        let byte_alignment = self.value_type.byte_alignment();
        let address = ctx
            .memory_map
            .borrow_mut()
            .allocate(
                self.value_type.byte_size,
                byte_alignment,
                Permissions::READ_WRITE,
                AllocationPolicy::Mirror,
            )
            .map_err(Error::AllocationFailed)?;
        debug!(
            "allocated {} bytes at {address} for expression result",
            self.value_type.byte_size
        );

        self.temporary_allocation = Some(TemporaryAllocation { address });

        ctx.write_pointer(offset, address, self.slot_type.byte_size)
    }

    fn dematerialize(
        &mut self,
        _offset: usize,
        _ctx: &mut DematerializeContext,
    ) -> Result<(), Error> {
        Err(Error::WrongEntry)
    }

    fn wipe(&mut self, offset: usize, ctx: &mut WipeContext) -> Result<(), Error> {
        trace!("ResultEntity::wipe at offset {offset}");
        if !self.keep_in_memory {
            if let Some(temporary) = self.temporary_allocation.take() {
                ctx.memory_map
                    .borrow_mut()
                    .deallocate(temporary.address)
                    .map_err(Error::DeallocationFailed)?;
                debug!("freed result scratch allocation at {}", temporary.address);
            }
        }
        self.temporary_allocation = None;
        Ok(())
    }
}
