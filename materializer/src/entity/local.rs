//! Stages a frame-local variable or argument.

use log::{debug, trace};

use crate::{
    address::Address,
    collaborators::VariableDescriptor,
    entity::{DematerializeContext, Entity, MaterializeContext, WipeContext},
    error::Error,
    permissions::{AllocationPolicy, Permissions},
    value::ValueType,
};

/// A temporary inferior allocation made to give a non-addressable variable a stable location for
/// the duration of one materialize/dematerialize cycle.
#[derive(Clone, Copy, Debug)]
struct TemporaryAllocation {
    /// Where the spilled copy of the variable's value lives.
    address: Address,
    /// How many bytes were allocated there.
    byte_size: usize,
}

/// Stages a local variable: by writing a pointer to its existing address, or, when it has none,
/// by spilling its value into a scratch allocation and pointing at that instead.
pub struct LocalEntity {
    /// The variable this entity stages.
    descriptor: VariableDescriptor,
    /// The size and alignment of the pointer slot this entity occupies, per the materializer's
    /// [`TargetConfig`][crate::materializer::TargetConfig].
    slot_type: ValueType,
    /// Present iff the variable had no stable address and was spilled to scratch memory.
    temporary_allocation: Option<TemporaryAllocation>,
}

impl LocalEntity {
    /// Wraps a resolved variable for staging.
    #[must_use]
    pub const fn new(descriptor: VariableDescriptor, slot_type: ValueType) -> Self {
        Self {
            descriptor,
            slot_type,
            temporary_allocation: None,
        }
    }
}

impl Entity for LocalEntity {
    fn value_type(&self) -> ValueType {
        self.slot_type
    }

    fn materialize(&mut self, offset: usize, ctx: &mut MaterializeContext) -> Result<(), Error> {
        trace!("LocalEntity::materialize at offset {offset}");
        if self.descriptor.is_reference {
            let data = self
                .descriptor
                .value
                .borrow()
                .load_data()
                .map_err(Error::ReadFailed)?;
            let referent = ctx.memory_map.borrow().byte_order().read_scalar(&data);
            return ctx.write_pointer(offset, Address::load(referent), self.slot_type.byte_size);
        }

        if let Some(address) = self.descriptor.value.borrow().address() {
            return ctx.write_pointer(offset, address, self.slot_type.byte_size);
        }

        if self.temporary_allocation.is_some() {
            return Err(Error::DoubleAllocation);
        }

        let value_type = self.descriptor.value.borrow().value_type();
        let byte_alignment = value_type.byte_alignment();
        let address = ctx
            .memory_map
            .borrow_mut()
            .allocate(
                value_type.byte_size,
                byte_alignment,
                Permissions::READ_WRITE,
                AllocationPolicy::Mirror,
            )
            .map_err(Error::AllocationFailed)?;
        debug!(
            "allocated {} bytes at {address} for non-addressable local",
            value_type.byte_size
        );

        let data = self
            .descriptor
            .value
            .borrow()
            .load_data()
            .map_err(Error::ReadFailed)?;
        if data.len() != value_type.byte_size {
            return Err(Error::SizeMismatch {
                expected: value_type.byte_size,
                actual: data.len(),
            });
        }

        ctx.memory_map
            .borrow_mut()
            .write(address, &data)
            .map_err(Error::WriteFailed)?;

        self.temporary_allocation = Some(TemporaryAllocation {
            address,
            byte_size: value_type.byte_size,
        });

        ctx.write_pointer(offset, address, self.slot_type.byte_size)
    }

    fn dematerialize(
        &mut self,
        offset: usize,
        ctx: &mut DematerializeContext,
    ) -> Result<(), Error> {
        trace!("LocalEntity::dematerialize at offset {offset}");
        let Some(temporary) = self.temporary_allocation.take() else {
            return Ok(());
        };

        let mut data = vec![0u8; temporary.byte_size];
        ctx.memory_map
            .borrow()
            .read(temporary.address, &mut data)
            .map_err(Error::ReadFailed)?;

        self.descriptor
            .value
            .borrow_mut()
            .store_data(&data)
            .map_err(Error::WriteFailed)?;

        ctx.memory_map
            .borrow_mut()
            .deallocate(temporary.address)
            .map_err(Error::DeallocationFailed)?;
        debug!("freed local variable scratch allocation at {}", temporary.address);
        Ok(())
    }

    fn wipe(&mut self, offset: usize, ctx: &mut WipeContext) -> Result<(), Error> {
        trace!("LocalEntity::wipe at offset {offset}");
        let Some(temporary) = self.temporary_allocation.take() else {
            return Ok(());
        };

        ctx.memory_map
            .borrow_mut()
            .deallocate(temporary.address)
            .map_err(Error::DeallocationFailed)?;
        debug!("freed local variable scratch allocation at {}", temporary.address);
        Ok(())
    }
}
