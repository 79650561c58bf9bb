//! Stages a user-visible persistent `$`-variable.

use std::{cell::RefCell, rc::Rc};

use log::{debug, trace, warn};

use crate::{
    collaborators::{PersistentVariable, PersistentVariableFlags},
    entity::{DematerializeContext, Entity, MaterializeContext, WipeContext},
    error::Error,
    permissions::{AllocationPolicy, Permissions},
    value::ValueType,
};

/// The alignment a persistent variable's inferior backing store is always allocated with,
/// regardless of the variable's own declared type alignment.
const PERSISTENT_ALLOCATION_ALIGNMENT: usize = 8;

/// Stages a persistent variable: one that may already have a live inferior allocation from an
/// earlier expression, or may need a fresh one.
pub struct PersistentEntity {
    /// The record this entity stages.
    variable: Rc<RefCell<PersistentVariable>>,
    /// The size and alignment of the pointer slot this entity occupies, per the materializer's
    /// [`TargetConfig`][crate::materializer::TargetConfig].
    slot_type: ValueType,
}

impl PersistentEntity {
    /// Wraps a persistent-variable record for staging.
    #[must_use]
    pub const fn new(variable: Rc<RefCell<PersistentVariable>>, slot_type: ValueType) -> Self {
        Self { variable, slot_type }
    }
}

impl Entity for PersistentEntity {
    fn value_type(&self) -> ValueType {
        self.slot_type
    }

    fn materialize(&mut self, offset: usize, ctx: &mut MaterializeContext) -> Result<(), Error> {
        trace!("PersistentEntity::materialize at offset {offset}");
        let mut variable = self.variable.borrow_mut();

        if variable.flags.contains(PersistentVariableFlags::NEEDS_ALLOCATION) {
            let byte_size = variable.value_type.byte_size;
            let address = ctx
                .memory_map
                .borrow_mut()
                .allocate(
                    byte_size,
                    PERSISTENT_ALLOCATION_ALIGNMENT,
                    Permissions::READ_WRITE,
                    AllocationPolicy::Mirror,
                )
                .map_err(Error::AllocationFailed)?;
            debug!("allocated {byte_size} bytes at {address} for persistent variable");

            variable.live_location = Some(address);

            if variable.flags.contains(PersistentVariableFlags::KEEP_IN_TARGET) {
                variable.flags = variable
                    .flags
                    .without(PersistentVariableFlags::NEEDS_ALLOCATION);
            }

            let data = variable.data.clone();
            ctx.memory_map
                .borrow_mut()
                .write(address, &data)
                .map_err(Error::WriteFailed)?;
        }

        let can_write_pointer = (variable
            .flags
            .contains(PersistentVariableFlags::IS_PROGRAM_REFERENCE)
            && variable.live_location.is_some())
            || variable.flags.contains(PersistentVariableFlags::IS_LLDB_ALLOCATED);

        if !can_write_pointer {
            return Err(Error::NotMaterialized);
        }

        let live_location = variable.live_location.expect("checked above");
        drop(variable);
        ctx.write_pointer(offset, live_location, self.slot_type.byte_size)
    }

    fn dematerialize(
        &mut self,
        offset: usize,
        ctx: &mut DematerializeContext,
    ) -> Result<(), Error> {
        trace!("PersistentEntity::dematerialize at offset {offset}");
        {
            let variable = self.variable.borrow();
            let can_read_back = variable
                .flags
                .contains(PersistentVariableFlags::IS_LLDB_ALLOCATED)
                || variable
                    .flags
                    .contains(PersistentVariableFlags::IS_PROGRAM_REFERENCE);
            if !can_read_back {
                return Err(Error::NotDematerialized);
            }
        }

        let needs_resolution = {
            let variable = self.variable.borrow();
            variable
                .flags
                .contains(PersistentVariableFlags::IS_PROGRAM_REFERENCE)
                && variable.live_location.is_none()
        };

        if needs_resolution {
            let address = ctx.read_pointer(offset, self.slot_type.byte_size)?;
            self.variable.borrow_mut().live_location = Some(address);

            if let Some((frame_bottom, frame_top)) = ctx.frame_bounds {
                if address.within(frame_bottom, frame_top) {
                    warn!(
                        "persistent variable's program reference {address} lies within the \
                         expression's own frame [{frame_bottom}, {frame_top}]; forcing freeze-dry"
                    );
                    let mut variable = self.variable.borrow_mut();
                    variable.flags |= PersistentVariableFlags::IS_LLDB_ALLOCATED
                        | PersistentVariableFlags::NEEDS_ALLOCATION
                        | PersistentVariableFlags::NEEDS_FREEZE_DRY;
                    variable.flags = variable
                        .flags
                        .without(PersistentVariableFlags::IS_PROGRAM_REFERENCE);
                }
            }
        }

        let live_location = self
            .variable
            .borrow()
            .live_location
            .ok_or(Error::BadAddressForm)?;
        if !live_location.is_load_address() {
            return Err(Error::BadAddressForm);
        }

        let needs_freeze_dry = {
            let variable = self.variable.borrow();
            variable
                .flags
                .contains(PersistentVariableFlags::NEEDS_FREEZE_DRY)
                || variable.flags.contains(PersistentVariableFlags::KEEP_IN_TARGET)
        };

        if needs_freeze_dry {
            let byte_size = self.variable.borrow().value_type.byte_size;
            let mut buf = vec![0u8; byte_size];
            ctx.memory_map
                .borrow()
                .read(live_location, &mut buf)
                .map_err(Error::ReadFailed)?;

            let mut variable = self.variable.borrow_mut();
            variable.data = buf;
            variable.flags = variable
                .flags
                .without(PersistentVariableFlags::NEEDS_FREEZE_DRY);
        }

        let should_free = {
            let variable = self.variable.borrow();
            variable.flags.contains(PersistentVariableFlags::NEEDS_ALLOCATION)
                && !variable.flags.contains(PersistentVariableFlags::KEEP_IN_TARGET)
        };

        if should_free {
            ctx.memory_map
                .borrow_mut()
                .deallocate(live_location)
                .map_err(Error::DeallocationFailed)?;
            debug!("freed persistent variable allocation at {live_location}");
        }

        Ok(())
    }

    fn wipe(&mut self, offset: usize, _ctx: &mut WipeContext) -> Result<(), Error> {
        trace!("PersistentEntity::wipe at offset {offset}");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        address::{Address, ByteOrder},
        error::CollaboratorError,
        collaborators::MemoryMap,
        value::ValueType,
    };
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeMemoryMap {
        next_address: u64,
        regions: HashMap<u64, Vec<u8>>,
    }

    impl MemoryMap for FakeMemoryMap {
        fn allocate(
            &mut self,
            byte_size: usize,
            _byte_alignment: usize,
            _permissions: Permissions,
            _policy: AllocationPolicy,
        ) -> Result<Address, CollaboratorError> {
            self.next_address += 0x1000;
            let address = self.next_address;
            self.regions.insert(address, vec![0u8; byte_size]);
            Ok(Address::load(address))
        }

        fn deallocate(&mut self, address: Address) -> Result<(), CollaboratorError> {
            self.regions
                .remove(&address.value)
                .map(|_| ())
                .ok_or_else(|| "unknown allocation".into())
        }

        fn read(&self, address: Address, out: &mut [u8]) -> Result<(), CollaboratorError> {
            let region = self
                .regions
                .get(&address.value)
                .ok_or("unmapped read")?;
            out.copy_from_slice(&region[..out.len()]);
            Ok(())
        }

        fn write(&mut self, address: Address, data: &[u8]) -> Result<(), CollaboratorError> {
            let region = self
                .regions
                .get_mut(&address.value)
                .ok_or("unmapped write")?;
            region[..data.len()].copy_from_slice(data);
            Ok(())
        }

        fn byte_order(&self) -> ByteOrder {
            ByteOrder::Little
        }

        fn address_byte_size(&self) -> usize {
            8
        }
    }

    fn context(memory_map: Rc<RefCell<FakeMemoryMap>>, struct_address: u64) -> MaterializeContext {
        MaterializeContext {
            struct_address: Address::load(struct_address),
            memory_map,
            frame: None,
            target: None,
            frame_bounds: None,
        }
    }

    #[test]
    fn materialize_allocates_and_writes_pointer_when_allocation_needed() {
        let variable = Rc::new(RefCell::new(PersistentVariable {
            flags: PersistentVariableFlags::NEEDS_ALLOCATION
                | PersistentVariableFlags::IS_LLDB_ALLOCATED,
            value_type: ValueType::from_bytes(4, 4),
            live_location: None,
            data: vec![0x44, 0x33, 0x22, 0x11],
        }));
        let mut entity = PersistentEntity::new(Rc::clone(&variable), ValueType::from_bytes(8, 8));

        let memory_map = Rc::new(RefCell::new(FakeMemoryMap::default()));
        memory_map
            .borrow_mut()
            .regions
            .insert(0x2000, vec![0u8; 8]);
        let mut ctx = context(Rc::clone(&memory_map), 0x2000);

        entity.materialize(0, &mut ctx).unwrap();

        let live_location = variable.borrow().live_location.unwrap();
        let mut slot = [0u8; 8];
        memory_map.borrow().read(Address::load(0x2000), &mut slot).unwrap();
        assert_eq!(u64::from_le_bytes(slot), live_location.value);

        let mut data = [0u8; 4];
        memory_map.borrow().read(live_location, &mut data).unwrap();
        assert_eq!(data, [0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn materialize_without_a_usable_flag_fails() {
        let variable = Rc::new(RefCell::new(PersistentVariable {
            flags: PersistentVariableFlags::NONE,
            value_type: ValueType::from_bytes(4, 4),
            live_location: Some(Address::load(0x3000)),
            data: vec![0; 4],
        }));
        let mut entity = PersistentEntity::new(variable, ValueType::from_bytes(8, 8));

        let memory_map = Rc::new(RefCell::new(FakeMemoryMap::default()));
        let mut ctx = context(memory_map, 0x2000);

        assert!(matches!(
            entity.materialize(0, &mut ctx),
            Err(Error::NotMaterialized)
        ));
    }

    #[test]
    fn dematerialize_frees_allocation_when_not_kept_in_target() {
        let variable = Rc::new(RefCell::new(PersistentVariable {
            flags: PersistentVariableFlags::IS_LLDB_ALLOCATED
                | PersistentVariableFlags::NEEDS_ALLOCATION,
            value_type: ValueType::from_bytes(4, 4),
            live_location: Some(Address::load(0x3000)),
            data: vec![0; 4],
        }));
        let mut entity = PersistentEntity::new(Rc::clone(&variable), ValueType::from_bytes(8, 8));

        let memory_map = Rc::new(RefCell::new(FakeMemoryMap::default()));
        memory_map
            .borrow_mut()
            .regions
            .insert(0x3000, vec![0xEF, 0xBE, 0xAD, 0xDE]);
        let mut ctx = context(Rc::clone(&memory_map), 0x2000);

        entity.dematerialize(0, &mut ctx).unwrap();

        assert!(!memory_map.borrow().regions.contains_key(&0x3000));
    }
}
