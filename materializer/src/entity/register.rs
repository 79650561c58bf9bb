//! Stages a CPU register's bytes into the argument struct and writes them back afterward.

use log::trace;

use crate::{
    collaborators::RegisterInfo,
    entity::{DematerializeContext, Entity, MaterializeContext, WipeContext},
    error::Error,
    value::ValueType,
};

/// Stages a single named register. The slot is sized exactly to the register, not rounded up to
/// a pointer: unlike the other entities, a register's bytes are copied directly into the struct,
/// never referenced by address.
pub struct RegisterEntity {
    /// The register this entity stages.
    register: RegisterInfo,
}

impl RegisterEntity {
    /// Wraps a register descriptor for staging.
    #[must_use]
    pub const fn new(register: RegisterInfo) -> Self {
        Self { register }
    }
}

impl Entity for RegisterEntity {
    fn value_type(&self) -> ValueType {
        self.register.value_type
    }

    fn materialize(&mut self, offset: usize, ctx: &mut MaterializeContext) -> Result<(), Error> {
        trace!("RegisterEntity::materialize at offset {offset}");
        let Some(frame) = ctx.frame.clone() else {
            return Err(Error::NoFrame);
        };
        let Some(register_context) = frame.borrow().register_context() else {
            return Err(Error::NoFrame);
        };

        let data = register_context
            .borrow()
            .read_register(&self.register)
            .map_err(Error::ReadFailed)?;

        let expected = self.register.value_type.byte_size;
        if data.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        ctx.write_slot(offset, &data)
    }

    fn dematerialize(
        &mut self,
        offset: usize,
        ctx: &mut DematerializeContext,
    ) -> Result<(), Error> {
        trace!("RegisterEntity::dematerialize at offset {offset}");
        let Some(frame) = ctx.frame.clone() else {
            return Err(Error::NoFrame);
        };
        let Some(register_context) = frame.borrow().register_context() else {
            return Err(Error::NoFrame);
        };

        let data = ctx.read_slot(offset, self.register.value_type.byte_size)?;
        register_context
            .borrow_mut()
            .write_register(&self.register, &data)
            .map_err(Error::WriteFailed)
    }

    fn wipe(&mut self, _offset: usize, _ctx: &mut WipeContext) -> Result<(), Error> {
        Ok(())
    }
}
