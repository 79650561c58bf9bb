//! Writes the load (or failing that, file) address of a named symbol into the argument struct.

use log::trace;

use crate::{
    collaborators::SymbolInfo,
    entity::{DematerializeContext, Entity, MaterializeContext, WipeContext},
    error::Error,
    value::ValueType,
};

/// Stages a symbol's address. Stateless across a materialize/dematerialize cycle: there is
/// nothing to write back, since the symbol's address does not change as a side effect of the
/// expression running.
pub struct SymbolEntity {
    /// The symbol this entity stages.
    symbol: SymbolInfo,
    /// The size and alignment of the pointer slot this entity occupies, per the materializer's
    /// [`TargetConfig`][crate::materializer::TargetConfig].
    slot_type: ValueType,
}

impl SymbolEntity {
    /// Wraps a symbol descriptor for staging.
    #[must_use]
    pub const fn new(symbol: SymbolInfo, slot_type: ValueType) -> Self {
        Self { symbol, slot_type }
    }
}

impl Entity for SymbolEntity {
    fn value_type(&self) -> ValueType {
        self.slot_type
    }

    fn materialize(&mut self, offset: usize, ctx: &mut MaterializeContext) -> Result<(), Error> {
        trace!("SymbolEntity::materialize at offset {offset}");
        if ctx.target.is_none() {
            return Err(Error::NoTarget);
        }

        let address = self.symbol.preferred_address().ok_or(Error::NoTarget)?;
        ctx.write_pointer(offset, address, self.slot_type.byte_size)
    }

    fn dematerialize(
        &mut self,
        _offset: usize,
        _ctx: &mut DematerializeContext,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn wipe(&mut self, _offset: usize, _ctx: &mut WipeContext) -> Result<(), Error> {
        Ok(())
    }
}
