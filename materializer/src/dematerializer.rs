//! A one-shot handle that reverses a single materialization.

use std::{cell::RefCell, rc::Rc};

use log::error;

use crate::{
    address::Address,
    collaborators::{Frame, MemoryMap, PersistentStore, PersistentVariable, Target},
    entity::{result::ResultEntity, Context, Entity},
    error::Error,
};

/// Reverses the transfer a [`Materializer::materialize`][crate::Materializer::materialize] call
/// performed, or discards it without reading anything back.
///
/// Bound to a single materialization: once [`Dematerializer::dematerialize`] or
/// [`Dematerializer::wipe`] runs, the handle is permanently invalid. A
/// [`Materializer`][crate::Materializer] holds only a weak reference to its outstanding
/// dematerializer, so dropping this handle without calling either method still leaves any
/// scratch inferior allocations outstanding until the materializer itself is dropped, at which
/// point it forces a wipe.
pub struct Dematerializer {
    /// Every entity, in insertion order, matching the materializer that produced this handle.
    entities: Vec<Rc<RefCell<dyn Entity>>>,
    /// `entities[i]`'s offset, parallel to `entities`.
    offsets: Vec<usize>,
    /// The index into `entities` of the result entity, if one was added.
    result_index: Option<usize>,
    /// The result entity's concretely-typed handle, used for its specialized dematerialize call.
    result_entity: Option<Rc<RefCell<ResultEntity>>>,
    /// The memory map this materialization staged through.
    memory_map: Rc<RefCell<dyn MemoryMap>>,
    /// The frame snapshot this materialization was bound to, if any.
    frame: Option<Rc<RefCell<dyn Frame>>>,
    /// The target this materialization was bound to, if any.
    target: Option<Rc<RefCell<dyn Target>>>,
    /// The load address of the argument struct.
    struct_address: Address,
    /// `false` once [`Dematerializer::dematerialize`] or [`Dematerializer::wipe`] has run.
    valid: bool,
}

impl Dematerializer {
    /// Constructs a handle bound to one completed materialization. Only
    /// [`Materializer::materialize`][crate::Materializer::materialize] calls this.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entities: Vec<Rc<RefCell<dyn Entity>>>,
        offsets: Vec<usize>,
        result_index: Option<usize>,
        result_entity: Option<Rc<RefCell<ResultEntity>>>,
        memory_map: Rc<RefCell<dyn MemoryMap>>,
        frame: Option<Rc<RefCell<dyn Frame>>>,
        target: Option<Rc<RefCell<dyn Target>>>,
        struct_address: Address,
    ) -> Self {
        Self {
            entities,
            offsets,
            result_index,
            result_entity,
            memory_map,
            frame,
            target,
            struct_address,
            valid: true,
        }
    }

    /// `false` after [`Dematerializer::dematerialize`] or [`Dematerializer::wipe`] has run.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    fn context(&self, frame_bounds: Option<(Address, Address)>) -> Context {
        Context {
            struct_address: self.struct_address,
            memory_map: Rc::clone(&self.memory_map),
            frame: self.frame.clone(),
            target: self.target.clone(),
            frame_bounds,
        }
    }

    /// Reads every entity's slot back out of the argument struct, in insertion order, and hands
    /// the result slot's contents to `store` to mint a fresh persistent variable.
    ///
    /// `frame_bottom` and `frame_top` bound the expression's own stack frame; a persistent
    /// variable's program reference resolved to an address inside that range cannot outlive the
    /// frame and is forced onto the freeze-dry path.
    ///
    /// Always invokes [`Dematerializer::wipe`] before returning, whether or not an entity failed,
    /// so scratch allocations are released even on an aborted dematerialize.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalidated`] if this handle was already consumed, or the first error any
    /// entity's dematerialize call produces.
    pub fn dematerialize(
        &mut self,
        frame_bottom: Address,
        frame_top: Address,
        store: &mut dyn PersistentStore,
    ) -> Result<Option<Rc<RefCell<PersistentVariable>>>, Error> {
        if !self.valid {
            error!("dematerialize attempted on an invalidated handle");
            return Err(Error::Invalidated);
        }

        let mut ctx = self.context(Some((frame_bottom, frame_top)));
        let mut result = None;
        let mut outcome = Ok(());

        for (index, (entity, offset)) in self.entities.iter().zip(self.offsets.iter()).enumerate() {
            if Some(index) == self.result_index {
                let Some(result_entity) = self.result_entity.as_ref() else {
                    error!("result entity index recorded but no result entity is bound");
                    outcome = Err(Error::WrongEntry);
                    break;
                };
                match result_entity
                    .borrow_mut()
                    .dematerialize_into(*offset, &mut ctx, store)
                {
                    Ok(variable) => result = Some(variable),
                    Err(dematerialize_error) => {
                        error!("dematerialize failed on result entity at offset {offset}: {dematerialize_error}");
                        outcome = Err(dematerialize_error);
                        break;
                    }
                }
            } else if let Err(dematerialize_error) = entity.borrow_mut().dematerialize(*offset, &mut ctx) {
                error!("dematerialize failed on entity {index} at offset {offset}: {dematerialize_error}");
                outcome = Err(dematerialize_error);
                break;
            }
        }

        let wipe_outcome = self.wipe();
        outcome?;
        wipe_outcome?;
        Ok(result)
    }

    /// Releases every entity's transient inferior allocation without copying any data back, and
    /// invalidates this handle.
    ///
    /// Safe to call more than once: a second call is a no-op returning `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the first error any entity's wipe call produces; every entity's wipe is still
    /// attempted even after one fails, so at most one resource is leaked per call.
    pub fn wipe(&mut self) -> Result<(), Error> {
        if !self.valid {
            return Ok(());
        }

        let mut ctx = self.context(None);
        let mut outcome = Ok(());

        for (index, (entity, offset)) in self.entities.iter().zip(self.offsets.iter()).enumerate() {
            if let Err(wipe_error) = entity.borrow_mut().wipe(*offset, &mut ctx) {
                error!("wipe failed on entity {index} at offset {offset}: {wipe_error}");
                if outcome.is_ok() {
                    outcome = Err(wipe_error);
                }
            }
        }

        self.valid = false;
        outcome
    }
}
