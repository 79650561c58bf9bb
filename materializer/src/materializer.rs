//! Owns the entity list and drives the materialize half of the staging protocol.

use std::{cell::RefCell, rc::Rc};

use log::error;

use crate::{
    address::Address,
    collaborators::{Frame, MemoryMap, PersistentVariable, RegisterInfo, SymbolInfo, VariableDescriptor},
    dematerializer::Dematerializer,
    entity::{
        local::LocalEntity, persistent::PersistentEntity, register::RegisterEntity,
        result::ResultEntity, symbol::SymbolEntity, Context, Entity,
    },
    error::Error,
    layout::LayoutEngine,
    value::ValueType,
};

/// The target-process properties a [`Materializer`] needs to size the pointer slots it reserves
/// for persistent, local, result, and symbol entities.
///
/// The only configurable surface this crate has (see this crate's design notes): everything else
/// an entity needs comes from the collaborator traits at call time, not from mutable global
/// state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetConfig {
    /// The size, in bytes, of an address in the target process. 4 or 8 on every target this
    /// crate has been used against.
    pub address_byte_size: u8,
    /// The alignment, in bytes, a pointer-sized slot must be placed at.
    pub pointer_alignment: usize,
}

impl TargetConfig {
    /// Creates a target configuration with the given address size and pointer alignment.
    #[must_use]
    pub const fn new(address_byte_size: u8, pointer_alignment: usize) -> Self {
        Self {
            address_byte_size,
            pointer_alignment,
        }
    }

    /// The [`ValueType`] every pointer-sized slot (persistent, local, result, symbol) reserves.
    fn pointer_slot_type(self) -> ValueType {
        ValueType::from_bytes(usize::from(self.address_byte_size), self.pointer_alignment)
    }
}

impl Default for TargetConfig {
    /// A 64-bit target: 8-byte addresses, 8-byte aligned.
    fn default() -> Self {
        Self::new(8, 8)
    }
}

/// Assembles an argument struct's members and, once all are registered, stages them into
/// inferior memory.
///
/// Entities are appended in call order; that order is preserved for the lifetime of this
/// materializer and is the only ordering either half of the staging protocol observes.
pub struct Materializer {
    /// The target's address size and pointer alignment, used to size every pointer slot this
    /// materializer reserves.
    config: TargetConfig,
    /// Assigns offsets to appended entities.
    layout: LayoutEngine,
    /// Every entity, in insertion order.
    entities: Vec<Rc<RefCell<dyn Entity>>>,
    /// `entities[i]`'s offset, parallel to `entities`.
    offsets: Vec<usize>,
    /// The single result entity, if [`Materializer::add_result`] was called, kept alongside its
    /// type-erased handle in `entities` so its specialized dematerialize entry point stays
    /// reachable.
    result_entity: Option<Rc<RefCell<ResultEntity>>>,
    /// The index into `entities` of the result entity, used by the
    /// [`Dematerializer`] to recognize it during the generic dematerialize pass.
    result_index: Option<usize>,
    /// A non-owning handle to the single outstanding [`Dematerializer`], if any. Consulted by
    /// [`Materializer::materialize`] to reject a second concurrent materialization, and by this
    /// type's `Drop` implementation to force a wipe.
    dematerializer: std::rc::Weak<RefCell<Dematerializer>>,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Materializer {
    /// Creates an empty materializer for a 64-bit target, with no entities registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TargetConfig::default())
    }

    /// Creates an empty materializer sized for `config`'s target, with no entities registered.
    #[must_use]
    pub fn with_config(config: TargetConfig) -> Self {
        Self {
            config,
            layout: LayoutEngine::new(),
            entities: Vec::new(),
            offsets: Vec::new(),
            result_entity: None,
            result_index: None,
            dematerializer: std::rc::Weak::new(),
        }
    }

    /// Appends an already-constructed entity and assigns it an offset.
    fn push(&mut self, entity: Rc<RefCell<dyn Entity>>) -> usize {
        let value_type = entity.borrow().value_type();
        let offset = self.layout.append(value_type);
        self.entities.push(entity);
        self.offsets.push(offset);
        offset
    }

    /// Appends a [`PersistentEntity`] staging `variable`.
    pub fn add_persistent(&mut self, variable: Rc<RefCell<PersistentVariable>>) -> usize {
        let slot_type = self.config.pointer_slot_type();
        self.push(Rc::new(RefCell::new(PersistentEntity::new(variable, slot_type))))
    }

    /// Appends a [`LocalEntity`] staging `descriptor`.
    pub fn add_local(&mut self, descriptor: VariableDescriptor) -> usize {
        let slot_type = self.config.pointer_slot_type();
        self.push(Rc::new(RefCell::new(LocalEntity::new(descriptor, slot_type))))
    }

    /// Appends the materializer's one [`ResultEntity`], reserving a slot for the expression's
    /// return value.
    ///
    /// # Panics
    ///
    /// Panics if a result entity has already been added; a materializer stages at most one
    /// expression result.
    pub fn add_result(
        &mut self,
        value_type: ValueType,
        is_program_reference: bool,
        keep_in_memory: bool,
    ) -> usize {
        assert!(
            self.result_entity.is_none(),
            "a materializer stages at most one result entity"
        );

        let entity = Rc::new(RefCell::new(ResultEntity::new(
            value_type,
            is_program_reference,
            keep_in_memory,
            self.config.pointer_slot_type(),
        )));
        self.result_index = Some(self.entities.len());
        self.result_entity = Some(Rc::clone(&entity));
        self.push(entity)
    }

    /// Appends a [`SymbolEntity`] staging `symbol`.
    pub fn add_symbol(&mut self, symbol: SymbolInfo) -> usize {
        let slot_type = self.config.pointer_slot_type();
        self.push(Rc::new(RefCell::new(SymbolEntity::new(symbol, slot_type))))
    }

    /// Appends a [`RegisterEntity`] staging `register`.
    pub fn add_register(&mut self, register: RegisterInfo) -> usize {
        self.push(Rc::new(RefCell::new(RegisterEntity::new(register))))
    }

    /// Stages every registered entity's current value into the argument struct at
    /// `struct_address`, returning a one-shot handle used to reverse the transfer afterward.
    ///
    /// `frame` supplies register and local-variable access; it may be omitted for expressions
    /// with no bound frame, as long as `memory_map` is supplied directly. At least one of the
    /// two must yield a usable memory map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyMaterialized`] if a previous [`Dematerializer`] from this
    /// materializer is still outstanding, [`Error::NoExecutionScope`] if neither `frame` nor
    /// `memory_map` yields a memory map, or whatever error the first failing entity's
    /// `materialize` call produces — later entities are not attempted, and the struct is left in
    /// a partially written state for the caller to discard.
    pub fn materialize(
        &mut self,
        frame: Option<Rc<RefCell<dyn Frame>>>,
        memory_map: Option<Rc<RefCell<dyn MemoryMap>>>,
        struct_address: Address,
    ) -> Result<Rc<RefCell<Dematerializer>>, Error> {
        if self.dematerializer.upgrade().is_some() {
            error!("materialize attempted while a dematerializer is still outstanding");
            return Err(Error::AlreadyMaterialized);
        }

        let memory_map = memory_map
            .or_else(|| frame.as_ref().and_then(|frame| frame.borrow().memory_map()))
            .ok_or(Error::NoExecutionScope)
            .inspect_err(|_| error!("materialize has neither a frame nor a memory map to bind to"))?;
        let target = frame.as_ref().and_then(|frame| frame.borrow().target());

        let mut ctx = Context {
            struct_address,
            memory_map: Rc::clone(&memory_map),
            frame: frame.clone(),
            target: target.clone(),
            frame_bounds: None,
        };

        for (index, (entity, offset)) in self.entities.iter().zip(self.offsets.iter()).enumerate() {
            entity.borrow_mut().materialize(*offset, &mut ctx).inspect_err(|error| {
                error!("materialize failed on entity {index} at offset {offset}: {error}");
            })?;
        }

        let dematerializer = Rc::new(RefCell::new(Dematerializer::new(
            self.entities.clone(),
            self.offsets.clone(),
            self.result_index,
            self.result_entity.clone(),
            memory_map,
            frame,
            target,
            struct_address,
        )));
        self.dematerializer = Rc::downgrade(&dematerializer);
        Ok(dematerializer)
    }

    /// The total size, in bytes, the argument struct must be allocated with to hold every entity
    /// appended so far.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.layout.total_size()
    }

    /// The alignment the argument struct must be allocated with.
    #[must_use]
    pub fn struct_alignment(&self) -> usize {
        self.layout.struct_alignment()
    }
}

impl Drop for Materializer {
    fn drop(&mut self) {
        if let Some(dematerializer) = self.dematerializer.upgrade() {
            let _ = dematerializer.borrow_mut().wipe();
        }
    }
}
